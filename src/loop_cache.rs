//! Loop-prevention cache: remembers fingerprints of recently relayed payloads.

#[cfg(feature = "logging")]
use crate::log::trace;
use sha1::{Digest, Sha1};
use std::{collections::HashMap, time::SystemTime};

/// Default lifetime of a cache entry in seconds.
pub const DEFAULT_TTL_SECS: u64 = 1;

/// SHA-1 digest of a raw payload.
pub type Fingerprint = [u8; 20];

/// Computes the fingerprint of the raw payload bytes.
pub fn fingerprint(payload: &[u8]) -> Fingerprint {
    let mut hasher = Sha1::new();
    hasher.update(payload);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Maps payload fingerprints to their expiry time in milliseconds since UNIX epoch.
///
/// Every operation has an `_at` variant taking the current time explicitly, so
/// expiry can be tested without sleeping.
#[derive(Debug, Default)]
pub struct LoopCache {
    entries: HashMap<Fingerprint, u64>,
}

impl LoopCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or overwrites the expiry of `key` to `ttl_secs` from now.
    pub fn remember(&mut self, key: Fingerprint, ttl_secs: u64) {
        self.remember_at(key, ttl_secs, current_time_millis());
    }

    pub fn remember_at(&mut self, key: Fingerprint, ttl_secs: u64, now: u64) {
        self.entries.insert(key, now + ttl_secs * 1000);
    }

    /// Returns true if `key` has not expired yet. An expired entry is removed.
    pub fn seen_recently(&mut self, key: &Fingerprint) -> bool {
        self.seen_recently_at(key, current_time_millis())
    }

    pub fn seen_recently_at(&mut self, key: &Fingerprint, now: u64) -> bool {
        match self.entries.get(key) {
            Some(expires) if now < *expires => true,
            Some(_) => {
                self.entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Removes every expired entry. Returns the number removed.
    pub fn prune(&mut self) -> usize {
        self.prune_at(current_time_millis())
    }

    pub fn prune_at(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires| now < *expires);
        let removed = before - self.entries.len();
        if removed > 0 {
            trace!("loop cache pruned {} entries", removed);
        }
        removed
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Returns the current time in milliseconds since UNIX epoch.
pub(crate) fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{fingerprint, LoopCache};
    use test_log::test;

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abcd"));
        assert_ne!(fingerprint(&[0, 0, 1]), fingerprint(&[0, 0, 2]));
        assert_eq!(fingerprint(b"").len(), 20);
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = LoopCache::new();
        let key = fingerprint(b"payload");
        let t = 1_000_000;

        cache.remember_at(key, 10, t);
        assert!(cache.seen_recently_at(&key, t + 5_000));
        assert!(cache.contains(&key));

        assert!(!cache.seen_recently_at(&key, t + 15_000));
        assert!(!cache.contains(&key));
        assert!(!cache.seen_recently_at(&fingerprint(b"other"), t));
    }

    #[test]
    fn test_remember_overwrites() {
        let mut cache = LoopCache::new();
        let key = fingerprint(b"again");

        cache.remember_at(key, 1, 0);
        cache.remember_at(key, 1, 900);
        assert_eq!(cache.len(), 1);

        // Expiry was extended to 1900 by the second call.
        assert!(cache.seen_recently_at(&key, 1_500));
        assert!(!cache.seen_recently_at(&key, 1_900));
    }

    #[test]
    fn test_prune() {
        let mut cache = LoopCache::new();
        cache.remember_at(fingerprint(b"short"), 1, 0);
        cache.remember_at(fingerprint(b"long"), 10, 0);

        // Nothing expired yet.
        assert_eq!(cache.prune_at(500), 0);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.prune_at(2_000), 1);
        assert_eq!(cache.prune_at(2_000), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&fingerprint(b"long")));

        assert_eq!(cache.prune_at(10_000), 1);
        assert!(cache.is_empty());
    }
}
