//! The [Reflector] trait and the state shared by the client and the server.

#[cfg(feature = "logging")]
use crate::log::{debug, error, info, trace, warn};
use crate::{
    config::Config,
    dns_parser::{decode, has_mdns_id},
    endpoint::{EndpointSet, Family, Role},
    loop_cache::{fingerprint, LoopCache},
    Error, Result,
};
use std::{collections::HashMap, fmt, net::SocketAddr};

/// Acknowledgement the server sends back for every unicast datagram it relays.
pub const ACK: &[u8] = b"ACK";

/// Notification the server sends to every client when it stops.
pub const BYE: &[u8] = b"BYE";

/// Counters of a reflector, keyed by counter name.
pub type Metrics = HashMap<String, i64>;

/// Lifecycle of a reflector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Different counters included in the metrics.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub(crate) enum Counter {
    MulticastReceived,
    UnicastReceived,
    NonMdnsDropped,
    LoopSuppressed,
    Relayed,
    SendFailed,
    Rewritten,
    DecodeFailed,
    ClientsRegistered,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MulticastReceived => write!(f, "multicast-received"),
            Self::UnicastReceived => write!(f, "unicast-received"),
            Self::NonMdnsDropped => write!(f, "non-mdns-dropped"),
            Self::LoopSuppressed => write!(f, "loop-suppressed"),
            Self::Relayed => write!(f, "relayed"),
            Self::SendFailed => write!(f, "send-failed"),
            Self::Rewritten => write!(f, "rewritten"),
            Self::DecodeFailed => write!(f, "decode-failed"),
            Self::ClientsRegistered => write!(f, "clients-registered"),
        }
    }
}

/// A relay between the local mDNS groups and unicast peers.
///
/// Implementations own their four endpoints but never read sockets themselves:
/// a driver such as [crate::ReflectorDaemon] receives datagrams and hands them to
/// [Reflector::handle_message].
pub trait Reflector: Send {
    /// Starts all endpoints. No-op when already starting or running.
    fn start(&mut self) -> Result<()>;

    /// Stops all endpoints. No-op when already stopped or stopping.
    fn stop(&mut self);

    fn state(&self) -> ReflectorState;

    fn endpoints_mut(&mut self) -> &mut EndpointSet;

    /// Processes one datagram received on the endpoint of `role`.
    fn handle_message(&mut self, role: Role, payload: &[u8], from: SocketAddr);

    /// Processes a socket error from the endpoint of `role`. Never fatal.
    fn handle_error(&mut self, role: Role, err: &Error) {
        error!("{} endpoint error: {}", role, err);
    }

    /// Periodic maintenance, `now` in milliseconds since UNIX epoch.
    fn housekeeping(&mut self, now: u64);

    fn metrics(&self) -> Metrics;
}

/// State and helpers common to [crate::ReflectorClient] and [crate::ReflectorServer].
pub(crate) struct ReflectorCore {
    pub(crate) name: &'static str,
    pub(crate) config: Config,
    pub(crate) endpoints: EndpointSet,
    pub(crate) state: ReflectorState,
    /// One loop cache per family, indexed by [cache_index].
    caches: [LoopCache; 2],
    counters: Metrics,
}

const fn cache_index(family: Family) -> usize {
    match family {
        Family::V4 => 0,
        Family::V6 => 1,
    }
}

impl ReflectorCore {
    pub(crate) fn new(name: &'static str, config: Config, endpoints: EndpointSet) -> Self {
        Self {
            name,
            config,
            endpoints,
            state: ReflectorState::Stopped,
            caches: [LoopCache::new(), LoopCache::new()],
            counters: HashMap::new(),
        }
    }

    pub(crate) fn start(&mut self) -> Result<()> {
        if matches!(
            self.state,
            ReflectorState::Starting | ReflectorState::Running
        ) {
            return Ok(());
        }

        self.state = ReflectorState::Starting;
        if let Err(e) = self.endpoints.start_all() {
            self.state = ReflectorState::Stopped;
            return Err(e);
        }
        self.state = ReflectorState::Running;
        info!("{} started", self.name);
        Ok(())
    }

    /// Enters `Stopping`. Returns false if the reflector is already stopping or stopped.
    pub(crate) fn begin_stop(&mut self) -> bool {
        if matches!(
            self.state,
            ReflectorState::Stopping | ReflectorState::Stopped
        ) {
            return false;
        }
        self.state = ReflectorState::Stopping;
        true
    }

    pub(crate) fn finish_stop(&mut self) {
        self.endpoints.stop_all();
        self.state = ReflectorState::Stopped;
        info!("{} stopped", self.name);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state == ReflectorState::Running
    }

    pub(crate) fn increase_counter(&mut self, counter: Counter, count: i64) {
        let key = counter.to_string();
        match self.counters.get_mut(&key) {
            Some(v) => *v += count,
            None => {
                self.counters.insert(key, count);
            }
        }
    }

    pub(crate) fn metrics(&self) -> Metrics {
        self.counters.clone()
    }

    /// Counts a received datagram and applies the mDNS fast filter.
    /// Returns false if the payload is not mDNS and must be dropped.
    pub(crate) fn accept(&mut self, role: Role, payload: &[u8], from: &SocketAddr) -> bool {
        let counter = if role.is_multicast() {
            Counter::MulticastReceived
        } else {
            Counter::UnicastReceived
        };
        self.increase_counter(counter, 1);

        if !has_mdns_id(payload) {
            trace!(
                "{}: drop non-mDNS datagram of {} bytes from {} on {}",
                self.name,
                payload.len(),
                from,
                role
            );
            self.increase_counter(Counter::NonMdnsDropped, 1);
            return false;
        }
        true
    }

    /// Returns true if `payload` was relayed on `family` within the cache TTL.
    pub(crate) fn seen_recently(&mut self, family: Family, payload: &[u8]) -> bool {
        let key = fingerprint(payload);
        if self.caches[cache_index(family)].seen_recently(&key) {
            self.increase_counter(Counter::LoopSuppressed, 1);
            return true;
        }
        false
    }

    pub(crate) fn remember(&mut self, family: Family, payload: &[u8]) {
        let ttl = self.config.cache_ttl_secs();
        self.caches[cache_index(family)].remember(fingerprint(payload), ttl);
    }

    pub(crate) fn cache(&self, family: Family) -> &LoopCache {
        &self.caches[cache_index(family)]
    }

    pub(crate) fn cache_mut(&mut self, family: Family) -> &mut LoopCache {
        &mut self.caches[cache_index(family)]
    }

    pub(crate) fn prune_caches(&mut self, now: u64) {
        for cache in self.caches.iter_mut() {
            cache.prune_at(now);
        }
    }

    /// Sends `payload` on the endpoint of `role`. Failures are logged and counted.
    pub(crate) fn send(&mut self, role: Role, payload: &[u8], host: &str, port: u16) -> bool {
        let result = self.endpoints.get(role).send(payload, host, port);
        self.check_sent(role, payload, &format!("{} port {}", host, port), result)
    }

    pub(crate) fn send_to(&mut self, role: Role, payload: &[u8], addr: SocketAddr) -> bool {
        let result = self.endpoints.get(role).send_to(payload, addr);
        self.check_sent(role, payload, &addr.to_string(), result)
    }

    fn check_sent(
        &mut self,
        role: Role,
        payload: &[u8],
        dest: &str,
        result: Result<usize>,
    ) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "{}: {} failed to send {} bytes to {}: {}",
                    self.name,
                    role,
                    payload.len(),
                    dest,
                    e
                );
                self.increase_counter(Counter::SendFailed, 1);
                false
            }
        }
    }

    /// Like [ReflectorCore::send], and counts the datagram as relayed.
    pub(crate) fn relay(&mut self, role: Role, payload: &[u8], host: &str, port: u16) -> bool {
        let sent = self.send(role, payload, host, port);
        if sent {
            self.increase_counter(Counter::Relayed, 1);
        }
        sent
    }

    /// Like [ReflectorCore::send_to], and counts the datagram as relayed.
    pub(crate) fn relay_to(&mut self, role: Role, payload: &[u8], addr: SocketAddr) -> bool {
        let sent = self.send_to(role, payload, addr);
        if sent {
            self.increase_counter(Counter::Relayed, 1);
        }
        sent
    }

    /// In debug mode, logs `payload` if one of its names matches a filter.
    pub(crate) fn log_filtered(&mut self, what: &str, payload: &[u8]) {
        if !self.config.debug || self.config.filters.is_empty() {
            return;
        }

        match decode(payload) {
            Ok(msg) => {
                if self.config.message_matches(&msg) {
                    debug!("{}: {}\n{}", self.name, what, msg);
                }
            }
            Err(e) => {
                debug!("{}: {}: cannot decode: {}", self.name, what, e);
                self.increase_counter(Counter::DecodeFailed, 1);
            }
        }
    }
}
