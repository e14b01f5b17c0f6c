//! Options shared by the reflector client and server.

use crate::{dns_parser::DnsMessage, loop_cache::DEFAULT_TTL_SECS};
use std::time::Duration;

/// Default hostname of the reflector server as seen from inside a container.
pub const DEFAULT_GATEWAY_HOST: &str = "host.docker.internal";

/// Reflector options, resolved once at startup and passed into a reflector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name substrings selecting which relayed messages are logged in debug mode.
    pub filters: Vec<String>,
    /// Also relay to localhost.
    pub localhost: bool,
    /// Server: also relay to the subnet broadcast address.
    pub broadcast: bool,
    /// Server: relay unicast messages to the other registered clients too.
    pub share_with_clients: bool,
    pub debug: bool,
    pub silent: bool,
    /// Server: decode and log every rewritten response.
    pub log_reflector_messages: bool,
    /// Preferred host interface for multicast and address rewriting.
    pub interface: Option<String>,
    /// Client: the reflector server to relay to.
    pub gateway_host: String,
    /// Lifetime of loop-prevention cache entries.
    pub cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            localhost: false,
            broadcast: false,
            share_with_clients: false,
            debug: false,
            silent: false,
            log_reflector_messages: false,
            interface: None,
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_localhost(mut self, enable: bool) -> Self {
        self.localhost = enable;
        self
    }

    pub fn with_broadcast(mut self, enable: bool) -> Self {
        self.broadcast = enable;
        self
    }

    pub fn with_share_with_clients(mut self, enable: bool) -> Self {
        self.share_with_clients = enable;
        self
    }

    pub fn with_debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    pub fn with_silent(mut self, enable: bool) -> Self {
        self.silent = enable;
        self
    }

    pub fn with_log_reflector_messages(mut self, enable: bool) -> Self {
        self.log_reflector_messages = enable;
        self
    }

    pub fn with_interface(mut self, interface: Option<String>) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_gateway_host(mut self, host: &str) -> Self {
        self.gateway_host = host.to_string();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Cache TTL in whole seconds, at least 1.
    pub fn cache_ttl_secs(&self) -> u64 {
        self.cache_ttl.as_secs().max(1)
    }

    /// Destinations the client relays multicast traffic to.
    pub fn reflector_hosts(&self) -> Vec<String> {
        let mut hosts = vec![self.gateway_host.clone()];
        if self.localhost {
            hosts.push("localhost".to_string());
        }
        hosts
    }

    /// Returns true if any filter is a substring of `name`. No filters match nothing.
    pub fn matches_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| name.contains(f.as_str()))
    }

    /// Returns true if a question or record name of `msg` matches a filter.
    pub fn message_matches(&self, msg: &DnsMessage) -> bool {
        msg.names().any(|name| self.matches_filter(name))
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_GATEWAY_HOST};
    use std::time::Duration;
    use test_log::test;

    #[test]
    fn test_defaults_and_builders() {
        let config = Config::new();
        assert_eq!(config.gateway_host, DEFAULT_GATEWAY_HOST);
        assert_eq!(config.reflector_hosts(), vec![DEFAULT_GATEWAY_HOST]);
        assert_eq!(config.cache_ttl_secs(), 1);

        let config = Config::new()
            .with_localhost(true)
            .with_gateway_host("10.0.0.1")
            .with_cache_ttl(Duration::from_millis(200));
        assert_eq!(config.reflector_hosts(), vec!["10.0.0.1", "localhost"]);
        assert_eq!(config.cache_ttl_secs(), 1);
    }

    #[test]
    fn test_filters() {
        let config = Config::new().with_filters(vec!["_matter", "bridge"]);
        assert!(config.matches_filter("_matter._tcp.local"));
        assert!(config.matches_filter("matterbridge.local"));
        assert!(!config.matches_filter("_hap._tcp.local"));
        assert!(!Config::new().matches_filter("anything.local"));
    }
}
