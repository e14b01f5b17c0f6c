//! An mDNS reflector that relays Multicast DNS-SD across network boundaries.
//!
//! Multicast does not cross a container bridge, a VPN or a routed subnet. A
//! reflector client on one side picks up local mDNS traffic and sends it over
//! unicast to a reflector server on the other side, which puts it onto its own
//! multicast groups and sends local traffic back:
//!```text
//!  container LAN            client                server             host LAN
//!    |  -- 224.0.0.251 -->    |  -- unicast 15353 -->  |  -- 224.0.0.251 -->  |
//!    |                        |                        |  rewrite A/AAAA      |
//!    |  <-- 224.0.0.251 --    |  <-- unicast --        |  <-- 224.0.0.251 --  |
//!```
//! Responses relayed by the server have their A and AAAA records rewritten to
//! the host's own addresses, so that services announced from inside a container
//! resolve to something reachable from the host network. Each side keeps a short
//! lived cache of payload fingerprints so a relayed message echoed back by the
//! multicast loopback is not relayed again.
//!
//! # Usage
//!
//! A [`ReflectorClient`] or [`ReflectorServer`] is built from a [`Config`] and
//! the four [`Endpoint`]s it drives, then handed to a [`ReflectorDaemon`] which
//! runs it in its own thread. The daemon exposes its API over a
//! [`flume`](https://crates.io/crates/flume) channel.
//!
//! ## Example: a server on the host.
//!
//! ```no_run
//! use mdns_reflector::{Config, EndpointSet, ReflectorDaemon, ReflectorServer, REFLECTOR_PORT};
//!
//! let config = Config::new().with_broadcast(true);
//! let endpoints = EndpointSet::udp(REFLECTOR_PORT, config.interface.clone());
//! let daemon = ReflectorDaemon::new(ReflectorServer::new(config, endpoints))
//!     .expect("Failed to start reflector");
//!
//! // ... later, notify the clients and stop.
//! let receiver = daemon.shutdown().expect("Failed to shutdown");
//! let _status = receiver.recv();
//! ```
//!
//! # Limitations
//!
//! This implementation is based on the following RFCs:
//! - mDNS:   [RFC 6762](https://tools.ietf.org/html/rfc6762)
//! - DNS:    [RFC 1035](https://tools.ietf.org/html/rfc1035)
//!
//! Only the record types used by DNS-SD are decoded: A, AAAA, PTR, SRV, TXT and
//! NSEC. Others are kept as raw bytes.

#![forbid(unsafe_code)]
#![allow(clippy::single_component_path_imports)]

// log for logging (optional).
#[cfg(feature = "logging")]
use log;

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace    ( ($($arg:expr),* $(,)?) => {{ let _ = ($(&$arg),*); }} );
    macro_rules! debug    ( ($($arg:expr),* $(,)?) => {{ let _ = ($(&$arg),*); }} );
    macro_rules! info     ( ($($arg:expr),* $(,)?) => {{ let _ = ($(&$arg),*); }} );
    macro_rules! warn     ( ($($arg:expr),* $(,)?) => {{ let _ = ($(&$arg),*); }} );
    macro_rules! error    ( ($($arg:expr),* $(,)?) => {{ let _ = ($(&$arg),*); }} );
}

#[macro_use]
mod error;

mod config;
mod daemon;
mod dns_parser;
mod endpoint;
mod interfaces;
mod loop_cache;
mod reflector;
mod reflector_client;
mod reflector_server;
mod rewrite;

pub use config::{Config, DEFAULT_GATEWAY_HOST};
pub use daemon::{DaemonStatus, ReflectorDaemon};
pub use dns_parser::{
    decode, decode_a, decode_aaaa, encode, encode_a, encode_aaaa, encode_name, encode_txt,
    has_mdns_id, rr_type_name, DnsHeader, DnsMessage, DnsQuestion, DnsResourceRecord, RData,
    RRType, CLASS_CACHE_FLUSH, CLASS_IN, CLASS_UNICAST_RESPONSE, FLAGS_AA, FLAGS_QR_QUERY,
    FLAGS_QR_RESPONSE, MAX_MSG_ABSOLUTE,
};
pub use endpoint::{
    resolve_host, Endpoint, EndpointSet, Family, Role, UdpEndpoint, GROUP_ADDR_V4,
    GROUP_ADDR_V6, MDNS_PORT, REFLECTOR_PORT,
};
pub use error::{Error, Result};
pub use interfaces::{
    ipv4_broadcast_address, my_interfaces, HostAddressSet, HostInterface, IPV6_ALL_NODES,
};
pub use loop_cache::{fingerprint, Fingerprint, LoopCache, DEFAULT_TTL_SECS};
pub use reflector::{Metrics, Reflector, ReflectorState, ACK, BYE};
pub use reflector_client::ReflectorClient;
pub use reflector_server::ReflectorServer;
pub use rewrite::upgrade_address;

/// Re-export from `flume`.
pub use flume::Receiver;
