//! Reflector server: runs on the host side of the network boundary.
//!
//! Clients register implicitly by sending a unicast datagram. Their messages are
//! put onto the local multicast groups, responses first having their address
//! records pointed at this host. Local multicast traffic is sent back to every
//! registered client of the same family.

#[cfg(feature = "logging")]
use crate::log::{debug, info, trace, warn};
use crate::{
    config::Config,
    dns_parser::{decode, DnsHeader},
    endpoint::{EndpointSet, Family, Role, MDNS_PORT},
    interfaces::HostAddressSet,
    loop_cache::LoopCache,
    reflector::{Counter, Metrics, Reflector, ReflectorCore, ReflectorState, ACK, BYE},
    rewrite::upgrade_address,
    Result,
};
use std::{
    borrow::Cow,
    collections::BTreeSet,
    net::{IpAddr, SocketAddr},
};

pub struct ReflectorServer {
    core: ReflectorCore,
    /// Registered clients, one set per family. Never expire.
    clients: [BTreeSet<SocketAddr>; 2],
}

const fn family_index(family: Family) -> usize {
    match family {
        Family::V4 => 0,
        Family::V6 => 1,
    }
}

impl ReflectorServer {
    pub fn new(config: Config, endpoints: EndpointSet) -> Self {
        Self {
            core: ReflectorCore::new("reflector server", config, endpoints),
            clients: [BTreeSet::new(), BTreeSet::new()],
        }
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Registered clients of `family`, in address order.
    pub fn clients(&self, family: Family) -> impl Iterator<Item = &SocketAddr> {
        self.clients[family_index(family)].iter()
    }

    pub fn client_count(&self) -> usize {
        self.clients.iter().map(|set| set.len()).sum()
    }

    /// The loop cache of `family`.
    pub fn cache(&self, family: Family) -> &LoopCache {
        self.core.cache(family)
    }

    pub fn cache_mut(&mut self, family: Family) -> &mut LoopCache {
        self.core.cache_mut(family)
    }

    /// Host addresses used to rewrite responses, taken from the IPv4 multicast
    /// endpoint's view of the interfaces.
    pub fn host_addresses(&self) -> HostAddressSet {
        let endpoint = self.core.endpoints.get(Role::MulticastV4);
        let preferred = endpoint
            .interface_name()
            .or_else(|| self.core.config.interface.as_deref());
        HostAddressSet::from_interfaces(&endpoint.host_interfaces(), preferred)
    }

    /// Subnet broadcast address for the multicast endpoint of `family`.
    ///
    /// Returns `None`, after logging, if the endpoint cannot tell.
    pub fn broadcast_address(&self, family: Family) -> Option<IpAddr> {
        let endpoint = self.core.endpoints.get(Role::multicast(family));
        let intf = endpoint.interface_name();

        let result = match family {
            Family::V4 => endpoint.ipv4_interface_address(intf).and_then(|ip| {
                match endpoint.netmask(IpAddr::V4(ip))? {
                    IpAddr::V4(mask) => Ok(IpAddr::V4(endpoint.ipv4_broadcast_address(ip, mask))),
                    IpAddr::V6(mask) => Err(e_fmt!("IPv6 netmask {} for {}", mask, ip)),
                }
            }),
            // All-nodes only makes sense if there is an IPv6 address to send from.
            Family::V6 => endpoint
                .ipv6_interface_address(intf)
                .map(|_| IpAddr::V6(endpoint.ipv6_broadcast_address())),
        };

        match result {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("server: no {} broadcast address: {}", family, e);
                None
            }
        }
    }

    fn register_client(&mut self, family: Family, peer: SocketAddr) {
        if self.clients[family_index(family)].insert(peer) {
            info!("server: new {} client {}", family, peer);
            self.core.increase_counter(Counter::ClientsRegistered, 1);
        }
    }

    fn handle_unicast(&mut self, family: Family, payload: &[u8], from: SocketAddr) {
        if !self.core.accept(Role::unicast(family), payload, &from) {
            return;
        }
        self.register_client(family, from);

        let header = match DnsHeader::parse(payload) {
            Ok(header) => header,
            Err(e) => {
                debug!("server: drop message from {}: {}", from, e);
                self.core.increase_counter(Counter::DecodeFailed, 1);
                return;
            }
        };

        let forward = if header.is_response() {
            let hosts = self.host_addresses();
            upgrade_address(payload, &hosts)
        } else {
            Cow::Borrowed(payload)
        };
        if let Cow::Owned(rewritten) = &forward {
            self.core.increase_counter(Counter::Rewritten, 1);
            self.log_rewritten(rewritten, from);
        }

        // The multicast echo of this relay must not go back to the clients.
        self.core.remember(family, &forward);
        self.core.log_filtered("client to multicast", &forward);

        let role = Role::multicast(family);
        let group = family.group_addr().to_string();
        self.core.relay(role, &forward, &group, MDNS_PORT);

        if self.core.config.broadcast {
            if let Some(addr) = self.broadcast_address(family) {
                self.core.relay_to(role, &forward, SocketAddr::new(addr, MDNS_PORT));
            }
        }

        if self.core.config.localhost {
            self.core.relay(role, &forward, family.localhost(), MDNS_PORT);
        }

        if self.core.config.share_with_clients {
            let peers: Vec<SocketAddr> = self.clients[family_index(family)]
                .iter()
                .filter(|peer| **peer != from)
                .copied()
                .collect();
            for peer in peers {
                self.core.relay_to(Role::unicast(family), payload, peer);
            }
        }

        self.core.send_to(Role::unicast(family), ACK, from);
        trace!(
            "server: relayed {} {} bytes from {}",
            if header.is_response() { "response" } else { "query" },
            forward.len(),
            from
        );
    }

    fn log_rewritten(&mut self, rewritten: &[u8], from: SocketAddr) {
        let config = &self.core.config;
        if !config.log_reflector_messages && !config.debug {
            return;
        }

        match decode(rewritten) {
            Ok(msg) => info!("server: rewrote response from {}:\n{}", from, msg),
            Err(e) => {
                warn!("server: cannot decode rewritten response from {}: {}", from, e);
                self.core.increase_counter(Counter::DecodeFailed, 1);
            }
        }
    }

    fn handle_multicast(&mut self, family: Family, payload: &[u8], from: SocketAddr) {
        if !self.core.accept(Role::multicast(family), payload, &from) {
            return;
        }

        let clients: Vec<SocketAddr> = self.clients[family_index(family)].iter().copied().collect();
        if clients.is_empty() {
            return;
        }

        if self.core.seen_recently(family, payload) {
            trace!("server: suppress {} multicast echo from {}", family, from);
            return;
        }
        self.core.log_filtered("multicast to clients", payload);

        for client in clients {
            self.core.relay_to(Role::unicast(family), payload, client);
        }
    }
}

impl Reflector for ReflectorServer {
    fn start(&mut self) -> Result<()> {
        self.core.start()
    }

    fn stop(&mut self) {
        if !self.core.begin_stop() {
            return;
        }

        for family in [Family::V4, Family::V6].iter() {
            let clients: Vec<SocketAddr> =
                self.clients[family_index(*family)].iter().copied().collect();
            for client in clients {
                self.core.send_to(Role::unicast(*family), BYE, client);
            }
        }
        self.core.finish_stop();
    }

    fn state(&self) -> ReflectorState {
        self.core.state
    }

    fn endpoints_mut(&mut self) -> &mut EndpointSet {
        &mut self.core.endpoints
    }

    fn handle_message(&mut self, role: Role, payload: &[u8], from: SocketAddr) {
        if !self.core.is_running() {
            return;
        }

        let family = role.family();
        if role.is_multicast() {
            self.handle_multicast(family, payload, from);
        } else {
            self.handle_unicast(family, payload, from);
        }
    }

    fn housekeeping(&mut self, now: u64) {
        self.core.prune_caches(now);
    }

    fn metrics(&self) -> Metrics {
        self.core.metrics()
    }
}
