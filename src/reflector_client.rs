//! Reflector client: runs where multicast cannot leave, e.g. inside a container.
//!
//! Multicast traffic seen locally is sent over unicast to the reflector hosts,
//! and unicast traffic coming back from them is put onto the local multicast
//! groups. A loop cache per family keeps each relayed copy from bouncing back.

#[cfg(feature = "logging")]
use crate::log::{debug, info, trace, warn};
use crate::{
    config::Config,
    endpoint::{EndpointSet, Family, Role, MDNS_PORT, REFLECTOR_PORT},
    loop_cache::LoopCache,
    reflector::{Metrics, Reflector, ReflectorCore, ReflectorState, ACK, BYE},
    Result,
};
use std::net::SocketAddr;

pub struct ReflectorClient {
    core: ReflectorCore,
    reflector_hosts: Vec<String>,
    /// Reflector hosts resolved on start, one list per family.
    targets: [Vec<SocketAddr>; 2],
}

const fn family_index(family: Family) -> usize {
    match family {
        Family::V4 => 0,
        Family::V6 => 1,
    }
}

impl ReflectorClient {
    pub fn new(config: Config, endpoints: EndpointSet) -> Self {
        let reflector_hosts = config.reflector_hosts();
        Self {
            core: ReflectorCore::new("reflector client", config, endpoints),
            reflector_hosts,
            targets: [Vec::new(), Vec::new()],
        }
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Destinations multicast traffic is relayed to, on the reflector port.
    pub fn reflector_hosts(&self) -> &[String] {
        &self.reflector_hosts
    }

    /// Addresses multicast traffic of `family` is relayed to. Empty until started.
    pub fn targets(&self, family: Family) -> &[SocketAddr] {
        &self.targets[family_index(family)]
    }

    /// Resolves every reflector host once per family, so the relay path never
    /// does a name lookup. A host without an address of a family is skipped there.
    fn resolve_targets(&mut self) {
        for family in [Family::V4, Family::V6].iter() {
            let endpoint = self.core.endpoints.get(Role::unicast(*family));
            let mut targets = Vec::new();
            for host in self.reflector_hosts.iter() {
                match endpoint.resolve(host, REFLECTOR_PORT) {
                    Ok(addr) => targets.push(addr),
                    Err(e) => warn!("client: no {} target for {}: {}", family, host, e),
                }
            }
            self.targets[family_index(*family)] = targets;
        }
    }

    /// The loop cache of `family`.
    pub fn cache(&self, family: Family) -> &LoopCache {
        self.core.cache(family)
    }

    pub fn cache_mut(&mut self, family: Family) -> &mut LoopCache {
        self.core.cache_mut(family)
    }

    fn handle_multicast(&mut self, family: Family, payload: &[u8], from: SocketAddr) {
        if !self.core.accept(Role::multicast(family), payload, &from) {
            return;
        }

        // Most likely our own relay of a unicast message, looped back.
        if self.core.seen_recently(family, payload) {
            trace!("client: suppress {} multicast echo from {}", family, from);
            return;
        }
        self.core.remember(family, payload);
        self.core.log_filtered("multicast to reflector", payload);

        let role = Role::unicast(family);
        let targets = self.targets[family_index(family)].clone();
        for target in targets {
            if self.core.relay_to(role, payload, target) {
                trace!(
                    "client: relayed {} bytes from {} to {}",
                    payload.len(),
                    from,
                    target
                );
            }
        }
    }

    fn handle_unicast(&mut self, family: Family, payload: &[u8], from: SocketAddr) {
        if payload == ACK {
            trace!("client: ACK from {}", from);
            return;
        }
        if payload == BYE {
            info!("client: reflector server {} is shutting down", from);
            return;
        }

        if !self.core.accept(Role::unicast(family), payload, &from) {
            return;
        }
        if self.core.seen_recently(family, payload) {
            trace!("client: suppress repeated unicast message from {}", from);
            return;
        }
        self.core.remember(family, payload);
        self.core.log_filtered("reflector to multicast", payload);

        let role = Role::multicast(family);
        let group = family.group_addr().to_string();
        self.core.relay(role, payload, &group, MDNS_PORT);

        if self.core.config.localhost {
            self.core.relay(role, payload, family.localhost(), MDNS_PORT);
        }
        debug!(
            "client: relayed {} bytes from {} onto {} multicast",
            payload.len(),
            from,
            family
        );
    }
}

impl Reflector for ReflectorClient {
    fn start(&mut self) -> Result<()> {
        self.core.start()?;
        self.resolve_targets();
        info!(
            "client relays to {:?} on port {}",
            self.reflector_hosts, REFLECTOR_PORT
        );
        Ok(())
    }

    fn stop(&mut self) {
        if self.core.begin_stop() {
            self.core.finish_stop();
        }
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
