//! Host network interfaces and the addresses derived from them.

use if_addrs::{IfAddr, Interface};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IPv6 has no broadcast; the all-nodes link-local group stands in for it.
pub const IPV6_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// One address on one host network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    pub name: String,
    pub addr: IpAddr,
    pub netmask: Option<IpAddr>,
    pub index: Option<u32>,
    /// Loopback, never used as a relay or rewrite address.
    pub internal: bool,
}

impl HostInterface {
    pub fn new(name: &str, addr: IpAddr, netmask: Option<IpAddr>) -> Self {
        Self {
            name: name.to_string(),
            addr,
            netmask,
            index: None,
            internal: addr.is_loopback(),
        }
    }
}

impl From<&Interface> for HostInterface {
    fn from(intf: &Interface) -> Self {
        let netmask = match &intf.addr {
            IfAddr::V4(v4) => Some(IpAddr::V4(v4.netmask)),
            IfAddr::V6(v6) => Some(IpAddr::V6(v6.netmask)),
        };
        Self {
            name: intf.name.clone(),
            addr: intf.ip(),
            netmask,
            index: intf.index,
            internal: intf.is_loopback(),
        }
    }
}

/// Enumerates every address on every interface of this host, loopback included.
pub fn my_interfaces() -> Vec<HostInterface> {
    if_addrs::get_if_addrs()
        .unwrap_or_default()
        .iter()
        .map(HostInterface::from)
        .collect()
}

/// Returns true for addresses in `fe80::/10`.
pub fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Computes the subnet broadcast address of `addr` under `netmask`.
pub fn ipv4_broadcast_address(addr: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) | !u32::from(netmask))
}

/// Host addresses that rewritten A/AAAA records point to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAddressSet {
    pub ipv4: Option<Ipv4Addr>,
    /// Distinct, non link-local, in interface order.
    pub ipv6: Vec<Ipv6Addr>,
}

impl HostAddressSet {
    /// Picks host addresses from `interfaces`.
    ///
    /// When `preferred` names an interface with at least one non-internal
    /// address, only that interface is used. Otherwise all non-internal
    /// interfaces are.
    pub fn from_interfaces(interfaces: &[HostInterface], preferred: Option<&str>) -> Self {
        let usable: Vec<&HostInterface> = interfaces.iter().filter(|i| !i.internal).collect();

        let narrowed: Vec<&HostInterface> = match preferred {
            Some(name) => usable.iter().copied().filter(|i| i.name == name).collect(),
            None => Vec::new(),
        };
        let chosen = if narrowed.is_empty() { usable } else { narrowed };

        let mut set = HostAddressSet::default();
        for intf in chosen {
            match intf.addr {
                IpAddr::V4(ip) => {
                    if set.ipv4.is_none() && !ip.is_unspecified() {
                        set.ipv4 = Some(ip);
                    }
                }
                IpAddr::V6(ip) => {
                    if !ip.is_unspecified() && !is_ipv6_link_local(&ip) && !set.ipv6.contains(&ip)
                    {
                        set.ipv6.push(ip);
                    }
                }
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ipv4_broadcast_address, is_ipv6_link_local, HostAddressSet, HostInterface};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use test_log::test;

    fn intf(name: &str, addr: &str) -> HostInterface {
        HostInterface::new(name, addr.parse::<IpAddr>().unwrap(), None)
    }

    #[test]
    fn test_broadcast_address() {
        let bcast = ipv4_broadcast_address(
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert_eq!(bcast, Ipv4Addr::new(10, 0, 0, 255));

        let bcast = ipv4_broadcast_address(
            Ipv4Addr::new(172, 17, 3, 9),
            Ipv4Addr::new(255, 255, 0, 0),
        );
        assert_eq!(bcast, Ipv4Addr::new(172, 17, 255, 255));
    }

    #[test]
    fn test_link_local() {
        assert!(is_ipv6_link_local(&"fe80::1".parse::<Ipv6Addr>().unwrap()));
        assert!(is_ipv6_link_local(&"febf::1".parse::<Ipv6Addr>().unwrap()));
        assert!(!is_ipv6_link_local(&"fd00::1".parse::<Ipv6Addr>().unwrap()));
    }

    #[test]
    fn test_host_address_set() {
        let interfaces = vec![
            intf("lo", "127.0.0.1"),
            intf("lo", "::1"),
            intf("eth0", "10.0.0.5"),
            intf("eth0", "fe80::5"),
            intf("eth0", "fd00::1"),
            intf("eth0", "fd00::1"),
            intf("wlan0", "192.168.1.7"),
            intf("wlan0", "fd00::2"),
        ];

        let all = HostAddressSet::from_interfaces(&interfaces, None);
        assert_eq!(all.ipv4, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(
            all.ipv6,
            vec![
                "fd00::1".parse::<Ipv6Addr>().unwrap(),
                "fd00::2".parse::<Ipv6Addr>().unwrap()
            ]
        );

        let wlan = HostAddressSet::from_interfaces(&interfaces, Some("wlan0"));
        assert_eq!(wlan.ipv4, Some(Ipv4Addr::new(192, 168, 1, 7)));
        assert_eq!(wlan.ipv6, vec!["fd00::2".parse::<Ipv6Addr>().unwrap()]);

        // Loopback only, or an unknown name, falls back to everything usable.
        let fallback = HostAddressSet::from_interfaces(&interfaces, Some("lo"));
        assert_eq!(fallback, all);
        let fallback = HostAddressSet::from_interfaces(&interfaces, Some("nope0"));
        assert_eq!(fallback, all);

        let loopback_only = HostAddressSet::from_interfaces(&interfaces[..2], None);
        assert!(loopback_only.is_empty());
    }
}
