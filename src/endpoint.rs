//! UDP socket endpoints driven by a reflector.
//!
//! A reflector owns four endpoints, one per [Role]. The [Endpoint] trait is the
//! seam between relay logic and real sockets: [UdpEndpoint] is the production
//! implementation, tests substitute in-memory fakes.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    interfaces::{ipv4_broadcast_address, my_interfaces, HostInterface, IPV6_ALL_NODES},
    Error, Result,
};
use mio::{net::UdpSocket as MioUdpSocket, Interest, Registry, Token};
use socket2::Socket;
use std::{
    fmt, io,
    net::{
        IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs,
        UdpSocket,
    },
};

/// The mDNS port.
pub const MDNS_PORT: u16 = 5353;

/// Port that reflector servers listen on for unicast datagrams from clients.
pub const REFLECTOR_PORT: u16 = 15353;

pub const GROUP_ADDR_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const GROUP_ADDR_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// IP address family of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub const fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Family::V4,
            SocketAddr::V6(_) => Family::V6,
        }
    }

    /// The mDNS multicast group address of this family.
    pub const fn group_addr(&self) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(GROUP_ADDR_V4),
            Family::V6 => IpAddr::V6(GROUP_ADDR_V6),
        }
    }

    /// Loopback address of this family, as a host string.
    pub const fn localhost(&self) -> &'static str {
        match self {
            Family::V4 => "127.0.0.1",
            Family::V6 => "::1",
        }
    }

    fn unspecified(&self, port: u16) -> SocketAddr {
        match self {
            Family::V4 => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into(),
            Family::V6 => SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0).into(),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// The four endpoints a reflector drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    MulticastV4,
    MulticastV6,
    UnicastV4,
    UnicastV6,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::MulticastV4,
        Role::MulticastV6,
        Role::UnicastV4,
        Role::UnicastV6,
    ];

    pub const fn multicast(family: Family) -> Self {
        match family {
            Family::V4 => Role::MulticastV4,
            Family::V6 => Role::MulticastV6,
        }
    }

    pub const fn unicast(family: Family) -> Self {
        match family {
            Family::V4 => Role::UnicastV4,
            Family::V6 => Role::UnicastV6,
        }
    }

    pub const fn family(&self) -> Family {
        match self {
            Role::MulticastV4 | Role::UnicastV4 => Family::V4,
            Role::MulticastV6 | Role::UnicastV6 => Family::V6,
        }
    }

    pub const fn is_multicast(&self) -> bool {
        matches!(self, Role::MulticastV4 | Role::MulticastV6)
    }

    /// Poll token used when this endpoint is registered with `mio`.
    pub const fn token(&self) -> Token {
        Token(*self as usize)
    }

    pub fn from_token(token: Token) -> Option<Self> {
        Self::ALL.get(token.0).copied()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MulticastV4 => write!(f, "multicast-v4"),
            Self::MulticastV6 => write!(f, "multicast-v6"),
            Self::UnicastV4 => write!(f, "unicast-v4"),
            Self::UnicastV6 => write!(f, "unicast-v6"),
        }
    }
}

/// One UDP socket of a fixed family, as seen by a reflector.
pub trait Endpoint: Send {
    fn family(&self) -> Family;

    /// Binds the socket. Returns the local address once it is ready.
    /// Calling it on a started endpoint returns the bound address again.
    fn start(&mut self) -> Result<SocketAddr>;

    /// Closes the socket. No-op if not started.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize>;

    /// Resolves `host` (an IP literal or a hostname) to an address of this
    /// endpoint's family.
    fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        resolve_host(host, port, self.family())
    }

    /// Sends `payload` to `host:port`.
    fn send(&self, payload: &[u8], host: &str, port: u16) -> Result<usize> {
        let addr = self.resolve(host, port)?;
        self.send_to(payload, addr)
    }

    /// Receives one datagram. `Ok(None)` means nothing is pending.
    fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>>;

    fn register(&mut self, registry: &Registry, token: Token) -> Result<()>;

    fn deregister(&mut self, registry: &Registry) -> Result<()>;

    /// Interface this endpoint is bound to, if one was chosen.
    fn interface_name(&self) -> Option<&str> {
        None
    }

    /// Snapshot of the host interfaces visible to this endpoint.
    fn host_interfaces(&self) -> Vec<HostInterface> {
        my_interfaces()
    }

    fn ipv4_interface_address(&self, interface_name: Option<&str>) -> Result<Ipv4Addr> {
        self.host_interfaces()
            .iter()
            .filter(|i| !i.internal && interface_name.map_or(true, |name| i.name == name))
            .find_map(|i| match i.addr {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| e_fmt!("no IPv4 address on interface {:?}", interface_name))
    }

    fn ipv6_interface_address(&self, interface_name: Option<&str>) -> Result<Ipv6Addr> {
        self.host_interfaces()
            .iter()
            .filter(|i| !i.internal && interface_name.map_or(true, |name| i.name == name))
            .find_map(|i| match i.addr {
                IpAddr::V6(ip) => Some(ip),
                IpAddr::V4(_) => None,
            })
            .ok_or_else(|| e_fmt!("no IPv6 address on interface {:?}", interface_name))
    }

    fn netmask(&self, addr: IpAddr) -> Result<IpAddr> {
        self.host_interfaces()
            .iter()
            .find(|i| i.addr == addr)
            .and_then(|i| i.netmask)
            .ok_or_else(|| e_fmt!("no netmask known for {}", addr))
    }

    fn ipv4_broadcast_address(&self, addr: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
        ipv4_broadcast_address(addr, netmask)
    }

    fn ipv6_broadcast_address(&self) -> Ipv6Addr {
        IPV6_ALL_NODES
    }
}

/// Resolves `host:port` to an address of `family`.
pub fn resolve_host(host: &str, port: u16, family: Family) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = SocketAddr::new(ip, port);
        if Family::of(&addr) != family {
            return Err(e_fmt!("{} is not an {} address", host, family));
        }
        return Ok(addr);
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| e_fmt!("resolve host {}: {}", host, e))?
        .find(|addr| Family::of(addr) == family)
        .ok_or_else(|| e_fmt!("no {} address for host {}", family, host))
}

/// How a [UdpEndpoint] binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Bound to the mDNS port and joined to the mDNS group.
    Multicast,
    /// Bound to this port, 0 for ephemeral.
    Unicast(u16),
}

/// A real UDP socket, set up with `socket2` and polled with `mio`.
pub struct UdpEndpoint {
    family: Family,
    mode: Mode,
    interface: Option<String>,
    socket: Option<MioUdpSocket>,
}

impl UdpEndpoint {
    /// An endpoint joined to the mDNS group of `family`, optionally on one interface.
    pub fn multicast(family: Family, interface: Option<String>) -> Self {
        Self {
            family,
            mode: Mode::Multicast,
            interface,
            socket: None,
        }
    }

    /// A plain endpoint bound to `port` (0 for ephemeral).
    pub fn unicast(family: Family, port: u16) -> Self {
        Self {
            family,
            mode: Mode::Unicast(port),
            interface: None,
            socket: None,
        }
    }

    fn open(&self) -> Result<Socket> {
        match self.mode {
            Mode::Unicast(port) => {
                let sock = new_socket(self.family.unspecified(port), true)?;
                if self.family == Family::V4 {
                    sock.set_broadcast(true)
                        .map_err(|e| e_fmt!("set broadcast on {}: {}", self, e))?;
                }
                Ok(sock)
            }
            Mode::Multicast => self.open_multicast(),
        }
    }

    fn open_multicast(&self) -> Result<Socket> {
        let preferred = self.interface.as_deref();
        let sock = new_socket(self.family.unspecified(MDNS_PORT), true)?;

        match self.family {
            Family::V4 => {
                let intf_ip = match preferred {
                    Some(_) => self.ipv4_interface_address(preferred)?,
                    None => Ipv4Addr::UNSPECIFIED,
                };

                // Join mDNS group to receive packets.
                sock.join_multicast_v4(&GROUP_ADDR_V4, &intf_ip)
                    .map_err(|e| e_fmt!("join multicast group on addr {}: {}", intf_ip, e))?;

                // Set IP_MULTICAST_IF to send packets.
                if !intf_ip.is_unspecified() {
                    sock.set_multicast_if_v4(&intf_ip)
                        .map_err(|e| e_fmt!("set multicast_if on addr {}: {}", intf_ip, e))?;
                }

                sock.set_broadcast(true)
                    .map_err(|e| e_fmt!("set broadcast on {}: {}", self, e))?;
            }
            Family::V6 => {
                let index = match preferred {
                    Some(name) => my_interfaces()
                        .iter()
                        .find(|i| i.name == name && i.index.is_some())
                        .and_then(|i| i.index)
                        .ok_or_else(|| e_fmt!("no IPv6 interface index for {}", name))?,
                    None => 0,
                };

                sock.join_multicast_v6(&GROUP_ADDR_V6, index)
                    .map_err(|e| e_fmt!("join multicast group on index {}: {}", index, e))?;

                sock.set_multicast_if_v6(index)
                    .map_err(|e| e_fmt!("set multicast_if on index {}: {}", index, e))?;
            }
        }
        Ok(sock)
    }

    fn socket(&self) -> Result<&MioUdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| e_fmt!("endpoint {} is not started", self))
    }
}

impl fmt::Display for UdpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Multicast => write!(f, "multicast {}", self.family)?,
            Mode::Unicast(port) => write!(f, "unicast {} port {}", self.family, port)?,
        }
        if let Some(name) = self.interface.as_ref() {
            write!(f, " on {}", name)?;
        }
        Ok(())
    }
}

impl Endpoint for UdpEndpoint {
    fn family(&self) -> Family {
        self.family
    }

    fn start(&mut self) -> Result<SocketAddr> {
        if let Some(sock) = self.socket.as_ref() {
            return sock
                .local_addr()
                .map_err(|e| e_fmt!("local_addr of {}: {}", self, e));
        }

        let sock = MioUdpSocket::from_std(UdpSocket::from(self.open()?));
        let local = sock
            .local_addr()
            .map_err(|e| e_fmt!("local_addr of {}: {}", self, e))?;
        self.socket = Some(sock);

        debug!("{} ready on {}", self, local);
        Ok(local)
    }

    fn stop(&mut self) {
        if self.socket.take().is_some() {
            debug!("{} closed", self);
        }
    }

    fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        if Family::of(&addr) != self.family {
            return Err(e_fmt!("{} is not an {} address", addr, self.family));
        }
        let sent = self
            .socket()?
            .send_to(payload, addr)
            .map_err(|e| e_fmt!("send {} bytes to {}: {}", payload.len(), addr, e))?;
        trace!("{} sent {} bytes to {}", self, sent, addr);
        Ok(sent)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        let sock = match self.socket.as_ref() {
            Some(sock) => sock,
            None => return Ok(None),
        };

        match sock.recv_from(buf) {
            Ok((sz, from)) => Ok(Some((sz, from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e_fmt!("recv on {}: {}", self, e)),
        }
    }

    fn register(&mut self, registry: &Registry, token: Token) -> Result<()> {
        let desc = self.to_string();
        let sock = self
            .socket
            .as_mut()
            .ok_or_else(|| e_fmt!("endpoint {} is not started", desc))?;
        registry
            .register(sock, token, Interest::READABLE)
            .map_err(|e| e_fmt!("register {} with poller: {}", desc, e))
    }

    fn deregister(&mut self, registry: &Registry) -> Result<()> {
        let desc = self.to_string();
        match self.socket.as_mut() {
            Some(sock) => registry
                .deregister(sock)
                .map_err(|e| e_fmt!("deregister {} from poller: {}", desc, e)),
            None => Ok(()),
        }
    }

    fn interface_name(&self) -> Option<&str> {
        self.interface.as_deref()
    }
}

/// Creates a non-blocking UDP socket bound to `addr`, with address and port reuse.
fn new_socket(addr: SocketAddr, non_block: bool) -> Result<Socket> {
    let domain = match addr {
        SocketAddr::V4(_) => socket2::Domain::IPV4,
        SocketAddr::V6(_) => socket2::Domain::IPV6,
    };

    let fd = Socket::new(domain, socket2::Type::DGRAM, None)
        .map_err(|e| e_fmt!("create socket failed: {}", e))?;

    fd.set_reuse_address(true)
        .map_err(|e| e_fmt!("set ReuseAddr failed: {}", e))?;
    #[cfg(unix)] // this is currently restricted to Unix's in socket2
    fd.set_reuse_port(true)
        .map_err(|e| e_fmt!("set ReusePort failed: {}", e))?;

    if addr.is_ipv6() {
        fd.set_only_v6(true)
            .map_err(|e| e_fmt!("set IPV6_V6ONLY failed: {}", e))?;
    }

    if non_block {
        fd.set_nonblocking(true)
            .map_err(|e| e_fmt!("set O_NONBLOCK: {}", e))?;
    }

    fd.bind(&addr.into())
        .map_err(|e| e_fmt!("socket bind to {} failed: {}", &addr, e))?;

    trace!("new socket bind to {}", &addr);
    Ok(fd)
}

/// The four endpoints of one reflector, addressed by [Role].
pub struct EndpointSet {
    endpoints: [Box<dyn Endpoint>; 4],
}

impl EndpointSet {
    pub fn new(
        multicast_v4: Box<dyn Endpoint>,
        multicast_v6: Box<dyn Endpoint>,
        unicast_v4: Box<dyn Endpoint>,
        unicast_v6: Box<dyn Endpoint>,
    ) -> Self {
        Self {
            endpoints: [multicast_v4, multicast_v6, unicast_v4, unicast_v6],
        }
    }

    /// Real sockets: multicast on the mDNS port, unicast on `unicast_port`.
    pub fn udp(unicast_port: u16, interface: Option<String>) -> Self {
        Self::new(
            Box::new(UdpEndpoint::multicast(Family::V4, interface.clone())),
            Box::new(UdpEndpoint::multicast(Family::V6, interface)),
            Box::new(UdpEndpoint::unicast(Family::V4, unicast_port)),
            Box::new(UdpEndpoint::unicast(Family::V6, unicast_port)),
        )
    }

    pub fn get(&self, role: Role) -> &dyn Endpoint {
        self.endpoints[role as usize].as_ref()
    }

    pub fn get_mut(&mut self, role: Role) -> &mut dyn Endpoint {
        self.endpoints[role as usize].as_mut()
    }

    /// Starts all four endpoints. If one fails, the ones already started are stopped.
    pub fn start_all(&mut self) -> Result<()> {
        for role in Role::ALL.iter() {
            match self.get_mut(*role).start() {
                Ok(addr) => debug!("{} endpoint listening on {}", role, addr),
                Err(e) => {
                    self.stop_all();
                    return Err(Error::Msg(format!("start {} endpoint: {}", role, e)));
                }
            }
        }
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for endpoint in self.endpoints.iter_mut() {
            endpoint.stop();
        }
    }

    pub fn register_all(&mut self, registry: &Registry) -> Result<()> {
        for role in Role::ALL.iter() {
            self.get_mut(*role).register(registry, role.token())?;
        }
        Ok(())
    }

    /// Deregisters every endpoint, continuing past failures. Returns the first error.
    pub fn deregister_all(&mut self, registry: &Registry) -> Result<()> {
        let mut result = Ok(());
        for role in Role::ALL.iter() {
            if let Err(e) = self.get_mut(*role).deregister(registry) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::{Endpoint, Family, Role, UdpEndpoint};
    use std::{thread, time::Duration};
    use test_log::test;

    #[test]
    fn test_role_tokens() {
        for role in Role::ALL.iter() {
            assert_eq!(Role::from_token(role.token()), Some(*role));
        }
        assert_eq!(Role::from_token(mio::Token(4)), None);
        assert_eq!(Role::multicast(Family::V6), Role::MulticastV6);
        assert_eq!(Role::unicast(Family::V4).family(), Family::V4);
        assert!(!Role::UnicastV6.is_multicast());
    }

    #[test]
    fn test_unicast_loopback() {
        let mut receiver = UdpEndpoint::unicast(Family::V4, 0);
        let mut sender = UdpEndpoint::unicast(Family::V4, 0);
        let addr = receiver.start().unwrap();
        sender.start().unwrap();

        // Idempotent start.
        assert_eq!(receiver.start().unwrap(), addr);

        let payload = [0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let sent = sender.send(&payload, "127.0.0.1", addr.port()).unwrap();
        assert_eq!(sent, payload.len());

        let mut buf = [0u8; 64];
        let mut received = None;
        for _ in 0..50 {
            if let Some(got) = receiver.recv(&mut buf).unwrap() {
                received = Some(got);
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let (sz, _from) = received.expect("datagram over loopback");
        assert_eq!(&buf[..sz], &payload);

        // Wrong family is rejected before sending.
        assert!(sender.send(&payload, "::1", addr.port()).is_err());

        receiver.stop();
        assert!(!receiver.is_running());
        assert!(receiver.send(&payload, "127.0.0.1", 9).is_err());
        assert_eq!(receiver.recv(&mut buf).unwrap(), None);
    }
}
