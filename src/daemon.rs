//! Runs one [Reflector] in its own thread, driven by a `mio` poll loop.

#[cfg(feature = "logging")]
use crate::log::{debug, info, trace};
use crate::{
    dns_parser::MAX_MSG_ABSOLUTE,
    endpoint::Role,
    loop_cache::current_time_millis,
    reflector::{Metrics, Reflector},
    Error, Result,
};
use flume::{bounded, Receiver, Sender, TrySendError};
use mio::{net::UdpSocket as MioUdpSocket, Poll};
use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    thread,
    time::Duration,
};

const SIGNAL_SOCK_EVENT_KEY: usize = usize::MAX - 1; // avoid to overlap with endpoint tokens

/// How often the loop caches are pruned when no traffic wakes the loop.
const HOUSEKEEPING_INTERVAL_MILLIS: u64 = 1000;

const LOOPBACK_V4: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

/// Status code for the reflector daemon.
#[derive(Debug, PartialEq, Clone, Eq)]
#[non_exhaustive]
pub enum DaemonStatus {
    /// The daemon is running as normal.
    Running,

    /// The daemon has been shutdown.
    Shutdown,
}

/// Commands supported by the daemon
enum Command {
    GetMetrics(Sender<Metrics>),
    GetStatus(Sender<DaemonStatus>),
    Exit(Sender<DaemonStatus>),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetMetrics(_) => write!(f, "Command GetMetrics"),
            Self::GetStatus(_) => write!(f, "Command GetStatus"),
            Self::Exit(_) => write!(f, "Command Exit"),
        }
    }
}

/// A daemon thread running a reflector.
///
/// This struct provides a handle and an API to the daemon. It is cloneable.
#[derive(Clone)]
pub struct ReflectorDaemon {
    /// Sender handle of the channel to the daemon.
    sender: Sender<Command>,

    /// Send to this addr to signal that a `Command` is coming.
    ///
    /// The daemon listens on this addr together with the reflector sockets,
    /// to avoid busy polling the flume channel.
    signal_addr: SocketAddr,
}

impl ReflectorDaemon {
    /// Starts `reflector` and spawns a thread to drive it.
    ///
    /// The reflector's endpoints are bound before this returns, so bind errors
    /// are reported here.
    pub fn new<R: Reflector + 'static>(mut reflector: R) -> Result<Self> {
        // Use port 0 to allow the system assign a random available port.
        let signal_addr = SocketAddrV4::new(LOOPBACK_V4, 0);

        let signal_sock = UdpSocket::bind(signal_addr)
            .map_err(|e| e_fmt!("failed to create signal_sock for daemon: {}", e))?;

        // Get the socket with the OS chosen port
        let signal_addr = signal_sock
            .local_addr()
            .map_err(|e| e_fmt!("failed to get signal sock addr: {}", e))?;

        // Must be nonblocking so we can listen to it together with the endpoints.
        signal_sock
            .set_nonblocking(true)
            .map_err(|e| e_fmt!("failed to set nonblocking for signal socket: {}", e))?;

        let poller = Poll::new().map_err(|e| e_fmt!("failed to create mio Poll: {}", e))?;

        reflector.start()?;
        if let Err(e) = reflector.endpoints_mut().register_all(poller.registry()) {
            reflector.stop();
            return Err(e);
        }

        let (sender, receiver) = bounded(100);

        // Spawn the daemon thread
        let mio_sock = MioUdpSocket::from_std(signal_sock);
        let spawned = thread::Builder::new()
            .name("mDNS_reflector".to_string())
            .spawn(move || Self::daemon_thread(reflector, mio_sock, poller, receiver));
        if let Err(e) = spawned {
            return Err(e_fmt!("thread builder failed to spawn: {}", e));
        }

        Ok(Self {
            sender,
            signal_addr,
        })
    }

    /// Sends `cmd` to the daemon via its channel, and sends a signal
    /// to its sock addr to notify.
    fn send_cmd(&self, cmd: Command) -> Result<()> {
        let cmd_name = cmd.to_string();

        // First, send to the flume channel.
        self.sender.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => Error::Again,
            e => e_fmt!("flume::channel::send failed: {}", e),
        })?;

        // Second, send a signal to notify the daemon.
        let addr = SocketAddrV4::new(LOOPBACK_V4, 0);
        let socket = UdpSocket::bind(addr)
            .map_err(|e| e_fmt!("Failed to create socket to send signal: {}", e))?;
        socket
            .send_to(cmd_name.as_bytes(), self.signal_addr)
            .map_err(|e| {
                e_fmt!(
                    "signal socket send_to {} ({}) failed: {}",
                    self.signal_addr,
                    cmd_name,
                    e
                )
            })?;

        Ok(())
    }

    /// Stops the reflector and its thread, and returns a channel to receive the status.
    ///
    /// Clients of a reflector server are notified before the sockets close.
    /// When an error is returned, the caller should retry only when
    /// the error is `Error::Again`, otherwise should log and move on.
    pub fn shutdown(&self) -> Result<Receiver<DaemonStatus>> {
        let (resp_s, resp_r) = bounded(1);
        self.send_cmd(Command::Exit(resp_s))?;
        Ok(resp_r)
    }

    /// Returns the status of the daemon.
    pub fn status(&self) -> Result<Receiver<DaemonStatus>> {
        let (resp_s, resp_r) = bounded(1);

        if self.sender.is_disconnected() {
            resp_s
                .send(DaemonStatus::Shutdown)
                .map_err(|e| e_fmt!("failed to send daemon status to the client: {}", e))?;
        } else {
            self.send_cmd(Command::GetStatus(resp_s))?;
        }

        Ok(resp_r)
    }

    /// Returns a channel receiver for a snapshot of the reflector's counters.
    pub fn get_metrics(&self) -> Result<Receiver<Metrics>> {
        let (resp_s, resp_r) = bounded(1);
        self.send_cmd(Command::GetMetrics(resp_s))?;
        Ok(resp_r)
    }

    fn daemon_thread<R: Reflector>(
        mut reflector: R,
        mut signal_sock: MioUdpSocket,
        mut poller: Poll,
        receiver: Receiver<Command>,
    ) {
        let exit = Self::run(&mut reflector, &mut signal_sock, &mut poller, &receiver);

        // No handler may run on a reflector being torn down.
        if let Err(e) = reflector.endpoints_mut().deregister_all(poller.registry()) {
            debug!("failed to deregister endpoints: {}", e);
        }
        reflector.stop();

        // Close the channel before answering so `status()` reports shutdown.
        drop(receiver);

        match exit {
            Some(Command::Exit(resp_s)) => {
                if let Err(e) = resp_s.send(DaemonStatus::Shutdown) {
                    debug!("exit: failed to send response of shutdown: {}", e);
                }
            }
            Some(cmd) => debug!("Unexpected command: {}", cmd),
            None => {}
        }
    }

    /// The main event loop of the daemon thread
    ///
    /// In each round, it will:
    /// 1. poll the endpoints and the signal socket, with a timeout.
    /// 2. hand every received datagram to the reflector.
    /// 3. run the reflector's housekeeping.
    /// 4. try_recv on its channel and execute commands.
    fn run<R: Reflector>(
        reflector: &mut R,
        signal_sock: &mut MioUdpSocket,
        poller: &mut Poll,
        receiver: &Receiver<Command>,
    ) -> Option<Command> {
        // Add the daemon's signal socket to the poller.
        if let Err(e) = poller.registry().register(
            signal_sock,
            mio::Token(SIGNAL_SOCK_EVENT_KEY),
            mio::Interest::READABLE,
        ) {
            debug!("failed to add signal socket to the poller: {}", e);
            return None;
        }

        info!("reflector daemon running");
        let timeout = Some(Duration::from_millis(HOUSEKEEPING_INTERVAL_MILLIS));
        let mut events = mio::Events::with_capacity(1024);
        let mut buf = vec![0u8; MAX_MSG_ABSOLUTE];

        loop {
            events.clear();
            match poller.poll(&mut events, timeout) {
                Ok(_) => {
                    for ev in events.iter() {
                        trace!("event received with key {:?}", ev.token());
                        if ev.token().0 == SIGNAL_SOCK_EVENT_KEY {
                            // Drain signals as we will drain commands as well.
                            signal_sock_drain(signal_sock);
                            continue;
                        }

                        match Role::from_token(ev.token()) {
                            Some(role) => handle_read(reflector, role, &mut buf),
                            None => debug!("no endpoint for event key {}", ev.token().0),
                        }
                    }
                }
                Err(e) => debug!("failed to select from sockets: {}", e),
            }

            reflector.housekeeping(current_time_millis());

            // process commands from the command channel
            while let Ok(command) = receiver.try_recv() {
                if matches!(command, Command::Exit(_)) {
                    return Some(command);
                }
                match command {
                    Command::Exit(_) => {}
                    Command::GetMetrics(resp_s) => {
                        if let Err(e) = resp_s.send(reflector.metrics()) {
                            debug!("failed to send metrics: {}", e);
                        }
                    }
                    Command::GetStatus(resp_s) => {
                        if let Err(e) = resp_s.send(DaemonStatus::Running) {
                            debug!("failed to send daemon status: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Reads every pending datagram of the endpoint of `role`.
fn handle_read<R: Reflector>(reflector: &mut R, role: Role, buf: &mut [u8]) {
    loop {
        let received = reflector.endpoints_mut().get(role).recv(buf);
        match received {
            Ok(Some((sz, from))) => {
                trace!("received {} bytes on {} from {}", sz, role, from);
                reflector.handle_message(role, &buf[..sz], from);
            }
            Ok(None) => break,
            Err(e) => {
                reflector.handle_error(role, &e);
                break;
            }
        }
    }
}

fn signal_sock_drain(signal_sock: &MioUdpSocket) {
    let mut signal_buf = [0; 1024];

    // This recv is non-blocking as the socket is non-blocking.
    while let Ok(sz) = signal_sock.recv(&mut signal_buf) {
        trace!(
            "signal socket recvd: {}",
            String::from_utf8_lossy(&signal_buf[0..sz])
        );
    }
}
