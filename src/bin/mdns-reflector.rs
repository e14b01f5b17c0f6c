use clap::{Args, Parser, Subcommand};
use mdns_reflector::{
    Config, EndpointSet, ReflectorClient, ReflectorDaemon, ReflectorServer, DEFAULT_GATEWAY_HOST,
    REFLECTOR_PORT,
};
use std::time::Duration;

/// How often the counters are logged in debug mode.
const METRICS_INTERVAL_SECS: u64 = 60;

/// How long to wait for the daemon to notify clients and close its sockets.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "mdns-reflector")]
#[command(version)]
#[command(about = "Relays mDNS traffic across network boundaries over unicast", long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Mode {
    /// Run where multicast cannot leave, e.g. inside a container.
    Client {
        /// Reflector server to relay to.
        #[arg(long, default_value_t = DEFAULT_GATEWAY_HOST.to_string())]
        gateway: String,
    },
    /// Run on the host and relay for the clients.
    Server {
        /// Unicast port clients send to.
        #[arg(long, default_value_t = REFLECTOR_PORT)]
        port: u16,
    },
}

#[derive(Args)]
struct Options {
    /// Log at debug level.
    #[arg(long, visible_alias = "verbose", global = true)]
    debug: bool,

    /// Log warnings and errors only.
    #[arg(long, global = true)]
    silent: bool,

    /// Only log relayed messages with a name containing one of these.
    #[arg(long, num_args = 1.., global = true)]
    filter: Vec<String>,

    /// Also relay to localhost.
    #[arg(long, global = true)]
    localhost: bool,

    /// Server: also relay to the subnet broadcast address.
    #[arg(long, global = true)]
    broadcast: bool,

    /// Server: relay messages from one client to the other clients.
    #[arg(long, global = true)]
    share_with_clients: bool,

    /// Server: log every rewritten response.
    #[arg(long, global = true)]
    log_reflector_messages: bool,

    /// Host interface to use for multicast and address rewriting.
    #[arg(long, global = true)]
    interface: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let opts = cli.options;

    let level = if opts.debug {
        "debug"
    } else if opts.silent {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::new()
        .with_filters(opts.filter)
        .with_debug(opts.debug)
        .with_silent(opts.silent)
        .with_localhost(opts.localhost)
        .with_broadcast(opts.broadcast)
        .with_share_with_clients(opts.share_with_clients)
        .with_log_reflector_messages(opts.log_reflector_messages)
        .with_interface(opts.interface);

    let daemon = match cli.mode {
        Mode::Client { gateway } => {
            let config = config.with_gateway_host(&gateway);
            let endpoints = EndpointSet::udp(0, config.interface.clone());
            ReflectorDaemon::new(ReflectorClient::new(config, endpoints))?
        }
        Mode::Server { port } => {
            let endpoints = EndpointSet::udp(port, config.interface.clone());
            ReflectorDaemon::new(ReflectorServer::new(config, endpoints))?
        }
    };

    let (stop_tx, stop_rx) = flume::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    // The daemon thread does the work. Log its counters until asked to stop.
    loop {
        match stop_rx.recv_timeout(Duration::from_secs(METRICS_INTERVAL_SECS)) {
            Err(flume::RecvTimeoutError::Timeout) => {
                let metrics = daemon.get_metrics()?.recv()?;
                log::debug!("metrics: {:?}", metrics);
            }
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("shutting down");
    let status = daemon
        .shutdown()?
        .recv_timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS))?;
    log::debug!("daemon status: {:?}", status);
    Ok(())
}
