use crate::{
    config::ServerConfig,
    dispatcher::Dispatcher,
    logging::{init_logging, LogConfig},
    message::{Message, MessageType, Method, Request, Response},
    middleware::{MetricsMiddleware, Middleware, TracingMiddleware},
    resource::{FixedReading, ResourceTable, TemperatureResource, ThermalZoneSource},
    server::{CoapServer, ServerHandle, MAX_DATAGRAM_LEN},
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Command-line interface for minicoap
#[derive(Parser)]
#[command(name = "minicoap")]
#[command(about = "Minimal CoAP resource server", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve the /temp resource over UDP
    Serve {
        /// UDP address to bind (overrides the config file)
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// YAML server configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// sysfs file holding millidegrees Celsius
        #[arg(long, conflicts_with = "fixed_reading")]
        thermal_zone: Option<PathBuf>,

        /// Serve a constant reading instead of a sensor
        #[arg(long)]
        fixed_reading: Option<f64>,
    },
    /// Send one confirmable GET and print the response
    Get {
        /// Server address
        #[arg(long, default_value = "127.0.0.1:5683")]
        addr: SocketAddr,

        /// Resource path
        #[arg(long, default_value = "/temp")]
        path: String,

        /// Give up after this many milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}

/// Execute the parsed command.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the server fails to
/// start, or (for `get`) no response arrives in time.
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            addr,
            config,
            thermal_zone,
            fixed_reading,
        } => serve(addr, config, thermal_zone, fixed_reading),
        Commands::Get {
            addr,
            path,
            timeout_ms,
        } => {
            let response = get(addr, &path, Duration::from_millis(timeout_ms))?;
            println!(
                "{} {}",
                response.status,
                response.payload_str().unwrap_or_default()
            );
            Ok(())
        }
    }
}

fn serve(
    addr: Option<SocketAddr>,
    config_path: Option<PathBuf>,
    thermal_zone: Option<PathBuf>,
    fixed_reading: Option<f64>,
) -> Result<()> {
    let guard = init_logging(&LogConfig::from_env())?;

    let mut config = match &config_path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env()?,
        None => ServerConfig::from_env()?,
    };
    if let Some(addr) = addr {
        config.bind = addr;
    }

    let mut table = ResourceTable::new();
    match fixed_reading {
        Some(value) => table.register("/temp", TemperatureResource::new(FixedReading(value)))?,
        None => {
            let source = thermal_zone
                .map(ThermalZoneSource::new)
                .unwrap_or_default();
            info!(thermal_zone = %source.path().display(), "Reading temperature from sysfs");
            table.register("/temp", TemperatureResource::new(source))?;
        }
    }

    let mut dispatcher = Dispatcher::new(table, config.dispatcher_config())
        .context("failed to start resource workers")?;
    dispatcher.add_middleware(Arc::new(TracingMiddleware));
    let metrics = Arc::new(MetricsMiddleware::default());
    let metrics_mw: Arc<dyn Middleware> = Arc::<MetricsMiddleware>::clone(&metrics);
    dispatcher.add_middleware(metrics_mw);

    let bind = config.bind;
    let handle = CoapServer::new(dispatcher, config)
        .with_logging_guard(guard)
        .start(bind)
        .with_context(|| format!("failed to bind {bind}"))?;

    wait_for_shutdown(handle)?;
    println!(
        "served {} requests ({} client errors, {} server errors)",
        metrics.request_count(),
        metrics.client_errors(),
        metrics.server_errors()
    );
    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown(handle: ServerHandle) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    handle.stop();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(handle: ServerHandle) -> Result<()> {
    handle
        .join()
        .map_err(|e| anyhow::anyhow!("server stopped abnormally: {e:?}"))
}

/// One confirmable GET over a plain blocking socket.
///
/// Waits through an empty ACK for the separate response and acknowledges it.
pub fn get(addr: SocketAddr, path: &str, timeout: Duration) -> Result<Response> {
    let local: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).context("failed to bind client socket")?;

    let mut request = Request::new(Method::Get, path);
    request.message_id = rand::random();
    request.token = rand::random::<[u8; 4]>().to_vec();
    socket
        .send_to(&request.to_message().encode(), addr)
        .with_context(|| format!("failed to send to {addr}"))?;

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("no response from {addr} within {timeout:?}");
        }
        socket.set_read_timeout(Some(remaining))?;
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(e) => return Err(e).context("receive failed"),
        };
        if from != addr {
            continue;
        }
        let Ok(msg) = Message::decode(&buf[..len]) else {
            continue;
        };

        match msg.mtype {
            MessageType::Reset if msg.message_id == request.message_id => {
                bail!("{addr} reset the request");
            }
            MessageType::Acknowledgement if msg.message_id == request.message_id => {
                if msg.code.is_empty() {
                    // Separate response follows
                    continue;
                }
            }
            MessageType::Confirmable if msg.token == request.token => {
                socket.send_to(&Message::empty_ack(msg.message_id).encode(), addr)?;
            }
            MessageType::NonConfirmable if msg.token == request.token => {}
            _ => continue,
        }

        if msg.token != request.token {
            continue;
        }
        return Response::from_message(&msg)
            .with_context(|| format!("unrecognized response code {}", msg.code));
    }
}
