//! Keyrelay — signal relay for remote keyboards
//!
//! Keyboards hold a WebSocket open on `/listen` and name themselves by
//! sending their identifier as a text frame. Anything that can issue an HTTP
//! request then drives them with `POST /<keyboard>/<signal>` and a body of
//! either an integer or `nosignal`.
//!
//! Usage:
//!   keyrelay                                 # Listen on 127.0.0.1:80
//!   keyrelay --listen 0.0.0.0:8080           # Custom interface and port
//!   keyrelay --strict-status                 # 400/404 instead of 200 on errors

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use keyrelay_server::{KeyboardRegistry, RelayServer};
use keyrelay_transport::{
    DEFAULT_LISTEN, ErrorStatusPolicy, ListenAddr, ShutdownHandle, TransportConfig, TransportServer,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "keyrelay",
    about = "Relay HTTP signals to keyboards connected over WebSocket",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Interface and port to listen on
    #[arg(long, value_name = "HOST:PORT", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.keyrelay/logs/keyrelay.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    /// Answer refused requests with 400/404 instead of 200
    #[arg(long)]
    strict_status: bool,
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(ref log_file_arg) = cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    let log_path = if log_file_arg == "DEFAULT" {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".keyrelay/logs/keyrelay.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            error!("Failed to open log file {}: {e}", log_path.display());
        }
    }
}

/// Forward SIGINT / SIGTERM / SIGHUP to the shutdown handle, for as long as
/// the process lives. Only the first one does anything.
async fn forward_signals(shutdown: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(term), Ok(hup)) => (term, hup),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {e}");
                return;
            }
        };

        loop {
            let name = tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
                _ = hup.recv() => "SIGHUP",
            };
            info!("{name}");
            if !shutdown.shutdown() {
                debug!("Shutdown already in progress");
            }
        }
    }

    #[cfg(not(unix))]
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Ctrl+C");
        if !shutdown.shutdown() {
            debug!("Shutdown already in progress");
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let listen: ListenAddr = match cli.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("  Keyrelay {}", env!("CARGO_PKG_VERSION"));
    println!("  Hostname:   {}", listen.host);
    println!("  Port:       {}", listen.port);
    println!();

    let config = TransportConfig {
        listen,
        error_status: if cli.strict_status {
            ErrorStatusPolicy::ClientError
        } else {
            ErrorStatusPolicy::AlwaysOk
        },
        ..TransportConfig::default()
    };

    // Owned here, shared by the connection tasks and the dispatcher
    let registry = Arc::new(KeyboardRegistry::new());
    let server = Arc::new(RelayServer::new(registry.clone()));

    let mut transport = match TransportServer::start(config, server).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    println!("  Server listening on: {}", transport.local_addr());
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::spawn(forward_signals(transport.shutdown_handle()));

    transport.wait().await;

    info!("Cleanup complete ({} keyboard(s) still registered)", registry.len());
    println!("  Goodbye.");
}
