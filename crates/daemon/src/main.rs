//! Meridian daemon binary: runs the tunnel server or client plus the
//! admin control socket until interrupted.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use meridian_daemon::{ControlServer, ControlServerConfig, DaemonError, DaemonMode, DaemonService};
use meridian_settings::Settings;

#[derive(Parser)]
#[command(name = "meridiand", about = "Meridian tunnel daemon")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Path to a settings file; defaults to the platform config dir.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Listen for inbound tunnel connections.
    Server,
    /// Dial a remote tunnel endpoint.
    Client {
        endpoint: SocketAddr,
        #[arg(long)]
        server_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    meridian_logging::init("info,meridian=debug");

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load_or_default()?,
    };

    let mode = match cli.mode {
        Mode::Server => DaemonMode::Server,
        Mode::Client { endpoint, server_name } => DaemonMode::Client { endpoint, server_name },
    };

    tracing::info!(?mode, "starting meridian daemon");

    let service = DaemonService::new(settings);
    let control = ControlServer::new(ControlServerConfig::default(), service.clone());
    let shutdown = service.shutdown_token();

    let control_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { control.run(shutdown).await }
    });

    tokio::select! {
        result = service.run(mode) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "daemon task failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            service.shutdown();
        }
    }

    let _ = control_task.await;
    tracing::info!("daemon stopped");
    Ok(())
}
