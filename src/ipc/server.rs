//! Unix domain socket server for IPC
//!
//! The event source delivers notifications over this socket and the
//! settings UI uses it for access queries and status.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::{NotificationEvent, TriggerEvent};
use crate::listener::{deliver, DeliveryError, ListenerAccess};
use crate::trigger::TriggerEngine;

use super::protocol::{DaemonStatus, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with client handlers
struct Shared {
    engine: Arc<TriggerEngine>,
    access: Arc<ListenerAccess>,
    status: RwLock<DaemonStatus>,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(
        socket_path: &Path,
        engine: Arc<TriggerEngine>,
        access: Arc<ListenerAccess>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared: Arc::new(Shared {
                engine,
                access,
                status: RwLock::new(DaemonStatus::new()),
                start_time: std::time::Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Fold a trigger event into the reported status
    pub async fn record(&self, event: &TriggerEvent) {
        self.shared.status.write().await.record(event);
    }

    /// Current status snapshot
    pub async fn status(&self) -> DaemonStatus {
        self.shared.snapshot().await
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    info!("event source connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(mut stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    info!("event source disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => {
                    debug!(?request, "received request");
                    shared.process_request(request).await
                }
                Err(e) => {
                    warn!(error = %e, "malformed request");
                    Response::error("bad_request", e)
                }
            };

            send_message(&mut stream, &response).await?;
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

impl Shared {
    async fn snapshot(&self) -> DaemonStatus {
        let mut status = self.status.read().await.clone();
        status.uptime_secs = self.start_time.elapsed().as_secs();
        status.listener_enabled = self.access.is_enabled();
        status.pulse_gap_ms = self.engine.pulse_gap().as_millis() as u64;
        status.active_sessions = self.engine.active_sessions() as u64;
        status.workers_busy = self.engine.pool().busy() as u64;
        status.workers = self.engine.pool().size() as u64;
        status
    }

    /// Process a request and return a response
    async fn process_request(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::NotificationPosted { source_app_id } => {
                // The mapping lookup reads the settings store from disk
                let engine = Arc::clone(&self.engine);
                let event = NotificationEvent::new(source_app_id);
                let delivered =
                    tokio::task::spawn_blocking(move || deliver(engine.as_ref(), &event)).await;

                match delivered {
                    Ok(Ok(session_id)) => Response::Accepted { session_id },
                    Ok(Err(e @ DeliveryError::MissingAppId)) => Response::error("invalid_event", e),
                    Ok(Err(e @ DeliveryError::HandlerPanicked)) => {
                        Response::error("handler_failed", e)
                    }
                    Err(e) => {
                        error!(error = %e, "notification delivery task failed");
                        Response::error("handler_failed", e)
                    }
                }
            }

            Request::IsEnabled => Response::Enabled {
                enabled: self.access.is_enabled(),
            },

            Request::OpenSettings => match self.access.open_settings() {
                Ok(()) => Response::SettingsOpened,
                Err(e) => {
                    warn!(error = %e, "failed to open settings");
                    Response::error("settings_unavailable", e)
                }
            },

            Request::GetStatus => Response::Status(self.snapshot().await),
        }
    }
}

/// Send a length-prefixed JSON message
pub async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;

    Ok(())
}
