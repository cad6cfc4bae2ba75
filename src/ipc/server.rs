//! Unix domain socket server for IPC
//!
//! Signal listeners and capture pipelines push into the daemon through
//! requests; subscribed clients receive utterances and mode changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capability::{AccessibilityBridge, ScreenCaptureBridge};
use crate::context::ContextStore;
use crate::mode::Mode;
use crate::settings::Settings;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// Daemon components reachable from IPC requests
pub struct ServerContext {
    pub store: Arc<ContextStore>,
    pub settings: Arc<watch::Sender<Settings>>,
    pub settings_path: PathBuf,
    pub screen: Arc<ScreenCaptureBridge>,
    pub accessibility: Arc<AccessibilityBridge>,
    pub mode: watch::Receiver<Mode>,
    pub utterances: broadcast::Sender<String>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    ctx: Arc<ServerContext>,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(socket_path: &Path, ctx: ServerContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            ctx: Arc::new(ctx),
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = Arc::clone(&self.ctx);
                    let start_time = self.start_time;
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, ctx, start_time) => {
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
    async fn handle_client(
        stream: UnixStream,
        ctx: Arc<ServerContext>,
        start_time: Instant,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let mut pusher: Option<JoinHandle<()>> = None;

        let result: Result<()> = async {
            let mut len_buf = [0u8; 4];
            loop {
                match reader.read_exact(&mut len_buf).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        debug!("client disconnected");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }

                let len = u32::from_le_bytes(len_buf) as usize;
                if len > MAX_MESSAGE_LEN {
                    warn!(len, "message too large, disconnecting");
                    return Ok(());
                }

                let mut msg_buf = vec![0u8; len];
                reader.read_exact(&mut msg_buf).await?;

                let (response, subscribe) = match serde_json::from_slice::<Request>(&msg_buf) {
                    Ok(request) => {
                        debug!(request = request_name(&request), "received request");
                        process_request(request, &ctx, start_time).await
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to parse request");
                        (Response::error("invalid_request", e.to_string()), false)
                    }
                };

                send_message(&writer, &response).await?;

                if subscribe && pusher.is_none() {
                    debug!("client subscribed to notifications");
                    let writer = Arc::clone(&writer);
                    let utterances = ctx.utterances.subscribe();
                    let mode = ctx.mode.clone();
                    pusher = Some(tokio::spawn(async move {
                        if let Err(e) = push_notifications(writer, utterances, mode).await {
                            debug!(?e, "notification push ended");
                        }
                    }));
                }
            }
        }
        .await;

        if let Some(pusher) = pusher {
            pusher.abort();
        }
        result
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Forward utterances and mode changes to one subscribed client
async fn push_notifications(
    writer: SharedWriter,
    mut utterances: broadcast::Receiver<String>,
    mut mode: watch::Receiver<Mode>,
) -> Result<()> {
    let mut previous = *mode.borrow_and_update();

    loop {
        let notification = tokio::select! {
            received = utterances.recv() => match received {
                Ok(text) => Notification::Utterance { text },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, utterances dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            changed = mode.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *mode.borrow_and_update();
                let notification = Notification::ModeChanged { mode: current, previous };
                previous = current;
                notification
            }
        };

        send_message(&writer, &notification).await?;
    }
}

/// Send a length-prefixed JSON message
async fn send_message<T: serde::Serialize>(writer: &SharedWriter, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("message too large to frame")?
        .to_le_bytes();

    let mut writer = writer.lock().await;
    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

/// Process a request and return a response.
/// Returns (Response, should_subscribe)
async fn process_request(
    request: Request,
    ctx: &ServerContext,
    start_time: Instant,
) -> (Response, bool) {
    let response = match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => Response::Status(DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: *ctx.mode.borrow(),
            settings: ctx.settings.borrow().clone(),
            screen_capture_available: ctx.screen.is_available(),
            accessibility_available: ctx.accessibility.is_available(),
            notification_count: ctx.store.snapshot().notification_count,
            uptime_secs: start_time.elapsed().as_secs(),
        }),

        Request::GetSnapshot => Response::Snapshot {
            snapshot: ctx.store.snapshot(),
        },

        Request::Subscribe => return (Response::Subscribed, true),

        Request::PostNotification { notification } => {
            ctx.store.on_notification_posted(notification);
            Response::Ok
        }

        Request::RemoveNotification { key } => {
            ctx.store.on_notification_removed(&key);
            Response::Ok
        }

        Request::ReplaceNotifications { notifications } => {
            ctx.store.replace_active_notifications(notifications);
            Response::Ok
        }

        Request::UpdateMedia { media } => {
            ctx.store.on_media_updated(media);
            Response::Ok
        }

        Request::ClearMedia => {
            ctx.store.clear_media();
            Response::Ok
        }

        Request::UpdateSettings { settings } => {
            let settings = settings.normalized();
            let (to_save, path) = (settings.clone(), ctx.settings_path.clone());
            match tokio::task::spawn_blocking(move || to_save.save(&path)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, path = ?ctx.settings_path, "failed to persist settings")
                }
                Err(e) => warn!(?e, "settings persistence task failed"),
            }
            info!(
                enabled = settings.enabled,
                analysis_mode = %settings.analysis_mode,
                "settings updated via IPC"
            );
            ctx.settings.send_replace(settings);
            Response::Ok
        }

        Request::SetScreenCaptureAvailable { available } => {
            ctx.screen.set_available(available);
            Response::Ok
        }

        Request::PushScreenFrame { frame } => match frame.into_capture() {
            Ok(capture) => {
                ctx.screen.update_frame(capture);
                Response::Ok
            }
            Err(e) => Response::error("invalid_frame", e.to_string()),
        },

        Request::SetAccessibilityAvailable { available } => {
            ctx.accessibility.set_available(available);
            Response::Ok
        }

        Request::PushAccessibilitySnapshot { snapshot } => {
            ctx.accessibility.update_snapshot(snapshot);
            Response::Ok
        }
    };

    (response, false)
}

/// Request tag for logs; frames are too large for `?request`
fn request_name(request: &Request) -> &'static str {
    match request {
        Request::Ping => "ping",
        Request::GetStatus => "get_status",
        Request::GetSnapshot => "get_snapshot",
        Request::Subscribe => "subscribe",
        Request::PostNotification { .. } => "post_notification",
        Request::RemoveNotification { .. } => "remove_notification",
        Request::ReplaceNotifications { .. } => "replace_notifications",
        Request::UpdateMedia { .. } => "update_media",
        Request::ClearMedia => "clear_media",
        Request::UpdateSettings { .. } => "update_settings",
        Request::SetScreenCaptureAvailable { .. } => "set_screen_capture_available",
        Request::PushScreenFrame { .. } => "push_screen_frame",
        Request::SetAccessibilityAvailable { .. } => "set_accessibility_available",
        Request::PushAccessibilitySnapshot { .. } => "push_accessibility_snapshot",
    }
}
