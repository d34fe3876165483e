// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Live-push Module
//!
//! WebSocket feed for dashboard clients: one JSON [`StatusFrame`] per
//! second out, `{cmd, args}` control messages in. The HTTP dashboard page
//! itself is served elsewhere; this process only owns the push endpoint,
//! which by convention listens on the dashboard port plus one.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::command::CommandRequest;
use crate::engine::StatusFrame;

/// Broadcasts status frames to all connected push clients.
#[derive(Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<StatusFrame>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send a frame to subscribers. A send with no subscribers is normal.
    pub fn send(&self, frame: StatusFrame) {
        let _ = self.tx.send(frame);
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusFrame> {
        self.tx.subscribe()
    }
}

struct PushState {
    broadcaster: StatusBroadcaster,
    commands: mpsc::UnboundedSender<CommandRequest>,
}

/// Handle for the running push server.
pub struct PushServerHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PushServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Trigger graceful shutdown and await completion.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|err| anyhow::anyhow!(err))
    }
}

/// Bind the WebSocket push endpoint and spawn its server task.
pub async fn spawn_push_server(
    listen: SocketAddr,
    broadcaster: StatusBroadcaster,
    commands: mpsc::UnboundedSender<CommandRequest>,
) -> anyhow::Result<PushServerHandle> {
    let listener = TcpListener::bind(listen).await?;
    let local_addr = listener.local_addr()?;
    info!("WebSocket push feed on {}", local_addr);

    let state = Arc::new(PushState {
        broadcaster,
        commands,
    });

    let app = Router::new()
        .route("/ws", get(upgrade_handler))
        .with_state(state);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            warn!("push server exited with error: {err}");
        }
    });

    Ok(PushServerHandle {
        address: local_addr,
        shutdown: shutdown_tx,
        task,
    })
}

/// Inbound control message mirroring the console command grammar.
#[derive(Debug, Deserialize)]
struct ControlMessage {
    cmd: String,
    #[serde(default)]
    args: Value,
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<PushState>>,
) -> axum::response::Response {
    ws.on_upgrade(|socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: Arc<PushState>) {
    let mut subscription = state.broadcaster.subscribe();

    loop {
        tokio::select! {
            frame = subscription.recv() => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("push client lagged behind, {skipped} frames dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Ok(text) = serde_json::to_string(&frame) else {
                    warn!("failed to serialise status frame");
                    continue;
                };

                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };

                match message {
                    Message::Text(text) => {
                        let response = handle_control(&state, &text).await;
                        if socket.send(Message::Text(response.into())).await.is_err() {
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        let _ = socket
                            .send(Message::Text("error: binary unsupported".into()))
                            .await;
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }
    debug!("push client disconnected");
}

/// Relay one `{cmd, args}` message to the intake loop and wait for its
/// one-line response.
async fn handle_control(state: &PushState, text: &str) -> String {
    let control: ControlMessage = match serde_json::from_str(text) {
        Ok(control) => control,
        Err(err) => {
            debug!("invalid control message: {err}");
            return "error: invalid control message".to_string();
        }
    };

    // Flatten to the console grammar; the intake loop does the parsing.
    let mut line = control.cmd;
    if let Some(peak) = control.args.get("peak").and_then(Value::as_f64) {
        line.push_str(&format!(" {peak}"));
    }
    if let Some(sensor) = control.args.get("sensor").and_then(Value::as_str) {
        line.push_str(&format!(" {sensor}"));
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    let request = CommandRequest {
        line,
        reply: Some(reply_tx),
    };
    if state.commands.send(request).is_err() {
        return "error: command intake unavailable".to_string();
    }
    reply_rx
        .await
        .unwrap_or_else(|_| "error: command intake dropped the request".to_string())
}
