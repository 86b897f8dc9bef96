use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::ControlKey;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{self, KeyResult, Message, MousePosition, ScreenshotResult};
use crate::workflow::{CaptureWorkflow, WorkflowOutcome};

/// Per-machine session: holds the one websocket link to the coordinator,
/// reconnects with exponential backoff, heartbeats on a separate task, and
/// dispatches inbound trigger commands into the workflow.
pub struct ConnectionManager {
    config: ClientConfig,
    client_id: String,
    crop_size: u32,
    workflow: Arc<CaptureWorkflow>,
    shutdown: CancellationToken,
}

/// Double the reconnect delay, capped at the ceiling.
pub fn next_backoff_delay(current_secs: u64, ceiling_secs: u64) -> u64 {
    (current_secs.saturating_mul(2)).min(ceiling_secs)
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        crop_size: u32,
        workflow: Arc<CaptureWorkflow>,
        shutdown: CancellationToken,
    ) -> Self {
        let client_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

        Self {
            config,
            client_id,
            crop_size,
            workflow,
            shutdown,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Connect-and-serve loop. Runs until shutdown; transient link
    /// failures are never fatal.
    pub async fn run(&self) -> Result<()> {
        let url = format!(
            "ws://{}:{}",
            self.config.coordinator_host, self.config.coordinator_port
        );
        let mut reconnect_delay = self.config.reconnect_floor_secs;

        while !self.shutdown.is_cancelled() {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    info!("Connected to coordinator at {}", url);
                    reconnect_delay = self.config.reconnect_floor_secs;

                    if let Err(e) = self.serve_connection(stream).await {
                        warn!("Connection lost: {}", e);
                    } else {
                        info!("Connection closed by coordinator");
                    }
                }
                Err(e) => {
                    debug!("Connection attempt failed: {}", e);
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            info!("Reconnecting in {}s", reconnect_delay);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
                _ = self.shutdown.cancelled() => break,
            }
            reconnect_delay =
                next_backoff_delay(reconnect_delay, self.config.reconnect_ceiling_secs);
        }

        Ok(())
    }

    async fn serve_connection(
        &self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Result<()> {
        let (mut sink, mut reader) = stream.split();
        let link = self.shutdown.child_token();

        // Single writer: every outbound message funnels through this channel.
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer_link = link.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to serialize outbound message: {}", e);
                                continue;
                            }
                        };
                        if sink.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    _ = writer_link.cancelled() => break,
                }
            }
        });

        // Liveness task: terminates on send failure, the read loop's own
        // failure handling drives reconnection.
        let heartbeat_tx = outbound_tx.clone();
        let heartbeat_id = self.client_id.clone();
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval_secs);
        let heartbeat_link = link.clone();
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(heartbeat_interval) => {
                        let beat = Message::Heartbeat {
                            client_id: heartbeat_id.clone(),
                            timestamp: protocol::now_timestamp(),
                        };
                        if heartbeat_tx.send(beat).is_err() {
                            break;
                        }
                    }
                    _ = heartbeat_link.cancelled() => break,
                }
            }
        });

        let served = loop {
            tokio::select! {
                frame = reader.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<Message>(&text) {
                                Ok(message) => self.handle_message(message, &outbound_tx).await,
                                Err(e) => {
                                    // Malformed or unrecognized payloads are
                                    // skipped without dropping the link.
                                    debug!("Skipping inbound message: {}", e);
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            break Err(crate::error::SerifuError::Transport(e.to_string()))
                        }
                    }
                }
                _ = self.shutdown.cancelled() => break Ok(()),
            }
        };

        link.cancel();
        let _ = heartbeat.await;
        let _ = writer.await;

        served
    }

    /// Dispatch one inbound message. Trigger commands run the workflow and
    /// report back echoing the command and originator identifiers.
    async fn handle_message(&self, message: Message, outbound: &mpsc::UnboundedSender<Message>) {
        match message {
            Message::ConnectionEstablished { interval, .. } => {
                info!("Link established; coordinator triggers every {}s", interval);
            }
            Message::HeartbeatAck { .. } => {
                debug!("Heartbeat acknowledged");
            }
            Message::ExecuteScreenshot {
                command_id,
                telegram_user_id,
            } => {
                let reply = match self.workflow.run_trigger().await {
                    Ok(outcome) => {
                        let subtitle_text = outcome.subtitle_text.clone();
                        Message::ScreenshotCompleted {
                            client_id: self.client_id.clone(),
                            command_id,
                            telegram_user_id,
                            timestamp: protocol::now_timestamp(),
                            result: self.screenshot_result(&outcome),
                            subtitle_text,
                        }
                    }
                    Err(e) => {
                        warn!("Trigger workflow failed: {}", e);
                        Message::ScreenshotError {
                            client_id: self.client_id.clone(),
                            command_id,
                            telegram_user_id,
                            timestamp: protocol::now_timestamp(),
                            error: e.to_string(),
                        }
                    }
                };
                let _ = outbound.send(reply);
            }
            Message::ExecuteNextSubtitle {
                command_id,
                telegram_user_id,
            } => {
                let reply = match self.workflow.run_next_subtitle().await {
                    Ok(outcome) => {
                        let subtitle_text = outcome.subtitle_text.clone();
                        Message::NextSubtitleCompleted {
                            client_id: self.client_id.clone(),
                            command_id,
                            telegram_user_id,
                            timestamp: protocol::now_timestamp(),
                            result: self.screenshot_result(&outcome),
                            subtitle_text,
                        }
                    }
                    Err(e) => {
                        warn!("Next-subtitle workflow failed: {}", e);
                        Message::ScreenshotError {
                            client_id: self.client_id.clone(),
                            command_id,
                            telegram_user_id,
                            timestamp: protocol::now_timestamp(),
                            error: e.to_string(),
                        }
                    }
                };
                let _ = outbound.send(reply);
            }
            Message::ExecuteLeftKey {
                command_id,
                telegram_user_id,
            } => {
                if let Some(reply) = self
                    .key_reply(ControlKey::Left, command_id, telegram_user_id)
                    .await
                {
                    let _ = outbound.send(reply);
                }
            }
            Message::ExecuteSpaceKey {
                command_id,
                telegram_user_id,
            } => {
                if let Some(reply) = self
                    .key_reply(ControlKey::Space, command_id, telegram_user_id)
                    .await
                {
                    let _ = outbound.send(reply);
                }
            }
            other => {
                // Result-direction messages have no business arriving here.
                debug!("Ignoring unexpected inbound message: {:?}", other);
            }
        }
    }

    async fn key_reply(
        &self,
        key: ControlKey,
        command_id: String,
        telegram_user_id: Option<i64>,
    ) -> Option<Message> {
        match self.workflow.press_key(key).await {
            Ok(position) => {
                let result = KeyResult {
                    mouse_position: MousePosition {
                        x: position.x,
                        y: position.y,
                    },
                };
                let timestamp = protocol::now_timestamp();
                let client_id = self.client_id.clone();
                Some(match key {
                    ControlKey::Left => Message::LeftKeyCompleted {
                        client_id,
                        command_id,
                        telegram_user_id,
                        timestamp,
                        result,
                    },
                    ControlKey::Space => Message::SpaceKeyCompleted {
                        client_id,
                        command_id,
                        telegram_user_id,
                        timestamp,
                        result,
                    },
                })
            }
            Err(e) => {
                warn!("Key press failed: {}", e);
                Some(Message::ScreenshotError {
                    client_id: self.client_id.clone(),
                    command_id,
                    telegram_user_id,
                    timestamp: protocol::now_timestamp(),
                    error: e.to_string(),
                })
            }
        }
    }

    fn screenshot_result(&self, outcome: &WorkflowOutcome) -> ScreenshotResult {
        ScreenshotResult {
            timing: outcome.timing.map(|t| t.to_string()),
            mouse_position: MousePosition {
                x: outcome.anchor.x,
                y: outcome.anchor.y,
            },
            saved_filepath: outcome
                .saved_path
                .as_ref()
                .map(|p| p.display().to_string()),
            crop_size: self.crop_size,
        }
    }
}
