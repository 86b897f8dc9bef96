use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{Result, SerifuError};
use crate::protocol::{self, Message};

/// Which trigger a broadcast carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Screenshot,
    LeftKey,
    SpaceKey,
    NextSubtitle,
}

/// Bookkeeping for one originator-tagged broadcast, discarded after the
/// matching result is routed.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub originator_id: i64,
    pub command_id: String,
    pub issued_at: Instant,
}

/// Delivery seam to the external requester (the chat front-end). The
/// coordinator only routes; what a channel looks like is not its concern.
#[async_trait]
pub trait OriginatorNotifier: Send + Sync {
    async fn notify(&self, originator_id: i64, text: &str) -> Result<()>;
}

/// Default notifier for headless runs: routed lines go to the log.
pub struct LogNotifier;

#[async_trait]
impl OriginatorNotifier for LogNotifier {
    async fn notify(&self, originator_id: i64, text: &str) -> Result<()> {
        info!("[to originator {}] {}", originator_id, text);
        Ok(())
    }
}

/// Coordinator: accepts machine links, fans trigger commands out to all of
/// them, and routes each result back to its originator.
pub struct Coordinator {
    config: CoordinatorConfig,
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    notifier: Box<dyn OriginatorNotifier>,
    next_client_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        notifier: Box<dyn OriginatorNotifier>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            notifier,
            next_client_id: AtomicU64::new(1),
            shutdown,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.lock_clients().len()
    }

    /// Bind, accept machine links, and run the periodic trigger scheduler
    /// until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let address = format!("{}:{}", self.config.bind_host, self.config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| SerifuError::Transport(format!("Failed to bind {}: {}", address, e)))?;

        info!("Coordinator listening on {}", address);

        if self.config.trigger_interval_secs > 0 {
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.scheduler_loop().await });
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Incoming link from {}", peer);
                            let coordinator = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = coordinator.serve_client(stream).await {
                                    debug!("Client link ended: {}", e);
                                }
                            });
                        }
                        Err(e) => warn!("Accept failed: {}", e),
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Coordinator shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn scheduler_loop(&self) {
        let interval = Duration::from_secs(self.config.trigger_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let sent = self.broadcast(TriggerKind::Screenshot, None);
                    if sent > 0 {
                        debug!("Scheduled trigger sent to {} machines", sent);
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
    }

    async fn serve_client(&self, stream: TcpStream) -> Result<()> {
        let ws = accept_async(stream)
            .await
            .map_err(|e| SerifuError::Transport(format!("Handshake failed: {}", e)))?;
        let (mut sink, mut reader) = ws.split();

        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        self.lock_clients().insert(client_id, tx.clone());
        info!(
            "Machine link {} registered. Total links: {}",
            client_id,
            self.connected_count()
        );

        let _ = tx.send(Message::ConnectionEstablished {
            interval: self.config.trigger_interval_secs,
            timestamp: protocol::now_timestamp(),
        });

        let link = self.shutdown.child_token();
        let writer_link = link.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = rx.recv() => {
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

        loop {
            tokio::select! {
                frame = reader.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<Message>(&text) {
                                Ok(message) => self.handle_client_message(message, &tx).await,
                                Err(e) => debug!("Skipping inbound message: {}", e),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("Link {} read error: {}", client_id, e);
                            break;
                        }
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        link.cancel();
        let _ = writer.await;

        self.lock_clients().remove(&client_id);
        info!(
            "Machine link {} closed. Total links: {}",
            client_id,
            self.connected_count()
        );

        Ok(())
    }

    /// Handle one message from a machine: answer heartbeats, route results.
    async fn handle_client_message(
        &self,
        message: Message,
        reply: &mpsc::UnboundedSender<Message>,
    ) {
        match message {
            Message::Heartbeat { client_id, .. } => {
                debug!("Heartbeat from machine {}", client_id);
                let _ = reply.send(Message::HeartbeatAck {
                    timestamp: protocol::now_timestamp(),
                });
            }
            Message::ScreenshotCompleted {
                client_id,
                command_id,
                telegram_user_id,
                result,
                subtitle_text,
                ..
            }
            | Message::NextSubtitleCompleted {
                client_id,
                command_id,
                telegram_user_id,
                result,
                subtitle_text,
                ..
            } => {
                info!(
                    "Capture completed by machine {}: {}",
                    client_id,
                    result.timing.as_deref().unwrap_or("N/A")
                );
                self.route_result(&command_id, telegram_user_id, subtitle_text.as_deref())
                    .await;
            }
            Message::ScreenshotError {
                client_id,
                command_id,
                error,
                ..
            } => {
                warn!("Machine {} failed command {}: {}", client_id, command_id, error);
                self.discard_pending(&command_id);
            }
            Message::LeftKeyCompleted {
                client_id,
                command_id,
                ..
            }
            | Message::SpaceKeyCompleted {
                client_id,
                command_id,
                ..
            } => {
                debug!("Key command {} completed by machine {}", command_id, client_id);
                self.discard_pending(&command_id);
            }
            other => {
                debug!("Ignoring unexpected inbound message: {:?}", other);
            }
        }
    }

    /// Fan a trigger out to every connected machine. Links that fail
    /// mid-send are pruned; the returned count reflects successes only.
    pub fn broadcast(&self, kind: TriggerKind, originator_id: Option<i64>) -> usize {
        let command_id = protocol::new_command_id();

        if let Some(originator_id) = originator_id {
            self.lock_pending().insert(
                command_id.clone(),
                PendingRequest {
                    originator_id,
                    command_id: command_id.clone(),
                    issued_at: Instant::now(),
                },
            );
        }

        let message = match kind {
            TriggerKind::Screenshot => Message::ExecuteScreenshot {
                command_id,
                telegram_user_id: originator_id,
            },
            TriggerKind::LeftKey => Message::ExecuteLeftKey {
                command_id,
                telegram_user_id: originator_id,
            },
            TriggerKind::SpaceKey => Message::ExecuteSpaceKey {
                command_id,
                telegram_user_id: originator_id,
            },
            TriggerKind::NextSubtitle => Message::ExecuteNextSubtitle {
                command_id,
                telegram_user_id: originator_id,
            },
        };

        // Snapshot the links so a disconnect during the fan-out cannot
        // invalidate the iteration.
        let snapshot: Vec<(u64, mpsc::UnboundedSender<Message>)> = self
            .lock_clients()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut sent = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(message.clone()).is_ok() {
                sent += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut clients = self.lock_clients();
            for id in &dead {
                clients.remove(id);
            }
            info!("Removed {} disconnected links during broadcast", dead.len());
        }

        sent
    }

    /// Route a result's subtitle text back to the request's originator.
    /// Results without an originator, or whose originator does not match
    /// the pending entry, are logged and dropped.
    async fn route_result(
        &self,
        command_id: &str,
        telegram_user_id: Option<i64>,
        subtitle_text: Option<&str>,
    ) {
        let pending = self.lock_pending().remove(command_id);

        let Some(originator_id) = telegram_user_id else {
            debug!("Result for {} carries no originator, dropping", command_id);
            return;
        };

        match pending {
            Some(request) if request.originator_id == originator_id => {
                debug!(
                    "Routing result for {} after {:?}",
                    command_id,
                    request.issued_at.elapsed()
                );
            }
            Some(request) => {
                warn!(
                    "Result for {} echoes originator {} but {} was recorded; dropping",
                    command_id, originator_id, request.originator_id
                );
                return;
            }
            None => {
                warn!(
                    "Result for {} has no pending request on record; dropping",
                    command_id
                );
                return;
            }
        }

        let Some(text) = subtitle_text else {
            debug!("Result for {} carries no subtitle text", command_id);
            return;
        };

        if let Err(e) = self.notifier.notify(originator_id, text).await {
            warn!("Failed to notify originator {}: {}", originator_id, e);
        }
    }

    fn discard_pending(&self, command_id: &str) {
        if let Some(request) = self.lock_pending().remove(command_id) {
            debug!(
                "Discarding pending request for {} after {:?}",
                command_id,
                request.issued_at.elapsed()
            );
        }
    }

    fn lock_clients(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<Message>>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn register_test_link(&self, tx: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        self.lock_clients().insert(id, tx);
        id
    }
}
