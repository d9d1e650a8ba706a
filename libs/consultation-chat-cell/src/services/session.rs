use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::ChatSettings;

use crate::error::ChatError;
use crate::models::{
    ChatMessage, InboundPayload, MessageBody, NewChatMessage, OutboundFrame, Participant,
    RoomContext, RoomParticipants,
};
use crate::services::connection::{Connection, DeliveryError};
use crate::services::store::MessageStore;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
}

/// Work accepted by a room session. Commands are handled one at a time in arrival order.
#[derive(Debug)]
pub enum SessionCommand {
    Attach {
        connection: Connection,
        ack: oneshot::Sender<Result<(), ChatError>>,
    },
    Detach {
        connection_id: Uuid,
        user_id: Uuid,
    },
    Inbound {
        connection_id: Uuid,
        sender: Participant,
        payload: String,
    },
    Publish {
        sender: Participant,
        body: MessageBody,
        ack: oneshot::Sender<Result<ChatMessage, ChatError>>,
    },
    Broadcast {
        message: Arc<ChatMessage>,
    },
}

/// Counters readable without going through the session's queue.
#[derive(Debug)]
pub struct SessionShared {
    attached: AtomicUsize,
    pending: AtomicUsize,
    started: Instant,
    last_activity_ms: AtomicU64,
    retire: Notify,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            attached: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            retire: Notify::new(),
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_activity_ms.store(elapsed, Ordering::Relaxed);
    }

    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    pub fn state(&self) -> SessionState {
        if self.attached() > 0 {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }
}

/// Cloneable address of a running room session.
#[derive(Debug, Clone)]
pub struct RoomSessionHandle {
    room_id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
    shared: Arc<SessionShared>,
}

impl RoomSessionHandle {
    pub fn spawn(context: &RoomContext, store: Arc<dyn MessageStore>, settings: &ChatSettings) -> Self {
        let (commands, receiver) = mpsc::channel(settings.room_queue_capacity.max(1));
        let shared = Arc::new(SessionShared::new());

        let session = RoomSession {
            room_id: context.room_id(),
            participants: context.participants,
            store,
            max_message_length: settings.max_message_length,
            attached: HashMap::new(),
            shared: shared.clone(),
        };
        tokio::spawn(session.run(receiver));

        info!("Started chat session for room {}", context.room_id());

        Self {
            room_id: context.room_id(),
            commands,
            shared,
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn shared(&self) -> &SessionShared {
        &self.shared
    }

    /// Marks a command as in flight. Must be called while the caller still
    /// holds whatever lock made this handle reachable.
    pub fn begin(&self) -> PendingCommand {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        PendingCommand {
            handle: self.clone(),
            armed: true,
        }
    }

    pub async fn submit(&self, command: SessionCommand) -> Result<(), ChatError> {
        self.begin().send(command).await
    }

    /// Ends the session task. Callers must have removed the handle from lookup first.
    pub fn retire(&self) {
        self.shared.retire.notify_one();
    }
}

/// In-flight marker that keeps an idle session from being reclaimed
/// between lookup and enqueue.
pub struct PendingCommand {
    handle: RoomSessionHandle,
    armed: bool,
}

impl PendingCommand {
    pub async fn send(mut self, command: SessionCommand) -> Result<(), ChatError> {
        match self.handle.commands.send(command).await {
            Ok(()) => {
                // The session releases the marker once it has handled the command.
                self.armed = false;
                Ok(())
            }
            Err(_) => Err(ChatError::StorageUnavailable(format!(
                "chat session for room {} has stopped",
                self.handle.room_id
            ))),
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        if self.armed {
            self.handle.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct RoomSession {
    room_id: Uuid,
    participants: RoomParticipants,
    store: Arc<dyn MessageStore>,
    max_message_length: usize,
    /// Current connection per user. A newer attach replaces the older one.
    attached: HashMap<Uuid, Connection>,
    shared: Arc<SessionShared>,
}

impl RoomSession {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            let command = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                _ = self.shared.retire.notified() => break,
            };

            self.shared.touch();
            self.handle(command).await;
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            self.shared.touch();
        }

        info!("Chat session for room {} stopped", self.room_id);
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Attach { connection, ack } => {
                let result = self.attach(connection).await;
                let _ = ack.send(result);
            }
            SessionCommand::Detach { connection_id, user_id } => {
                self.detach(connection_id, user_id);
            }
            SessionCommand::Inbound { connection_id, sender, payload } => {
                self.inbound(connection_id, sender, &payload).await;
            }
            SessionCommand::Publish { sender, body, ack } => {
                let result = self.persist_and_fan_out(sender, body).await;
                let _ = ack.send(result);
            }
            SessionCommand::Broadcast { message } => {
                self.fan_out(message);
            }
        }
    }

    async fn attach(&mut self, connection: Connection) -> Result<(), ChatError> {
        if !self.participants.admits(&connection.participant) {
            warn!(
                "User {} is not a participant of room {}",
                connection.participant.user_id, self.room_id
            );
            return Err(ChatError::Unauthorized(
                "user is not a participant of this room".to_string(),
            ));
        }

        // Nothing else runs in this room until the connection is in the
        // broadcast set, so no message can fall between replay and live delivery.
        let history = self.store.list_by_room(self.room_id).await?;
        let replayed = history.len();

        match connection.deliver(OutboundFrame::History(history)) {
            Ok(()) => {}
            Err(DeliveryError::Full) | Err(DeliveryError::Closed) => {
                return Err(ChatError::StorageUnavailable(
                    "connection closed before history replay".to_string(),
                ));
            }
        }

        let user_id = connection.participant.user_id;
        let connection_id = connection.id;
        if let Some(previous) = self.attached.insert(user_id, connection) {
            info!(
                "Connection {} replaces {} for user {} in room {}",
                connection_id, previous.id, user_id, self.room_id
            );
        }
        self.sync_attached();

        info!(
            "User {} attached to room {} ({} messages replayed)",
            user_id, self.room_id, replayed
        );
        Ok(())
    }

    fn detach(&mut self, connection_id: Uuid, user_id: Uuid) {
        // A replaced connection detaching late must not evict its successor.
        let is_current = self
            .attached
            .get(&user_id)
            .map(|conn| conn.id == connection_id)
            .unwrap_or(false);

        if is_current {
            self.attached.remove(&user_id);
            self.sync_attached();
            info!("User {} detached from room {}", user_id, self.room_id);
        }
    }

    async fn inbound(&mut self, connection_id: Uuid, sender: Participant, payload: &str) {
        let is_current = self
            .attached
            .get(&sender.user_id)
            .map(|conn| conn.id == connection_id)
            .unwrap_or(false);
        if !is_current {
            debug!("Ignoring frame from stale connection {}", connection_id);
            return;
        }

        let body = match InboundPayload::parse(payload)
            .and_then(|payload| payload.into_body(self.max_message_length))
        {
            Ok(body) => body,
            Err(err) => {
                debug!("Rejected frame from {} in room {}: {}", sender.user_id, self.room_id, err);
                self.reply_error(sender.user_id, &err);
                return;
            }
        };

        if let Err(err) = self.persist_and_fan_out(sender, body).await {
            self.reply_error(sender.user_id, &err);
        }
    }

    async fn persist_and_fan_out(
        &mut self,
        sender: Participant,
        body: MessageBody,
    ) -> Result<ChatMessage, ChatError> {
        let stored = self
            .store
            .append(NewChatMessage::new(self.room_id, sender, body))
            .await
            .map_err(|err| {
                warn!("Failed to persist message in room {}: {}", self.room_id, err);
                err
            })?;

        self.fan_out(Arc::new(stored.clone()));
        Ok(stored)
    }

    fn fan_out(&mut self, message: Arc<ChatMessage>) {
        let mut dropped = Vec::new();

        for (user_id, connection) in &self.attached {
            match connection.deliver(OutboundFrame::Message(message.clone())) {
                Ok(()) => {}
                Err(DeliveryError::Full) => {
                    warn!(
                        "Disconnecting slow consumer {} in room {}: outbound queue full",
                        user_id, self.room_id
                    );
                    dropped.push(*user_id);
                }
                Err(DeliveryError::Closed) => dropped.push(*user_id),
            }
        }

        for user_id in dropped {
            self.attached.remove(&user_id);
        }
        self.sync_attached();
    }

    fn reply_error(&mut self, user_id: Uuid, err: &ChatError) {
        let failed = match self.attached.get(&user_id) {
            Some(connection) => connection.deliver(OutboundFrame::error(err)).is_err(),
            None => false,
        };
        if failed {
            self.attached.remove(&user_id);
            self.sync_attached();
        }
    }

    fn sync_attached(&self) {
        self.shared.attached.store(self.attached.len(), Ordering::SeqCst);
    }
}
