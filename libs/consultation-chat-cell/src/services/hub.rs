use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::ChatSettings;

use crate::error::ChatError;
use crate::models::{ChatMessage, MessageBody, Participant, RoomContext};
use crate::services::connection::Connection;
use crate::services::session::{RoomSessionHandle, SessionCommand, SessionState};
use crate::services::store::MessageStore;

/// Routes connections and messages to per-room sessions, starting them on demand.
#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    sessions: RwLock<HashMap<Uuid, RoomSessionHandle>>,
    store: Arc<dyn MessageStore>,
    settings: ChatSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub sessions: usize,
    pub active_sessions: usize,
    pub attached_connections: usize,
}

/// Registration receipt for a live socket. Inbound frames go straight to the
/// room session it was attached to.
#[derive(Debug)]
pub struct AttachedConnection {
    pub id: Uuid,
    pub room_id: Uuid,
    pub participant: Participant,
    session: RoomSessionHandle,
    detached: AtomicBool,
}

impl AttachedConnection {
    pub async fn submit_frame(&self, payload: String) -> Result<(), ChatError> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(ChatError::NotFound("connection is no longer attached".to_string()));
        }

        self.session
            .submit(SessionCommand::Inbound {
                connection_id: self.id,
                sender: self.participant,
                payload,
            })
            .await
    }
}

impl ConnectionHub {
    pub fn new(store: Arc<dyn MessageStore>, settings: ChatSettings) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: RwLock::new(HashMap::new()),
                store,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.inner.settings
    }

    /// Attaches the connection to its room. History is queued on the
    /// connection before it can receive any live message.
    pub async fn register(
        &self,
        context: &RoomContext,
        connection: Connection,
    ) -> Result<Arc<AttachedConnection>, ChatError> {
        if connection.room_id != context.room_id() {
            return Err(ChatError::InvalidInput(
                "connection belongs to a different room".to_string(),
            ));
        }

        let id = connection.id;
        let participant = connection.participant;
        let (ack, done) = oneshot::channel();

        let session = self
            .dispatch(context, SessionCommand::Attach { connection, ack })
            .await?;

        done.await.map_err(|_| session_stopped(context.room_id()))??;

        debug!("Registered connection {} for user {}", id, participant.user_id);
        Ok(Arc::new(AttachedConnection {
            id,
            room_id: context.room_id(),
            participant,
            session,
            detached: AtomicBool::new(false),
        }))
    }

    /// Detaches the connection. Calling it more than once is a no-op.
    pub async fn unregister(&self, connection: &AttachedConnection) {
        if connection.detached.swap(true, Ordering::SeqCst) {
            return;
        }

        let session = self.inner.sessions.read().await.get(&connection.room_id).map(|s| s.begin());
        let Some(pending) = session else {
            return;
        };

        let _ = pending
            .send(SessionCommand::Detach {
                connection_id: connection.id,
                user_id: connection.participant.user_id,
            })
            .await;
    }

    /// Delivers an already persisted message to everyone attached to the room.
    /// A room without a running session has nobody to deliver to.
    pub async fn broadcast(&self, room_id: Uuid, message: ChatMessage) -> Result<(), ChatError> {
        let session = self.inner.sessions.read().await.get(&room_id).map(|s| s.begin());
        match session {
            Some(pending) => {
                pending
                    .send(SessionCommand::Broadcast { message: Arc::new(message) })
                    .await
            }
            None => Ok(()),
        }
    }

    /// Persists a message through the room session and fans it out.
    pub async fn publish(
        &self,
        context: &RoomContext,
        sender: Participant,
        body: MessageBody,
    ) -> Result<ChatMessage, ChatError> {
        let (ack, done) = oneshot::channel();
        self.dispatch(context, SessionCommand::Publish { sender, body, ack })
            .await?;

        done.await.map_err(|_| session_stopped(context.room_id()))?
    }

    pub async fn session_state(&self, room_id: Uuid) -> SessionState {
        self.inner
            .sessions
            .read()
            .await
            .get(&room_id)
            .map(|s| s.shared().state())
            .unwrap_or(SessionState::Idle)
    }

    pub async fn attached_count(&self, room_id: Uuid) -> usize {
        self.inner
            .sessions
            .read()
            .await
            .get(&room_id)
            .map(|s| s.shared().attached())
            .unwrap_or(0)
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn stats(&self) -> HubStats {
        let sessions = self.inner.sessions.read().await;
        let attached: Vec<usize> = sessions.values().map(|s| s.shared().attached()).collect();

        HubStats {
            sessions: sessions.len(),
            active_sessions: attached.iter().filter(|n| **n > 0).count(),
            attached_connections: attached.iter().sum(),
        }
    }

    /// Stops sessions that have no connections, no queued work, and no
    /// activity for at least the configured idle timeout.
    pub async fn reap_idle_sessions(&self) -> usize {
        let Some(timeout) = self.inner.settings.session_idle_timeout else {
            return 0;
        };

        let mut sessions = self.inner.sessions.write().await;
        let idle: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, s)| {
                let shared = s.shared();
                shared.attached() == 0 && shared.pending() == 0 && shared.idle_for() >= timeout
            })
            .map(|(room_id, _)| *room_id)
            .collect();

        for room_id in &idle {
            if let Some(session) = sessions.remove(room_id) {
                session.retire();
            }
        }

        if !idle.is_empty() {
            info!("Reclaimed {} idle chat sessions", idle.len());
        }
        idle.len()
    }

    /// Periodically reclaims idle sessions. Returns `None` when sessions are kept forever.
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        let timeout = self.inner.settings.session_idle_timeout?;
        let hub = self.clone();
        let period = (timeout / 2).max(std::time::Duration::from_millis(10));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                hub.reap_idle_sessions().await;
            }
        }))
    }

    async fn dispatch(
        &self,
        context: &RoomContext,
        command: SessionCommand,
    ) -> Result<RoomSessionHandle, ChatError> {
        let room_id = context.room_id();

        let existing = self
            .inner
            .sessions
            .read()
            .await
            .get(&room_id)
            .map(|s| (s.clone(), s.begin()));

        let (session, pending) = match existing {
            Some(found) => found,
            None => {
                let mut sessions = self.inner.sessions.write().await;
                let session = sessions
                    .entry(room_id)
                    .or_insert_with(|| {
                        RoomSessionHandle::spawn(context, self.inner.store.clone(), &self.inner.settings)
                    })
                    .clone();
                let pending = session.begin();
                (session, pending)
            }
        };

        pending.send(command).await?;
        Ok(session)
    }
}

fn session_stopped(room_id: Uuid) -> ChatError {
    ChatError::StorageUnavailable(format!("chat session for room {} has stopped", room_id))
}
