// libs/consultation-chat-cell/src/gateway.rs
//! WebSocket entry point for a room: authorize, upgrade, replay history, then
//! pump frames until either side goes away.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Extension, Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::error::ChatError;
use crate::models::{OutboundFrame, Participant, RoomContext};
use crate::services::Connection;
use crate::state::ChatState;

/// `GET /chat/rooms/{room_id}/ws`
///
/// Unknown rooms and non-participants are refused with a plain HTTP error
/// before any upgrade happens.
pub async fn attach_room(
    State(state): State<Arc<ChatState>>,
    Path(room_id): Path<Uuid>,
    Extension(user): Extension<User>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let participant = Participant::from_user(&user)?;
    let context = state.registry.authorize_participant(room_id, &participant).await?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(upgrade.on_upgrade(move |socket| run_connection(socket, state, context, participant)))
}

#[instrument(skip_all, fields(room_id = %context.room_id(), user_id = %participant.user_id))]
pub async fn run_connection(
    socket: WebSocket,
    state: Arc<ChatState>,
    context: RoomContext,
    participant: Participant,
) {
    let (mut sink, mut stream) = socket.split();

    let (connection, mut outbound) = Connection::open(
        context.room_id(),
        participant,
        state.hub.settings().outbound_queue_capacity,
    );

    let attached = match state.hub.register(&context, connection).await {
        Ok(attached) => attached,
        Err(err) => {
            warn!("Could not attach to room: {}", err);
            if let Err(e) = send_frame(&mut sink, OutboundFrame::error(&err)).await {
                debug!("Could not deliver attach error: {}", e);
            }
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Could not close rejected socket: {}", e);
            }
            return;
        }
    };
    info!("Participant connected as {}", participant.role);

    // Ends when the session drops the connection (replaced, slow, or
    // unregistered) or the socket stops accepting writes.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if send_frame(&mut sink, frame).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let inbound = attached.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            let payload = match message {
                Message::Text(text) => text.to_string(),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!("Ignoring non-UTF8 binary frame ({} bytes)", data.len());
                        continue;
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            if let Err(err) = inbound.submit_frame(payload).await {
                debug!("Stopping reader: {}", err);
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => {
            reader.abort();
            state.hub.unregister(&attached).await;
        }
        _ = &mut reader => {
            // Unregistering drops the session's end of the queue, which lets
            // the writer send its close frame and finish.
            state.hub.unregister(&attached).await;
            if tokio::time::timeout(std::time::Duration::from_secs(5), &mut writer).await.is_err() {
                writer.abort();
            }
        }
    }

    info!("Participant disconnected");
}

async fn send_frame<S>(sink: &mut S, frame: OutboundFrame) -> Result<(), ChatError>
where
    S: futures::Sink<Message> + Unpin,
{
    let texts = frame.encode().map_err(|e| {
        error!("Failed to encode outbound frame: {}", e);
        ChatError::InvalidInput(e.to_string())
    })?;

    for text in texts {
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|_| ChatError::NotFound("socket closed".to_string()))?;
    }
    Ok(())
}
