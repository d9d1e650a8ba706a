// libs/consultation-chat-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateRoomResponse, MessageBody, Participant, RoomDetailsResponse, RoomSummary};
use crate::services::{MediaKind, MediaUpload};
use crate::state::ChatState;

// ==============================================================================
// REQUEST STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub transaction_id: String,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {} format", what)))
}

// ==============================================================================
// ROOM HANDLERS
// ==============================================================================

/// Opens the chat room of a paid consultation transaction.
pub async fn create_room(
    State(state): State<Arc<ChatState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let transaction_id = parse_id(&request.transaction_id, "transaction ID")?;
    let participant = Participant::from_user(&user)?;

    let room = state.registry.create_room(transaction_id, &participant).await?;

    Ok((StatusCode::CREATED, Json(CreateRoomResponse::from(&room))))
}

pub async fn list_rooms(
    State(state): State<Arc<ChatState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let participant = Participant::from_user(&user)?;
    let rooms: Vec<RoomSummary> = state
        .registry
        .rooms_for(&participant)
        .await?
        .iter()
        .map(RoomSummary::from)
        .collect();

    Ok(Json(json!({
        "rooms": rooms,
        "total": rooms.len(),
    })))
}

pub async fn get_room_details(
    State(state): State<Arc<ChatState>>,
    Path(room_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<RoomDetailsResponse>, AppError> {
    let participant = Participant::from_user(&user)?;
    let context = state.registry.authorize_participant(room_id, &participant).await?;
    let messages = state.messages.list_by_room(room_id).await?;

    Ok(Json(RoomDetailsResponse {
        room: RoomSummary::from(&context),
        messages,
    }))
}

pub async fn get_room_by_transaction(
    State(state): State<Arc<ChatState>>,
    Path(transaction_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<RoomSummary>, AppError> {
    let transaction_id = parse_id(&transaction_id, "transaction ID")?;
    let participant = Participant::from_user(&user)?;

    let room = state.registry.get_room_by_transaction(transaction_id).await?;
    let context = state.registry.authorize_participant(room.id, &participant).await?;

    Ok(Json(RoomSummary::from(&context)))
}

// ==============================================================================
// MESSAGE HANDLERS
// ==============================================================================

/// Multipart upload of one image or audio file, with an optional `message` caption.
pub async fn send_media_message(
    State(state): State<Arc<ChatState>>,
    Path(room_id): Path<Uuid>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let participant = Participant::from_user(&user)?;
    let context = state.registry.authorize_participant(room_id, &participant).await?;

    let mut caption: Option<String> = None;
    let mut media: Option<MediaUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "message" {
            caption = Some(field.text().await.map_err(|e| AppError::BadRequest(e.body_text()))?);
            continue;
        }

        let Some(kind) = MediaKind::from_field(&name) else {
            debug!("Ignoring multipart field '{}'", name);
            continue;
        };

        if media.is_some() {
            return Err(AppError::BadRequest(
                "Only one image or audio file can be sent per message".to_string(),
            ));
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        media = Some(MediaUpload::new(kind, &file_name, content_type.as_deref(), bytes.to_vec())?);
    }

    let media = media.ok_or_else(|| {
        AppError::BadRequest("An image or audio file is required".to_string())
    })?;
    let kind = media.kind;

    // Reject a bad caption before anything lands in storage.
    let mut body = MessageBody::new(
        caption,
        Some(kind.attachment(String::new())),
        state.hub.settings().max_message_length,
    )?;

    let url = state
        .uploader
        .upload(room_id, media)
        .await
        .map_err(|e| AppError::ExternalService(format!("Failed to upload file: {}", e)))?;
    body.attachment = Some(kind.attachment(url.clone()));

    let message = match state.hub.publish(&context, participant, body).await {
        Ok(message) => message,
        Err(err) => {
            if let Err(cleanup) = state.uploader.remove(&url).await {
                warn!("Could not remove orphaned attachment {}: {}", url, cleanup);
            }
            return Err(err.into());
        }
    };

    info!("User {} sent a {:?} message to room {}", user.id, kind, room_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": message,
        })),
    ))
}

// ==============================================================================
// HEALTH
// ==============================================================================

pub async fn chat_health(State(state): State<Arc<ChatState>>) -> Json<Value> {
    let stats = state.hub.stats().await;

    Json(json!({
        "status": "healthy",
        "service": "consultation-chat-cell",
        "supabase_configured": state.config.is_persistence_configured(),
        "sessions": stats.sessions,
        "active_sessions": stats.active_sessions,
        "attached_connections": stats.attached_connections,
    }))
}
