use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use shared_models::auth::User;

use crate::error::ChatError;

// ==============================================================================
// TRANSACTIONS (read-only view of the payment service)
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub payment_status: PaymentStatus,
}

impl Transaction {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Success
    }

    pub fn participants(&self) -> RoomParticipants {
        RoomParticipants {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
        }
    }
}

// ==============================================================================
// PARTICIPANTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Patient,
    Doctor,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Patient => "patient",
            ParticipantRole::Doctor => "doctor",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat identity of an authenticated caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Participant {
    pub user_id: Uuid,
    pub role: ParticipantRole,
}

impl Participant {
    pub fn patient(user_id: Uuid) -> Self {
        Self { user_id, role: ParticipantRole::Patient }
    }

    pub fn doctor(user_id: Uuid) -> Self {
        Self { user_id, role: ParticipantRole::Doctor }
    }

    pub fn from_user(user: &User) -> Result<Self, ChatError> {
        let role = if user.has_role("patient") {
            ParticipantRole::Patient
        } else if user.has_role("doctor") {
            ParticipantRole::Doctor
        } else {
            return Err(ChatError::Unauthorized(
                "only patients and doctors can use consultation chat".to_string(),
            ));
        };

        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| ChatError::InvalidInput("Invalid user ID format".to_string()))?;

        Ok(Self { user_id, role })
    }
}

/// The two identities allowed into a room: the transaction's patient and its doctor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomParticipants {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
}

impl RoomParticipants {
    pub fn admits(&self, participant: &Participant) -> bool {
        match participant.role {
            ParticipantRole::Patient => participant.user_id == self.patient_id,
            ParticipantRole::Doctor => participant.user_id == self.doctor_id,
        }
    }
}

// ==============================================================================
// ROOMS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A room together with the participants of its owning transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomContext {
    pub room: Room,
    pub participants: RoomParticipants,
}

impl RoomContext {
    pub fn room_id(&self) -> Uuid {
        self.room.id
    }
}

// ==============================================================================
// MESSAGES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Insertion sequence, breaks `created_at` ties.
    #[serde(default, skip_serializing)]
    pub seq: i64,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: ParticipantRole,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Image(String),
    Audio(String),
}

/// Validated content of a message: text, one attachment, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl MessageBody {
    pub fn new(
        text: Option<String>,
        attachment: Option<Attachment>,
        max_text_length: usize,
    ) -> Result<Self, ChatError> {
        let text = text.filter(|t| !t.trim().is_empty());

        if let Some(text) = &text {
            if text.chars().count() > max_text_length {
                return Err(ChatError::InvalidInput(format!(
                    "message text exceeds {} characters",
                    max_text_length
                )));
            }
        }

        if text.is_none() && attachment.is_none() {
            return Err(ChatError::InvalidInput(
                "message needs non-empty text or one attachment".to_string(),
            ));
        }

        Ok(Self { text, attachment })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), attachment: None }
    }
}

/// Frame sent by a client over the room socket.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundPayload {
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

impl InboundPayload {
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        serde_json::from_str(raw)
            .map_err(|e| ChatError::InvalidInput(format!("malformed message frame: {}", e)))
    }

    pub fn into_body(self, max_text_length: usize) -> Result<MessageBody, ChatError> {
        let attachment = match (self.image_url, self.audio_url) {
            (Some(_), Some(_)) => {
                return Err(ChatError::InvalidInput(
                    "only one of image_url or audio_url may be attached".to_string(),
                ))
            }
            (Some(url), None) => Some(Attachment::Image(checked_url(url)?)),
            (None, Some(url)) => Some(Attachment::Audio(checked_url(url)?)),
            (None, None) => None,
        };

        MessageBody::new(self.text, attachment, max_text_length)
    }
}

fn checked_url(url: String) -> Result<String, ChatError> {
    let trimmed = url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(trimmed.to_string())
    } else {
        Err(ChatError::InvalidInput("attachment must be an http(s) URL".to_string()))
    }
}

/// A message ready to be appended to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender: Participant,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
}

impl NewChatMessage {
    pub fn new(room_id: Uuid, sender: Participant, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender,
            body,
            created_at: Utc::now(),
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.body.attachment {
            Some(Attachment::Image(url)) => Some(url),
            _ => None,
        }
    }

    pub fn audio_url(&self) -> Option<&str> {
        match &self.body.attachment {
            Some(Attachment::Audio(url)) => Some(url),
            _ => None,
        }
    }

    pub fn into_stored(self, seq: i64) -> ChatMessage {
        ChatMessage {
            id: self.id,
            seq,
            room_id: self.room_id,
            sender_id: self.sender.user_id,
            sender_role: self.sender.role,
            text: self.body.text.clone(),
            image_url: self.image_url().map(str::to_string),
            audio_url: self.audio_url().map(str::to_string),
            created_at: self.created_at,
        }
    }
}

// ==============================================================================
// OUTBOUND FRAMES
// ==============================================================================

/// Item queued for a connection's socket writer.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    History(Vec<ChatMessage>),
    Message(Arc<ChatMessage>),
    Error { code: &'static str, message: String },
}

impl OutboundFrame {
    pub fn error(err: &ChatError) -> Self {
        OutboundFrame::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Encodes the item as socket text frames; history expands to one frame per message.
    pub fn encode(&self) -> Result<Vec<String>, serde_json::Error> {
        match self {
            OutboundFrame::History(messages) => messages
                .iter()
                .map(serde_json::to_string)
                .collect(),
            OutboundFrame::Message(message) => Ok(vec![serde_json::to_string(message.as_ref())?]),
            OutboundFrame::Error { code, message } => Ok(vec![json!({
                "type": "error",
                "code": code,
                "message": message,
            })
            .to_string()]),
        }
    }
}

// ==============================================================================
// HTTP RESPONSES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: Uuid,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Room> for CreateRoomResponse {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.id,
            transaction_id: room.transaction_id,
            created_at: room.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: Uuid,
    pub transaction_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&RoomContext> for RoomSummary {
    fn from(ctx: &RoomContext) -> Self {
        Self {
            room_id: ctx.room.id,
            transaction_id: ctx.room.transaction_id,
            patient_id: ctx.participants.patient_id,
            doctor_id: ctx.participants.doctor_id,
            created_at: ctx.room.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDetailsResponse {
    #[serde(flatten)]
    pub room: RoomSummary,
    pub messages: Vec<ChatMessage>,
}
