// libs/consultation-chat-cell/src/services/persistence.rs
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::error::ChatError;
use crate::models::{ChatMessage, NewChatMessage, Participant, ParticipantRole, Room, Transaction};
use crate::services::store::{MessageStore, RoomStore, TransactionDirectory};

/// PostgREST-backed store for transactions, rooms and messages.
///
/// Room sessions write on behalf of the backend rather than a user, so every
/// call goes out with the service role key.
pub struct SupabaseChatStore {
    supabase: SupabaseClient,
}

impl SupabaseChatStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::service_role(config),
        }
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    async fn select<T>(&self, path: &str) -> Result<Vec<T>, ChatError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| {
                error!("Supabase query {} failed: {}", path, e);
                ChatError::from(e)
            })
    }
}

fn id_list(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl TransactionDirectory for SupabaseChatStore {
    async fn find_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, ChatError> {
        let path = format!(
            "/rest/v1/doctor_transactions?id=eq.{}&select=id,patient_id,doctor_id,payment_status",
            transaction_id
        );
        let rows: Vec<Transaction> = self.select(&path).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_for_participant(&self, participant: &Participant) -> Result<Vec<Transaction>, ChatError> {
        let column = match participant.role {
            ParticipantRole::Patient => "patient_id",
            ParticipantRole::Doctor => "doctor_id",
        };
        let path = format!(
            "/rest/v1/doctor_transactions?{}=eq.{}&select=id,patient_id,doctor_id,payment_status",
            column, participant.user_id
        );
        self.select(&path).await
    }
}

#[async_trait]
impl RoomStore for SupabaseChatStore {
    async fn insert_room(&self, transaction_id: Uuid) -> Result<Room, ChatError> {
        let body = json!({
            "id": Uuid::new_v4(),
            "transaction_id": transaction_id,
        });

        // The unique constraint on rooms.transaction_id answers 409 for a duplicate.
        let rows: Vec<Room> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/rooms",
                None,
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(ChatError::from)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ChatError::StorageUnavailable("room insert returned no row".to_string()))
    }

    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>, ChatError> {
        let rows: Vec<Room> = self
            .select(&format!("/rest/v1/rooms?id=eq.{}", room_id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_room_by_transaction(&self, transaction_id: Uuid) -> Result<Option<Room>, ChatError> {
        let rows: Vec<Room> = self
            .select(&format!("/rest/v1/rooms?transaction_id=eq.{}", transaction_id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_rooms_for_transactions(&self, transaction_ids: &[Uuid]) -> Result<Vec<Room>, ChatError> {
        if transaction_ids.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!(
            "/rest/v1/rooms?transaction_id=in.({})&order=created_at.asc",
            id_list(transaction_ids)
        );
        self.select(&path).await
    }
}

#[async_trait]
impl MessageStore for SupabaseChatStore {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, ChatError> {
        debug!("Persisting message {} for room {}", message.id, message.room_id);

        let body = json!({
            "id": message.id,
            "room_id": message.room_id,
            "sender_id": message.sender.user_id,
            "sender_role": message.sender.role,
            "text": message.body.text,
            "image_url": message.image_url(),
            "audio_url": message.audio_url(),
            "created_at": message.created_at,
        });

        let rows: Vec<ChatMessage> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/messages",
                None,
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| {
                error!("Failed to persist message for room {}: {}", message.room_id, e);
                ChatError::StorageUnavailable(e.to_string())
            })?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ChatError::StorageUnavailable("message insert returned no row".to_string()))
    }

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
        let path = format!(
            "/rest/v1/messages?room_id=eq.{}&order=created_at.asc,seq.asc",
            room_id
        );
        self.select(&path).await
    }
}
