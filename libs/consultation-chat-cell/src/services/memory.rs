use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{ChatMessage, NewChatMessage, Participant, ParticipantRole, Room, Transaction};
use crate::services::store::{MessageStore, RoomStore, TransactionDirectory};
use crate::services::upload::{MediaUpload, MediaUploader};

/// Process-local backend for development without Supabase, and for tests.
#[derive(Default)]
pub struct InMemoryChatStore {
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    rooms: RwLock<HashMap<Uuid, Room>>,
    messages: RwLock<HashMap<Uuid, Vec<ChatMessage>>>,
    media: RwLock<HashMap<String, Vec<u8>>>,
    next_seq: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_transaction(&self, transaction: Transaction) {
        self.transactions.write().await.insert(transaction.id, transaction);
    }

    /// Simulates a storage outage for message reads and writes.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn media_object(&self, url: &str) -> Option<Vec<u8>> {
        self.media.read().await.get(url).cloned()
    }

    pub async fn media_count(&self) -> usize {
        self.media.read().await.len()
    }

    fn check_available(&self) -> Result<(), ChatError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ChatError::StorageUnavailable("message store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransactionDirectory for InMemoryChatStore {
    async fn find_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, ChatError> {
        Ok(self.transactions.read().await.get(&transaction_id).cloned())
    }

    async fn list_for_participant(&self, participant: &Participant) -> Result<Vec<Transaction>, ChatError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| match participant.role {
                ParticipantRole::Patient => tx.patient_id == participant.user_id,
                ParticipantRole::Doctor => tx.doctor_id == participant.user_id,
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoomStore for InMemoryChatStore {
    async fn insert_room(&self, transaction_id: Uuid) -> Result<Room, ChatError> {
        let mut rooms = self.rooms.write().await;
        if rooms.values().any(|room| room.transaction_id == transaction_id) {
            return Err(ChatError::Conflict(format!(
                "room for transaction {} already exists",
                transaction_id
            )));
        }

        let room = Room {
            id: Uuid::new_v4(),
            transaction_id,
            created_at: Utc::now(),
        };
        rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>, ChatError> {
        Ok(self.rooms.read().await.get(&room_id).cloned())
    }

    async fn find_room_by_transaction(&self, transaction_id: Uuid) -> Result<Option<Room>, ChatError> {
        Ok(self
            .rooms
            .read()
            .await
            .values()
            .find(|room| room.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_rooms_for_transactions(&self, transaction_ids: &[Uuid]) -> Result<Vec<Room>, ChatError> {
        let rooms = self.rooms.read().await;
        let mut found: Vec<Room> = rooms
            .values()
            .filter(|room| transaction_ids.contains(&room.transaction_id))
            .cloned()
            .collect();
        found.sort_by_key(|room| room.created_at);
        Ok(found)
    }
}

#[async_trait]
impl MessageStore for InMemoryChatStore {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, ChatError> {
        self.check_available()?;

        let mut messages = self.messages.write().await;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = message.into_stored(seq);
        messages.entry(stored.room_id).or_default().push(stored.clone());

        debug!("Stored message {} (seq {}) in room {}", stored.id, seq, stored.room_id);
        Ok(stored)
    }

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
        self.check_available()?;

        let mut history = self
            .messages
            .read()
            .await
            .get(&room_id)
            .cloned()
            .unwrap_or_default();
        history.sort_by_key(|message| (message.created_at, message.seq));
        Ok(history)
    }
}

#[async_trait]
impl MediaUploader for InMemoryChatStore {
    async fn upload(&self, room_id: Uuid, media: MediaUpload) -> Result<String, ChatError> {
        self.check_available()?;

        let url = format!("http://localhost/media/{}", media.object_path(room_id));
        self.media.write().await.insert(url.clone(), media.bytes);
        Ok(url)
    }

    async fn remove(&self, url: &str) -> Result<(), ChatError> {
        self.media
            .write()
            .await
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| ChatError::NotFound(format!("media object {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageBody, PaymentStatus};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn second_room_for_transaction_conflicts() {
        let store = InMemoryChatStore::new();
        let transaction_id = Uuid::new_v4();

        store.insert_room(transaction_id).await.unwrap();
        assert_matches!(store.insert_room(transaction_id).await, Err(ChatError::Conflict(_)));
        assert_eq!(store.room_count().await, 1);
    }

    #[tokio::test]
    async fn history_is_in_append_order() {
        let store = InMemoryChatStore::new();
        let room_id = Uuid::new_v4();
        let sender = Participant::doctor(Uuid::new_v4());

        for text in ["one", "two", "three"] {
            store
                .append(NewChatMessage::new(room_id, sender, MessageBody::text(text)))
                .await
                .unwrap();
        }

        let texts: Vec<_> = store
            .list_by_room(room_id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn lists_transactions_by_role() {
        let store = InMemoryChatStore::new();
        let patient = Uuid::new_v4();
        let doctor = Uuid::new_v4();
        store
            .insert_transaction(Transaction {
                id: Uuid::new_v4(),
                patient_id: patient,
                doctor_id: doctor,
                payment_status: PaymentStatus::Success,
            })
            .await;

        assert_eq!(store.list_for_participant(&Participant::doctor(doctor)).await.unwrap().len(), 1);
        // Same id under the wrong role matches nothing.
        assert!(store.list_for_participant(&Participant::patient(doctor)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outage_fails_appends() {
        let store = InMemoryChatStore::new();
        store.set_unavailable(true);

        let result = store
            .append(NewChatMessage::new(Uuid::new_v4(), Participant::patient(Uuid::new_v4()), MessageBody::text("x")))
            .await;
        assert_matches!(result, Err(ChatError::StorageUnavailable(_)));
    }
}
