use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{ChatMessage, NewChatMessage, Participant, Room, Transaction};

/// Read-only view of the payment service's consultation transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionDirectory: Send + Sync {
    async fn find_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, ChatError>;

    /// Transactions where the participant is the patient or the assigned doctor.
    async fn list_for_participant(&self, participant: &Participant) -> Result<Vec<Transaction>, ChatError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Fails with `Conflict` when the transaction already owns a room.
    async fn insert_room(&self, transaction_id: Uuid) -> Result<Room, ChatError>;

    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>, ChatError>;

    async fn find_room_by_transaction(&self, transaction_id: Uuid) -> Result<Option<Room>, ChatError>;

    async fn list_rooms_for_transactions(&self, transaction_ids: &[Uuid]) -> Result<Vec<Room>, ChatError>;
}

/// Append-only message log, ordered by `created_at` then insertion sequence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, ChatError>;

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<ChatMessage>, ChatError>;
}
