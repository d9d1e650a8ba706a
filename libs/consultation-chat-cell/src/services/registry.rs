use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{Participant, ParticipantRole, Room, RoomContext};
use crate::services::store::{RoomStore, TransactionDirectory};

/// Maps paid consultation transactions to chat rooms and answers who may enter them.
#[derive(Clone)]
pub struct RoomRegistry {
    transactions: Arc<dyn TransactionDirectory>,
    rooms: Arc<dyn RoomStore>,
}

impl RoomRegistry {
    pub fn new(transactions: Arc<dyn TransactionDirectory>, rooms: Arc<dyn RoomStore>) -> Self {
        Self { transactions, rooms }
    }

    /// Opens the room of a paid transaction on behalf of its patient.
    pub async fn create_room(
        &self,
        transaction_id: Uuid,
        requester: &Participant,
    ) -> Result<Room, ChatError> {
        debug!("Creating chat room for transaction {}", transaction_id);

        let transaction = self
            .transactions
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("transaction {} not found", transaction_id)))?;

        if requester.role != ParticipantRole::Patient || transaction.patient_id != requester.user_id {
            warn!(
                "User {} tried to open a room for transaction {} they do not own",
                requester.user_id, transaction_id
            );
            return Err(ChatError::Unauthorized(
                "only the patient of this transaction can open its room".to_string(),
            ));
        }

        if !transaction.is_paid() {
            return Err(ChatError::Unauthorized(format!(
                "transaction {} has not been paid",
                transaction_id
            )));
        }

        if self.rooms.find_room_by_transaction(transaction_id).await?.is_some() {
            return Err(ChatError::Conflict(format!(
                "room for transaction {} already exists",
                transaction_id
            )));
        }

        // A concurrent create that slipped past the lookup is rejected by the store.
        let room = self.rooms.insert_room(transaction_id).await?;
        info!("Created room {} for transaction {}", room.id, transaction_id);
        Ok(room)
    }

    pub async fn get_room_by_transaction(&self, transaction_id: Uuid) -> Result<Room, ChatError> {
        self.rooms
            .find_room_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("no room for transaction {}", transaction_id)))
    }

    pub async fn get_room(&self, room_id: Uuid) -> Result<Room, ChatError> {
        self.rooms
            .find_room(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {} not found", room_id)))
    }

    /// Loads a room together with the participants of its transaction.
    pub async fn resolve(&self, room_id: Uuid) -> Result<RoomContext, ChatError> {
        let room = self.get_room(room_id).await?;

        let transaction = self
            .transactions
            .find_transaction(room.transaction_id)
            .await?
            .ok_or_else(|| {
                ChatError::NotFound(format!(
                    "transaction {} of room {} not found",
                    room.transaction_id, room_id
                ))
            })?;

        Ok(RoomContext {
            participants: transaction.participants(),
            room,
        })
    }

    /// True when the user is the room's patient (role patient) or its doctor (role doctor).
    pub async fn authorize(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> Result<bool, ChatError> {
        let context = self.resolve(room_id).await?;
        Ok(context.participants.admits(&Participant { user_id, role }))
    }

    pub async fn authorize_participant(
        &self,
        room_id: Uuid,
        participant: &Participant,
    ) -> Result<RoomContext, ChatError> {
        let context = self.resolve(room_id).await?;

        if !context.participants.admits(participant) {
            warn!(
                "User {} ({}) denied access to room {}",
                participant.user_id, participant.role, room_id
            );
            return Err(ChatError::Unauthorized(
                "user is not a participant of this room".to_string(),
            ));
        }

        Ok(context)
    }

    /// Rooms of every transaction the participant takes part in, oldest first.
    pub async fn rooms_for(&self, participant: &Participant) -> Result<Vec<RoomContext>, ChatError> {
        let transactions = self.transactions.list_for_participant(participant).await?;
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = transactions.iter().map(|tx| tx.id).collect();
        let rooms = self.rooms.list_rooms_for_transactions(&ids).await?;

        Ok(rooms
            .into_iter()
            .filter_map(|room| {
                transactions
                    .iter()
                    .find(|tx| tx.id == room.transaction_id)
                    .map(|tx| RoomContext {
                        participants: tx.participants(),
                        room,
                    })
            })
            .collect())
    }
}
