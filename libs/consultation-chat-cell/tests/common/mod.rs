#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use consultation_chat_cell::models::{OutboundFrame, PaymentStatus, RoomContext, Transaction};
use consultation_chat_cell::{ChatState, InMemoryChatStore, Participant};
use shared_config::ChatSettings;
use shared_utils::test_utils::{TestConfig, TestUser};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

/// A paid transaction between a fresh patient and doctor, backed by the in-memory store.
pub struct ChatFixture {
    pub store: Arc<InMemoryChatStore>,
    pub state: Arc<ChatState>,
    pub patient: TestUser,
    pub doctor: TestUser,
    pub transaction_id: Uuid,
}

impl ChatFixture {
    pub async fn new() -> Self {
        Self::with_settings(ChatSettings::default()).await
    }

    pub async fn with_settings(settings: ChatSettings) -> Self {
        let mut config = TestConfig::default().to_app_config();
        config.chat = settings;

        let store = Arc::new(InMemoryChatStore::new());
        let state = Arc::new(ChatState::in_memory(Arc::new(config), store.clone()));

        let patient = TestUser::patient("patient@example.com");
        let doctor = TestUser::doctor("doctor@example.com");
        let transaction_id =
            insert_transaction(&store, patient.id, doctor.id, PaymentStatus::Success).await;

        Self { store, state, patient, doctor, transaction_id }
    }

    pub fn patient(&self) -> Participant {
        Participant::patient(self.patient.id)
    }

    pub fn doctor(&self) -> Participant {
        Participant::doctor(self.doctor.id)
    }

    /// Creates the room for the fixture's transaction and resolves its participants.
    pub async fn open_room(&self) -> RoomContext {
        let room = self
            .state
            .registry
            .create_room(self.transaction_id, &self.patient())
            .await
            .expect("room should be created");
        self.state.registry.resolve(room.id).await.expect("room should resolve")
    }
}

pub async fn insert_transaction(
    store: &InMemoryChatStore,
    patient_id: Uuid,
    doctor_id: Uuid,
    payment_status: PaymentStatus,
) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_transaction(Transaction { id, patient_id, doctor_id, payment_status })
        .await;
    id
}

pub async fn next_frame(rx: &mut mpsc::Receiver<OutboundFrame>) -> OutboundFrame {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbound queue closed")
}

pub async fn assert_quiet(rx: &mut mpsc::Receiver<OutboundFrame>) {
    if let Ok(Some(frame)) = tokio::time::timeout(QUIET_PERIOD, rx.recv()).await {
        panic!("expected no frame, got {:?}", frame);
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
