use std::sync::Arc;

use tracing::{info, warn};

use shared_config::AppConfig;

use crate::services::{
    ConnectionHub, InMemoryChatStore, MediaUploader, MessageStore, RoomRegistry, RoomStore,
    SupabaseChatStore, SupabaseMediaUploader, TransactionDirectory,
};

/// Everything the chat routes share: one registry and one hub per process.
#[derive(Clone)]
pub struct ChatState {
    pub config: Arc<AppConfig>,
    pub registry: RoomRegistry,
    pub hub: ConnectionHub,
    pub messages: Arc<dyn MessageStore>,
    pub uploader: Arc<dyn MediaUploader>,
}

impl ChatState {
    pub fn new(
        config: Arc<AppConfig>,
        transactions: Arc<dyn TransactionDirectory>,
        rooms: Arc<dyn RoomStore>,
        messages: Arc<dyn MessageStore>,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        let hub = ConnectionHub::new(messages.clone(), config.chat.clone());
        Self {
            registry: RoomRegistry::new(transactions, rooms),
            hub,
            messages,
            uploader,
            config,
        }
    }

    /// Uses the Supabase backend when it is configured, otherwise a process-local store.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        if config.is_persistence_configured() {
            info!("Consultation chat persisting to Supabase at {}", config.supabase_url);
            let store = Arc::new(SupabaseChatStore::new(&config));
            let uploader = Arc::new(SupabaseMediaUploader::new(&config));
            Self::new(config, store.clone(), store.clone(), store, uploader)
        } else {
            warn!("Supabase service role not configured, consultation chat is using in-memory storage");
            Self::in_memory(config, Arc::new(InMemoryChatStore::new()))
        }
    }

    pub fn in_memory(config: Arc<AppConfig>, store: Arc<InMemoryChatStore>) -> Self {
        Self::new(config, store.clone(), store.clone(), store.clone(), store)
    }
}
