// libs/consultation-chat-cell/src/services/mod.rs

pub mod connection;
pub mod hub;
pub mod memory;
pub mod persistence;
pub mod registry;
pub mod session;
pub mod store;
pub mod upload;

pub use connection::{Connection, DeliveryError};
pub use hub::{AttachedConnection, ConnectionHub, HubStats};
pub use memory::InMemoryChatStore;
pub use persistence::SupabaseChatStore;
pub use registry::RoomRegistry;
pub use session::{RoomSessionHandle, SessionCommand, SessionState};
pub use store::{MessageStore, RoomStore, TransactionDirectory};
pub use upload::{MediaKind, MediaUpload, MediaUploader, SupabaseMediaUploader};
