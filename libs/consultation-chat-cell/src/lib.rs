// libs/consultation-chat-cell/src/lib.rs
//! # Consultation Chat Cell
//!
//! Real-time text and media chat between a patient and the doctor of a paid
//! consultation transaction.
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------+
//! |                 Consultation Chat Cell                     |
//! +------------------------------------------------------------+
//! |  gateway.rs          |  WebSocket attach, reader / writer  |
//! |  handlers.rs         |  HTTP endpoint handlers             |
//! |  router.rs           |  Route definitions                  |
//! |  models.rs           |  Rooms, messages, wire frames       |
//! |  state.rs            |  Shared registry / hub / backends   |
//! |  services/           |                                     |
//! |    registry.rs       |  Room creation and authorization    |
//! |    hub.rs            |  Room session lookup and lifecycle  |
//! |    session.rs        |  Serialized per-room event loop     |
//! |    connection.rs     |  Bounded per-socket outbound queue  |
//! |    store.rs          |  Persistence traits                 |
//! |    persistence.rs    |  Supabase PostgREST backend         |
//! |    memory.rs         |  In-process backend                 |
//! |    upload.rs         |  Attachment storage                 |
//! +------------------------------------------------------------+
//! ```
//!
//! Every room has at most one session task. All attaches, sends and
//! detaches for a room pass through that task in arrival order, so a message
//! is persisted before anyone sees it and a newly attached socket gets the
//! full history followed by every later message, with nothing missing or
//! repeated.
//!
//! ## API Endpoints
//!
//! - `POST /chat/rooms` - Open the room of a paid transaction (patient only)
//! - `GET /chat/rooms` - Rooms the caller takes part in
//! - `GET /chat/rooms/{room_id}` - Room details with message history
//! - `GET /chat/rooms/{room_id}/ws` - Attach to the room over WebSocket
//! - `POST /chat/rooms/{room_id}/messages` - Send an image or audio file
//! - `GET /chat/transactions/{transaction_id}/room` - Room of a transaction
//! - `GET /chat/health` - Health check
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use consultation_chat_cell::{consultation_chat_routes, ChatState};
//! use shared_config::AppConfig;
//! use std::sync::Arc;
//!
//! let config = Arc::new(AppConfig::from_env());
//! let state = Arc::new(ChatState::from_config(config));
//! let chat_routes = consultation_chat_routes(state);
//! ```

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

pub use error::ChatError;

pub use models::{
    ChatMessage, CreateRoomResponse, InboundPayload, MessageBody, OutboundFrame, Participant,
    ParticipantRole, PaymentStatus, Room, RoomContext, RoomParticipants, RoomSummary, Transaction,
};

pub use services::{ConnectionHub, InMemoryChatStore, RoomRegistry, SupabaseChatStore};

pub use router::consultation_chat_routes;
pub use state::ChatState;
