//! RocketLink Models - Chat domain types shared by the realtime session,
//! the REST client and the CLI.
//!
//! Messages arrive from two places (history fetches and live pushes) with
//! slightly different encodings; the types here accept both.

pub mod models;

// Re-export key types
pub use models::credential::Credential;
pub use models::message::{Attachment, AttachmentKind, ChatMessage, MessageAuthor};
pub use models::room::{ChannelSummary, DirectRoomSummary, Room, RoomKind};
pub use models::user::User;
