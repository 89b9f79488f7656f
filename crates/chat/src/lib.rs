pub mod config;
pub mod message;
pub mod status;
pub mod sync;

pub use config::{DEFAULT_BASE_URL, StreamConfig};
pub use message::{
    ChatMessage, Conversation, ConversationId, DEFAULT_CONVERSATION_TITLE, MessageId, Role,
};
pub use status::{StatusSeverity, failure_hint, is_access_denied, status_severity};
pub use sync::merge_snapshot;
