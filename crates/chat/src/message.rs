use std::fmt;

use plotline_chart::ChartSpec;
use uuid::Uuid;

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

// Macro keeps both ID wrappers structurally identical.
macro_rules! define_chat_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

define_chat_id!(ConversationId);
define_chat_id!(MessageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation transcript.
///
/// Chart specs ride on the assistant message that produced them, so
/// switching conversations keeps each chart with its own answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    /// Retrieval citations backing the answer; filled outside the stream.
    pub sources: Vec<String>,
    pub chart_specs: Option<Vec<ChartSpec>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::User,
            text: text.into(),
            sources: Vec::new(),
            chart_specs: None,
        }
    }

    /// Empty assistant message that streamed text will be merged into.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            text: String::new(),
            sources: Vec::new(),
            chart_specs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    /// Follow-up suggestions belong to the conversation, not a message;
    /// each suggestions frame replaces them wholesale.
    pub suggestions: Vec<String>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = DEFAULT_CONVERSATION_TITLE.to_string();
        }

        Self {
            id: ConversationId::generate(),
            title,
            messages: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Records the user's question and the assistant placeholder that the
    /// next stream will fill in, returning the placeholder's ID.
    pub fn push_exchange(&mut self, question: impl Into<String>) -> MessageId {
        self.messages.push(ChatMessage::user(question));
        let placeholder = ChatMessage::assistant_placeholder();
        let id = placeholder.id;
        self.messages.push(placeholder);
        id
    }

    /// Most recent assistant message, the merge target for stream snapshots.
    pub fn last_assistant_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .rev()
            .find(|message| message.role == Role::Assistant)
    }
}
