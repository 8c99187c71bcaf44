use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;
use veritas_llm::TurnRole;

pub use veritas_llm::Source;

// Macro keeps both ID wrappers structurally identical.
macro_rules! define_chat_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(raw: Uuid) -> Self {
                Self(raw)
            }

            /// Generates a time-ordered identifier.
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
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
                Self::new(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_chat_id!(SessionId);
define_chat_id!(MessageId);

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

impl From<Role> for TurnRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => TurnRole::User,
            Role::Model => TurnRole::Model,
        }
    }
}

/// Core transcript message model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub sources: Vec<Source>,
    pub timestamp_unix_millis: u64,
}

impl Message {
    /// Creates a message with an explicit timestamp.
    pub fn new(
        id: MessageId,
        role: Role,
        text: impl Into<String>,
        timestamp_unix_millis: u64,
    ) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            sources: Vec::new(),
            timestamp_unix_millis,
        }
    }

    /// Creates a user message stamped with the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(
            MessageId::new_v7(),
            Role::User,
            text,
            current_unix_timestamp_millis(),
        )
    }

    /// Creates a model message stamped with the current time.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(
            MessageId::new_v7(),
            Role::Model,
            text,
            current_unix_timestamp_millis(),
        )
    }

    /// Creates the empty model placeholder that streams in place.
    pub fn model_placeholder() -> Self {
        Self::model(String::new())
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }
}

/// Partial update applied to one transcript message. `None` fields are left
/// untouched; `Some` fields replace the current value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub sources: Option<Vec<Source>>,
}

impl MessagePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }
}

pub(crate) fn current_unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}
