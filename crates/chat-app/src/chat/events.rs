use super::message::Source;
use super::turn::{FailureKind, TurnTransition};

/// Fixed notice streamed into the transcript when a turn fails mid-flight,
/// so the user sees something useful before the placeholder is finalized.
pub const STREAM_ERROR_NOTICE: &str =
    "Error: Unable to connect to Veritas Intelligence Network. Please check your connection or API limit.";

/// Fixed final text installed on a failed turn's placeholder.
pub const ERROR_PLACEHOLDER_TEXT: &str = "Error encountered.";

/// Typed event emitted while one turn streams.
///
/// `Completed` and `Failed` are terminal; exactly one of them ends every
/// stream. `Completed` carries the full accumulated text and the deduplicated
/// source list so consumers never have to reassemble state themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    TextDelta(String),
    SourcesFound(Vec<Source>),
    Completed {
        text: String,
        sources: Vec<Source>,
    },
    Failed {
        kind: FailureKind,
        detail: String,
    },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Maps the event onto the turn state machine input it represents.
    pub fn transition(&self) -> TurnTransition {
        match self {
            Self::TextDelta(_) | Self::SourcesFound(_) => TurnTransition::ChunkReceived,
            Self::Completed { .. } => TurnTransition::Complete,
            Self::Failed { kind, .. } => TurnTransition::Fail(*kind),
        }
    }
}
