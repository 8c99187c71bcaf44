/// Turn event contracts and the fixed error strings.
pub mod events;
/// Domain entities: IDs, roles, messages, and patches.
pub mod message;
pub mod session;
pub mod transcript;
/// Deterministic turn lifecycle state machine.
pub mod turn;

pub use events::{ERROR_PLACEHOLDER_TEXT, STREAM_ERROR_NOTICE, TurnEvent};
pub use message::{Message, MessageId, MessagePatch, Role, SessionId, Source};
pub use session::{ChatSession, PreparedTurn, SubmitRejection, WELCOME_TEXT};
pub use transcript::Transcript;
pub use turn::{
    FailureKind, TurnState, TurnTransition, TurnTransitionRejection, TurnTransitionResult,
};
