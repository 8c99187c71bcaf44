use super::events::{ERROR_PLACEHOLDER_TEXT, TurnEvent};
use super::message::{Message, MessageId, MessagePatch, SessionId, current_unix_timestamp_millis};
use super::transcript::Transcript;
use super::turn::{FailureKind, TurnState, TurnTransition};

/// Opening message seeded into a fresh session.
pub const WELCOME_TEXT: &str =
    "Greetings. I am Veritas. Select your research depth required for today's inquiry.";

/// Why a submission was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyPrompt,
    RequestInFlight,
}

/// Everything the caller needs to run the turn it just submitted: the
/// placeholder to stream into, the trimmed prompt, and the history snapshot
/// taken before this turn's messages were appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTurn {
    pub placeholder_id: MessageId,
    pub prompt: String,
    pub history: Vec<Message>,
}

/// One research conversation: transcript, turn lifecycle, and bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    id: SessionId,
    title: String,
    transcript: Transcript,
    turn: TurnState,
    last_updated_unix_millis: u64,
}

impl ChatSession {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: SessionId::new_v7(),
            title: title.into(),
            transcript: Transcript::new(),
            turn: TurnState::Idle,
            last_updated_unix_millis: current_unix_timestamp_millis(),
        }
    }

    /// Creates a session seeded with the standard greeting.
    pub fn with_welcome(title: impl Into<String>) -> Self {
        let mut session = Self::new(title);
        session.transcript.append(Message::model(WELCOME_TEXT));
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    pub fn last_updated_unix_millis(&self) -> u64 {
        self.last_updated_unix_millis
    }

    /// Accepts a prompt for the next turn, or rejects it without queueing.
    ///
    /// On success the user message and an empty model placeholder are already
    /// appended, the pending gate is closed, and the returned snapshot holds
    /// the history as it stood before either append.
    pub fn submit(&mut self, prompt: &str) -> Result<PreparedTurn, SubmitRejection> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SubmitRejection::EmptyPrompt);
        }
        if self.transcript.is_pending() {
            return Err(SubmitRejection::RequestInFlight);
        }

        self.turn = self
            .turn
            .apply(TurnTransition::Begin)
            .map_err(|_| SubmitRejection::RequestInFlight)?;

        let history = self.transcript.messages().to_vec();

        self.transcript.append(Message::user(prompt));
        let placeholder = Message::model_placeholder();
        let placeholder_id = placeholder.id;
        self.transcript.append(placeholder);
        self.transcript.set_pending(true);
        self.touch();

        Ok(PreparedTurn {
            placeholder_id,
            prompt: prompt.to_string(),
            history,
        })
    }

    /// Applies one turn event to the session, updating the placeholder and
    /// the turn lifecycle together. Events naming an unknown placeholder and
    /// events that arrive after the turn reached a terminal state are
    /// dropped whole, keeping turn state and transcript in step.
    pub fn apply_event(&mut self, placeholder_id: MessageId, event: TurnEvent) {
        if self.transcript.get(placeholder_id).is_none() {
            tracing::warn!(
                placeholder_id = %placeholder_id,
                "dropping turn event for an unknown placeholder"
            );
            return;
        }

        let next_turn = match self.turn.apply(event.transition()) {
            Ok(next_turn) => next_turn,
            Err(rejection) => {
                tracing::warn!(
                    placeholder_id = %placeholder_id,
                    rejection = ?rejection,
                    "dropping turn event that does not fit the current state"
                );
                return;
            }
        };
        self.turn = next_turn;

        match event {
            TurnEvent::TextDelta(delta) => {
                if let Some(current) = self.transcript.get(placeholder_id) {
                    let mut text = current.text.clone();
                    text.push_str(&delta);
                    self.transcript.update_message(placeholder_id, MessagePatch::text(text));
                }
            }
            TurnEvent::SourcesFound(_) => {
                // Sources attach to the placeholder only at completion.
            }
            TurnEvent::Completed { text, sources } => {
                self.transcript.update_message(
                    placeholder_id,
                    MessagePatch::text(text).with_sources(sources),
                );
                self.transcript.set_pending(false);
                self.touch();
            }
            TurnEvent::Failed { kind, .. } => {
                if kind == FailureKind::Upstream {
                    self.transcript.update_message(
                        placeholder_id,
                        MessagePatch::text(ERROR_PLACEHOLDER_TEXT).with_sources(Vec::new()),
                    );
                }
                // Cancelled turns keep whatever text already streamed in.
                self.transcript.set_pending(false);
                self.touch();
            }
        }
    }

    fn touch(&mut self) {
        self.last_updated_unix_millis = current_unix_timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::{Role, Source};

    fn completed(text: &str, sources: Vec<Source>) -> TurnEvent {
        TurnEvent::Completed {
            text: text.to_string(),
            sources,
        }
    }

    fn failed(kind: FailureKind) -> TurnEvent {
        TurnEvent::Failed {
            kind,
            detail: "test failure".to_string(),
        }
    }

    #[test]
    fn with_welcome_seeds_the_greeting() {
        let session = ChatSession::with_welcome("Research");
        let messages = session.transcript().messages();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Model);
        assert_eq!(messages[0].text, WELCOME_TEXT);
        assert_eq!(session.turn_state(), TurnState::Idle);
    }

    #[test]
    fn submit_appends_user_then_placeholder_and_closes_the_gate() {
        let mut session = ChatSession::with_welcome("Research");

        let prepared = session.submit("  What is dark matter?  ").unwrap();

        assert_eq!(prepared.prompt, "What is dark matter?");
        // The snapshot predates this turn's appends.
        assert_eq!(prepared.history.len(), 1);
        assert_eq!(prepared.history[0].text, WELCOME_TEXT);

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].text, "What is dark matter?");
        assert_eq!(messages[2].id, prepared.placeholder_id);
        assert!(messages[2].text.is_empty());

        assert!(session.transcript().is_pending());
        assert!(session.transcript().awaiting_first_chunk());
        assert_eq!(session.turn_state(), TurnState::Sending);
    }

    #[test]
    fn submit_rejects_blank_prompts_without_touching_the_transcript() {
        let mut session = ChatSession::with_welcome("Research");
        let before = session.transcript().clone();

        assert_eq!(session.submit("   "), Err(SubmitRejection::EmptyPrompt));
        assert_eq!(session.transcript(), &before);
        assert_eq!(session.turn_state(), TurnState::Idle);
    }

    #[test]
    fn submit_rejects_while_a_turn_is_in_flight() {
        let mut session = ChatSession::new("Research");
        session.submit("first").unwrap();

        assert_eq!(
            session.submit("second"),
            Err(SubmitRejection::RequestInFlight)
        );
        // Only the first turn's two messages exist.
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn deltas_accumulate_into_the_placeholder() {
        let mut session = ChatSession::new("Research");
        let prepared = session.submit("question").unwrap();

        session.apply_event(prepared.placeholder_id, TurnEvent::TextDelta("The ".to_string()));
        assert_eq!(session.turn_state(), TurnState::Streaming);
        assert!(!session.transcript().awaiting_first_chunk());

        session.apply_event(
            prepared.placeholder_id,
            TurnEvent::TextDelta("answer grows.".to_string()),
        );

        let placeholder = session.transcript().get(prepared.placeholder_id).unwrap();
        assert_eq!(placeholder.text, "The answer grows.");
        assert!(session.transcript().is_pending());
    }

    #[test]
    fn completion_finalizes_the_placeholder_and_reopens_the_gate() {
        let mut session = ChatSession::new("Research");
        let prepared = session.submit("question").unwrap();
        let sources = vec![Source::new("https://example.org", "Example")];

        session.apply_event(prepared.placeholder_id, TurnEvent::TextDelta("The".to_string()));
        session.apply_event(
            prepared.placeholder_id,
            completed("The full answer.", sources.clone()),
        );

        let placeholder = session.transcript().get(prepared.placeholder_id).unwrap();
        assert_eq!(placeholder.text, "The full answer.");
        assert_eq!(placeholder.sources, sources);
        assert!(!session.transcript().is_pending());
        assert_eq!(session.turn_state(), TurnState::Completed);

        assert!(session.submit("next question").is_ok());
    }

    #[test]
    fn upstream_failure_installs_the_error_placeholder() {
        let mut session = ChatSession::new("Research");
        let prepared = session.submit("question").unwrap();

        session.apply_event(
            prepared.placeholder_id,
            TurnEvent::TextDelta("partial text".to_string()),
        );
        session.apply_event(prepared.placeholder_id, failed(FailureKind::Upstream));

        let placeholder = session.transcript().get(prepared.placeholder_id).unwrap();
        assert_eq!(placeholder.text, ERROR_PLACEHOLDER_TEXT);
        assert!(placeholder.sources.is_empty());
        assert!(!session.transcript().is_pending());
        assert_eq!(session.turn_state(), TurnState::Failed(FailureKind::Upstream));

        assert!(session.submit("retry question").is_ok());
    }

    #[test]
    fn cancellation_keeps_partial_text() {
        let mut session = ChatSession::new("Research");
        let prepared = session.submit("question").unwrap();

        session.apply_event(
            prepared.placeholder_id,
            TurnEvent::TextDelta("partial ".to_string()),
        );
        session.apply_event(prepared.placeholder_id, failed(FailureKind::Cancelled));

        let placeholder = session.transcript().get(prepared.placeholder_id).unwrap();
        assert_eq!(placeholder.text, "partial ");
        assert!(!session.transcript().is_pending());
        assert_eq!(
            session.turn_state(),
            TurnState::Failed(FailureKind::Cancelled)
        );
    }

    #[test]
    fn events_after_the_terminal_state_are_dropped() {
        let mut session = ChatSession::new("Research");
        let prepared = session.submit("question").unwrap();

        session.apply_event(prepared.placeholder_id, completed("done", Vec::new()));
        let after_completion = session.transcript().clone();

        session.apply_event(
            prepared.placeholder_id,
            TurnEvent::TextDelta("late chunk".to_string()),
        );
        session.apply_event(prepared.placeholder_id, failed(FailureKind::Upstream));

        assert_eq!(session.transcript(), &after_completion);
        assert_eq!(session.turn_state(), TurnState::Completed);
    }

    #[test]
    fn events_for_an_unknown_placeholder_change_nothing() {
        let mut session = ChatSession::new("Research");
        let prepared = session.submit("question").unwrap();
        let before = session.transcript().clone();

        let foreign = MessageId::new_v7();
        session.apply_event(foreign, TurnEvent::TextDelta("stray".to_string()));
        session.apply_event(foreign, completed("stray done", Vec::new()));

        // Neither the lifecycle nor the transcript moved.
        assert_eq!(session.turn_state(), TurnState::Sending);
        assert!(session.transcript().is_pending());
        assert_eq!(session.transcript(), &before);

        // The real placeholder still completes normally afterwards.
        session.apply_event(prepared.placeholder_id, completed("done", Vec::new()));
        assert_eq!(session.turn_state(), TurnState::Completed);
        assert!(!session.transcript().is_pending());
    }

    #[test]
    fn submissions_update_the_last_updated_stamp() {
        let mut session = ChatSession::new("Research");
        let created_at = session.last_updated_unix_millis();

        session.submit("question").unwrap();
        assert!(session.last_updated_unix_millis() >= created_at);
    }
}
