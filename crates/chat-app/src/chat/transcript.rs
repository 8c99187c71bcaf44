use super::message::{Message, MessageId, MessagePatch, Role};

/// Ordered message log plus the single-submission gate for one session.
///
/// Appends always succeed and ordering is insertion order. In-place updates
/// target a message by ID and leave its position untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
    pending: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Merges `patch` into the message with `id`. Returns false when no such
    /// message exists, leaving the transcript unchanged.
    pub fn update_message(&mut self, id: MessageId, patch: MessagePatch) -> bool {
        let Some(message) = self.messages.iter_mut().find(|message| message.id == id) else {
            return false;
        };

        if let Some(text) = patch.text {
            message.text = text;
        }
        if let Some(sources) = patch.sources {
            message.sources = sources;
        }
        true
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// True while a submission is pending and its model placeholder has not
    /// received any text yet. This is the "thinking" indicator state.
    pub fn awaiting_first_chunk(&self) -> bool {
        self.pending
            && self
                .messages
                .last()
                .is_some_and(|message| message.role == Role::Model && message.text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Source;

    #[test]
    fn append_preserves_insertion_order() {
        let mut transcript = Transcript::new();
        let first = Message::user("first");
        let second = Message::model("second");
        let third = Message::user("");

        transcript.append(first.clone());
        transcript.append(second.clone());
        transcript.append(third.clone());

        let ids: Vec<_> = transcript.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn update_merges_patched_fields_and_keeps_position() {
        let mut transcript = Transcript::new();
        transcript.append(Message::user("question"));
        let placeholder = Message::model_placeholder();
        let placeholder_id = placeholder.id;
        transcript.append(placeholder);
        transcript.append(Message::user("follow-up"));

        assert!(transcript.update_message(placeholder_id, MessagePatch::text("partial answer")));

        let updated = transcript.get(placeholder_id).unwrap();
        assert_eq!(updated.text, "partial answer");
        assert!(updated.sources.is_empty());
        assert_eq!(transcript.messages()[1].id, placeholder_id);

        let sources = vec![Source::new("https://example.org", "Example")];
        assert!(
            transcript
                .update_message(placeholder_id, MessagePatch::default().with_sources(sources))
        );
        let updated = transcript.get(placeholder_id).unwrap();
        assert_eq!(updated.text, "partial answer");
        assert_eq!(updated.sources.len(), 1);
    }

    #[test]
    fn update_for_unknown_id_is_a_noop() {
        let mut transcript = Transcript::new();
        transcript.append(Message::user("only"));
        let before = transcript.clone();

        assert!(!transcript.update_message(MessageId::new_v7(), MessagePatch::text("ghost")));
        assert_eq!(transcript, before);
    }

    #[test]
    fn awaiting_first_chunk_tracks_pending_placeholder() {
        let mut transcript = Transcript::new();
        assert!(!transcript.awaiting_first_chunk());

        transcript.append(Message::user("question"));
        transcript.set_pending(true);
        // Pending but the latest message is the user's, not a placeholder.
        assert!(!transcript.awaiting_first_chunk());

        let placeholder = Message::model_placeholder();
        let placeholder_id = placeholder.id;
        transcript.append(placeholder);
        assert!(transcript.awaiting_first_chunk());

        transcript.update_message(placeholder_id, MessagePatch::text("first delta"));
        assert!(!transcript.awaiting_first_chunk());

        transcript.set_pending(false);
        assert!(!transcript.awaiting_first_chunk());
    }
}
