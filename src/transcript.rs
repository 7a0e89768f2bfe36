use std::sync::{Arc, Mutex};

use nexspice_types::{ChatMessage, MessageId, Role};

/// Handle shared between the chat session, the voice session, and UI reads.
pub type SharedTranscript = Arc<Mutex<Transcript>>;

/// The ordered, append-only conversation history. Entries are never edited
/// or removed once appended; ids come from a counter so two entries minted
/// in the same instant cannot collide.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTranscript {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) -> MessageId {
        let id = MessageId::new(self.next_id);
        self.next_id += 1;
        self.entries.push(ChatMessage::new(id, role, text.into()));
        id
    }

    /// Appends a finished voice exchange: the user entry, then the model
    /// entry, in one call so no reader can observe the pair half-written.
    pub fn push_turn(&mut self, user_text: impl Into<String>, model_text: impl Into<String>) -> (MessageId, MessageId) {
        let user = self.push(Role::User, user_text);
        let model = self.push(Role::Model, model_text);
        (user, model)
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.last()
    }
}
