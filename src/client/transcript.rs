use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }
}

/// Ordered conversation. Messages are never removed.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new message and returns its id.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> String {
        let message = ChatMessage::new(role, content);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Replaces the message with the same id in place, or appends it.
    pub fn upsert(&mut self, message: ChatMessage) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => *slot = message,
            None => self.messages.push(message),
        }
    }

    /// Appends `delta` to the content of message `id`. Returns false when no
    /// such message exists.
    pub fn append_content(&mut self, id: &str, delta: &str) -> bool {
        let Some(current) = self.get(id) else {
            return false;
        };
        let mut updated = current.clone();
        updated.content.push_str(delta);
        self.upsert(updated);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
