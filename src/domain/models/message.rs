#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::Utc;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub timestamp: i64,
}

pub fn create_id() -> String {
    return Uuid::new_v4().to_string();
}

impl Message {
    pub fn new(role: Role, content: &str) -> Message {
        return Message {
            id: create_id(),
            role,
            content: content.to_string(),
            images: vec![],
            timestamp: Utc::now().timestamp_millis(),
        };
    }

    pub fn user(content: &str, images: Vec<String>) -> Message {
        let mut message = Message::new(Role::User, content);
        message.images = images;
        return message;
    }

    /// Empty assistant message that a generation session streams into.
    pub fn placeholder() -> Message {
        return Message::new(Role::Assistant, "");
    }

    pub fn is_placeholder(&self) -> bool {
        return self.role == Role::Assistant && self.content.is_empty();
    }
}

/// Ordered chat history. Insertion order is chronological order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn len(&self) -> usize {
        return self.messages.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.messages.is_empty();
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        return self.messages.iter().find(|message| return message.id == id);
    }

    /// Replaces the content of a single message. Returns false when the id is
    /// unknown, which happens when the transcript was cleared mid-stream.
    pub fn set_content(&mut self, id: &str, content: &str) -> bool {
        if let Some(message) = self.messages.iter_mut().find(|message| return message.id == id) {
            message.content = content.to_string();
            return true;
        }

        return false;
    }

    pub fn remove(&mut self, id: &str) {
        self.messages.retain(|message| return message.id != id);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Index of the most recent user message.
    pub fn last_user_index(&self) -> Option<usize> {
        return self
            .messages
            .iter()
            .rposition(|message| return message.role == Role::User);
    }
}
