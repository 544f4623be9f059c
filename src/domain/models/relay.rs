#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Message;
use super::Role;

pub const DEFAULT_HISTORY_WINDOW: usize = 12;

/// Exact body the relay answers with when a credential is refused.
pub const UNAUTHORIZED_BODY: &str = "Unauthorized";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl From<&Message> for RelayMessage {
    fn from(message: &Message) -> RelayMessage {
        return RelayMessage {
            role: message.role,
            content: message.content.to_string(),
            images: message.images.clone(),
        };
    }
}

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub messages: Vec<RelayMessage>,
    #[serde(default)]
    pub search_enabled: bool,
}

impl RelayRequest {
    pub fn from_history(history: &[Message], window: usize, search_enabled: bool) -> RelayRequest {
        // Answers that never received text are not turns the model accepts.
        let messages = history
            .iter()
            .filter(|message| {
                return message.role == Role::User || !message.content.trim().is_empty();
            })
            .map(RelayMessage::from)
            .collect();

        return RelayRequest {
            messages,
            search_enabled,
        }
        .windowed(window);
    }

    /// Keeps the most recent `window` messages and drops attachments from
    /// everything but the last one.
    pub fn windowed(mut self, window: usize) -> RelayRequest {
        let window = window.max(1);
        if self.messages.len() > window {
            self.messages.drain(..self.messages.len() - window);
        }

        let last_idx = self.messages.len().saturating_sub(1);
        for (idx, message) in self.messages.iter_mut().enumerate() {
            if idx != last_idx {
                message.images.clear();
            }
        }

        return self;
    }
}

/// Body of `POST /api/auth`.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub password: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

/// JSON body of every relay failure except a refused credential.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
