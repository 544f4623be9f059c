#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::ChatError;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_MARKER: &str = "[DONE]";

/// One semantic unit of the relay's event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    Content(String),
    Error(String),
    Done,
}

// Error is listed first so a payload carrying both fields is treated as an
// error.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Payload {
    Error { error: String },
    Content { content: String },
}

impl ProtocolEvent {
    /// Interprets one complete line of the stream. Lines without the `data: `
    /// prefix carry no event and yield `Ok(None)`. Payloads that are neither
    /// the end marker nor a known JSON shape are a `ChatError::Decode`.
    pub fn from_line(line: &str) -> Result<Option<ProtocolEvent>, ChatError> {
        let payload = match line.strip_prefix(DATA_PREFIX) {
            Some(payload) => payload.trim(),
            None => return Ok(None),
        };

        if payload == DONE_MARKER {
            return Ok(Some(ProtocolEvent::Done));
        }

        let parsed: Payload = serde_json::from_str(payload)
            .map_err(|err| return ChatError::Decode(format!("{err}: {payload}")))?;

        let event = match parsed {
            Payload::Error { error } => ProtocolEvent::Error(error),
            Payload::Content { content } => ProtocolEvent::Content(content),
        };

        return Ok(Some(event));
    }

    /// Payload as carried after the `data: ` prefix.
    pub fn payload(&self) -> String {
        let payload = match self {
            ProtocolEvent::Done => return DONE_MARKER.to_string(),
            ProtocolEvent::Content(content) => Payload::Content {
                content: content.to_string(),
            },
            ProtocolEvent::Error(error) => Payload::Error {
                error: error.to_string(),
            },
        };

        // Serializing a struct of plain strings can't fail.
        return serde_json::to_string(&payload).unwrap_or_default();
    }

    pub fn is_terminal(&self) -> bool {
        return matches!(self, ProtocolEvent::Error(_) | ProtocolEvent::Done);
    }
}
