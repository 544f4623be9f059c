#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use thiserror::Error;

pub const RATE_LIMIT_MESSAGE: &str =
    "The API quota has been reached, please try again tomorrow.";
pub const SAFETY_BLOCK_MESSAGE: &str =
    "The response was blocked by the content safety policy, please try another topic.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while generating a response.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired, please log in again.";

/// Failures of a generation session, as seen by the client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Network failure, or a non-2xx answer before streaming started.
    #[error("{0}")]
    Transport(String),

    /// An `error` event received mid-stream. Holds the user facing message.
    #[error("{0}")]
    Protocol(String),

    /// A payload that isn't one of the known event shapes. Never terminal.
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    /// The relay refused the stored credential.
    #[error("Unauthorized")]
    Auth,

    /// User initiated abort.
    #[error("Generation canceled")]
    Canceled,
}

impl ChatError {
    /// Text placed in the assistant message when a session ends with this
    /// error. Cancellation and decode errors never reach the transcript.
    pub fn notice(&self) -> Option<String> {
        match self {
            ChatError::Transport(msg) | ChatError::Protocol(msg) => {
                return Some(format!("⚠️ Error: {msg}"));
            }
            ChatError::Auth => return Some(format!("⚠️ {SESSION_EXPIRED_MESSAGE}")),
            ChatError::Decode(_) | ChatError::Canceled => return None,
        }
    }
}

/// User facing buckets for provider failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCategory {
    RateLimit,
    SafetyBlock,
    Generic,
}

impl ErrorCategory {
    /// Buckets a raw error message by the markers providers put in them.
    pub fn classify(raw: &str) -> ErrorCategory {
        let lowered = raw.to_lowercase();
        if raw.contains("429")
            || raw.contains("RESOURCE_EXHAUSTED")
            || lowered.contains("quota")
            || lowered.contains("rate limit")
        {
            return ErrorCategory::RateLimit;
        }

        if lowered.contains("safety") {
            return ErrorCategory::SafetyBlock;
        }

        return ErrorCategory::Generic;
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => return RATE_LIMIT_MESSAGE,
            ErrorCategory::SafetyBlock => return SAFETY_BLOCK_MESSAGE,
            ErrorCategory::Generic => return GENERIC_FAILURE_MESSAGE,
        }
    }

    /// Message shown for an `error` event. Generic errors keep the relay's
    /// own wording since it is already meant for users.
    pub fn user_message(raw: &str) -> String {
        let category = ErrorCategory::classify(raw);
        if category == ErrorCategory::Generic && !raw.trim().is_empty() {
            return raw.to_string();
        }

        return category.message().to_string();
    }
}
