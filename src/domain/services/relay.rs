#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;

use futures::stream;
use futures::Stream;
use futures::StreamExt;

use crate::domain::models::ErrorCategory;
use crate::domain::models::ProtocolEvent;
use crate::domain::models::ProviderError;
use crate::domain::models::ProviderStream;

pub const INVALID_API_KEY_MESSAGE: &str =
    "The provider rejected the API key, check the relay configuration.";
pub const MODEL_NOT_FOUND_MESSAGE: &str =
    "The configured model was not found, check the relay configuration.";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Status and message answered when the provider fails before streaming.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrestreamFailure {
    pub status: u16,
    pub message: String,
}

impl PrestreamFailure {
    pub fn classify(err: &ProviderError) -> PrestreamFailure {
        let message = &err.message;
        let lowered = message.to_lowercase();

        if err.status == Some(429) || ErrorCategory::classify(message) == ErrorCategory::RateLimit {
            return PrestreamFailure::new(429, ErrorCategory::RateLimit.message());
        }

        if matches!(err.status, Some(401) | Some(403)) || lowered.contains("api key not valid") {
            return PrestreamFailure::new(401, INVALID_API_KEY_MESSAGE);
        }

        if err.status == Some(404) || lowered.contains("model not found") {
            return PrestreamFailure::new(404, MODEL_NOT_FOUND_MESSAGE);
        }

        return PrestreamFailure::new(500, INTERNAL_ERROR_MESSAGE);
    }

    fn new(status: u16, message: &str) -> PrestreamFailure {
        return PrestreamFailure {
            status,
            message: message.to_string(),
        };
    }
}

/// Message sent in the `error` event when the provider fails mid-stream.
pub fn midstream_message(err: &ProviderError) -> String {
    let category = ErrorCategory::classify(&err.to_string());
    if category == ErrorCategory::Generic {
        tracing::debug!(error = %err, "Unclassified provider failure");
    }

    return category.message().to_string();
}

/// Turns provider fragments into the relay's event stream: one `Content` per
/// non-empty fragment, then `Done`, or a classified `Error` on the first
/// failure. Nothing follows the terminal event.
pub fn reencode(fragments: ProviderStream) -> impl Stream<Item = ProtocolEvent> + Send {
    return stream::unfold(Some(fragments), |state| async move {
        let mut fragments = state?;

        loop {
            let event = match fragments.next().await {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => ProtocolEvent::Content(text),
                Some(Err(err)) => {
                    tracing::error!(error = %err, "Provider failed mid-stream");
                    ProtocolEvent::Error(midstream_message(&err))
                }
                None => ProtocolEvent::Done,
            };

            if event.is_terminal() {
                return Some((event, None));
            }
            return Some((event, Some(fragments)));
        }
    });
}
