#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;

use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::FrameDecoder;
use super::RenderThrottle;
use crate::domain::models::ChatError;
use crate::domain::models::ErrorCategory;
use crate::domain::models::ProtocolEvent;
use crate::domain::models::RelayRequest;
use crate::domain::models::SessionState;
use crate::domain::models::Transport;

/// Receives the text of an assistant message whenever the throttle lets an
/// update through.
pub trait RenderSink: Send + Sync {
    fn publish(&self, message_id: &str, text: &str);
}

/// One request/response cycle against the relay.
///
/// Drives the transport's byte stream through the frame decoder and event
/// interpreter, accumulating content and publishing it through the render
/// throttle. Cancellation is cooperative: every await races the token, and
/// the token is checked again before a received line is applied, so nothing
/// that arrives after `cancel()` reaches the accumulated text.
pub struct GenerationSession {
    message_id: String,
    state: SessionState,
    accumulated: String,
    throttle: RenderThrottle,
    cancel: CancellationToken,
}

impl GenerationSession {
    pub fn new(
        message_id: &str,
        render_interval: Duration,
        cancel: CancellationToken,
    ) -> GenerationSession {
        return GenerationSession {
            message_id: message_id.to_string(),
            state: SessionState::Idle,
            accumulated: "".to_string(),
            throttle: RenderThrottle::new(render_interval),
            cancel,
        };
    }

    pub fn state(&self) -> SessionState {
        return self.state;
    }

    pub fn text(&self) -> &str {
        return &self.accumulated;
    }

    pub async fn run(
        &mut self,
        transport: &dyn Transport,
        request: &RelayRequest,
        credential: &str,
        sink: &dyn RenderSink,
    ) -> Result<(), ChatError> {
        let cancel = self.cancel.clone();
        self.state = SessionState::Opening;
        tracing::debug!(message_id = self.message_id, "Opening generation session");

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = transport.open(request, credential) => Some(res),
        };

        let stream = match opened {
            None => return self.canceled(),
            Some(Err(err)) => return self.fail(err, sink),
            Some(Ok(stream)) => stream,
        };
        if cancel.is_cancelled() {
            return self.canceled();
        }

        self.state = SessionState::Streaming;
        let mut lines = FrameDecoder::lines(stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                line = lines.next() => Some(line),
            };

            let line = match next {
                None => return self.canceled(),
                Some(None) => break,
                Some(Some(Err(err))) => {
                    return self.fail(ChatError::Transport(err.to_string()), sink);
                }
                Some(Some(Ok(line))) => line,
            };

            // A line can already be in hand when the token flips.
            if cancel.is_cancelled() {
                return self.canceled();
            }

            match ProtocolEvent::from_line(&line) {
                Ok(None) => continue,
                Ok(Some(ProtocolEvent::Content(text))) => {
                    if text.is_empty() {
                        continue;
                    }

                    self.accumulated.push_str(&text);
                    if self.throttle.offer(Instant::now()) {
                        sink.publish(&self.message_id, &self.accumulated);
                    }
                }
                Ok(Some(ProtocolEvent::Error(message))) => {
                    let message = ErrorCategory::user_message(&message);
                    return self.fail(ChatError::Protocol(message), sink);
                }
                Ok(Some(ProtocolEvent::Done)) => break,
                Err(err) => {
                    tracing::warn!(message_id = self.message_id, error = %err, "Dropping undecodable event");
                }
            }
        }

        // Release the transport before the final publish.
        drop(lines);

        self.throttle.finish(Instant::now());
        sink.publish(&self.message_id, &self.accumulated);
        self.state = SessionState::Completed;
        tracing::debug!(
            message_id = self.message_id,
            length = self.accumulated.len(),
            "Generation session completed"
        );

        return Ok(());
    }

    /// Ends the session with an error. The notice takes the place of any
    /// partial answer.
    pub fn fail(&mut self, err: ChatError, sink: &dyn RenderSink) -> Result<(), ChatError> {
        tracing::error!(
            message_id = self.message_id,
            discarded = self.accumulated.len(),
            error = %err,
            "Generation session failed"
        );
        self.state = SessionState::Errored;

        let notice = err.notice().unwrap_or_default();
        self.throttle.finish(Instant::now());
        sink.publish(&self.message_id, &notice);

        return Err(err);
    }

    fn canceled(&mut self) -> Result<(), ChatError> {
        tracing::debug!(message_id = self.message_id, "Generation session canceled");
        self.state = SessionState::Canceled;
        return Err(ChatError::Canceled);
    }
}
