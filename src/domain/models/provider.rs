use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use super::RelayRequest;

/// Failure reported by, or while talking to, the upstream model provider.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status of the upstream answer, when it got that far.
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: Option<u16>, message: &str) -> ProviderError {
        return ProviderError {
            status,
            message: message.to_string(),
        };
    }
}

/// Text fragments in generation order. An `Err` item ends the stream.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Starts a streaming generation for the conversation. Resolves once the
    /// provider accepted the request, so failures that happen before any
    /// text is produced come back as `Err` here rather than in the stream.
    async fn stream(&self, request: &RelayRequest) -> Result<ProviderStream, ProviderError>;
}
