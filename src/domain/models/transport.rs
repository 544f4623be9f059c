use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use super::ChatError;
use super::RelayRequest;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a streaming call to the relay and returns the response body as
    /// raw chunks in arrival order. Dropping the stream aborts the request.
    ///
    /// Failures before the body starts are classified here: a rejected
    /// credential is `ChatError::Auth`, anything else `ChatError::Transport`.
    async fn open(&self, request: &RelayRequest, credential: &str) -> Result<ByteStream, ChatError>;
}
