use std::env;
use std::io;
use std::path;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

pub type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Streams the given chunks in order, the way a response body arrives.
pub fn chunk_stream(chunks: &[&str]) -> ChunkStream {
    let chunks = chunks
        .iter()
        .map(|chunk| return Ok(Bytes::from(chunk.to_string())))
        .collect::<Vec<io::Result<Bytes>>>();

    return Box::pin(futures::stream::iter(chunks));
}

/// Streams the given chunks, then fails as if the connection dropped.
pub fn broken_chunk_stream(chunks: &[&str]) -> ChunkStream {
    let mut items = chunks
        .iter()
        .map(|chunk| return Ok(Bytes::from(chunk.to_string())))
        .collect::<Vec<io::Result<Bytes>>>();
    items.push(Err(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    )));

    return Box::pin(futures::stream::iter(items));
}

/// Fresh directory path under the system temp dir. Not created.
pub fn temp_dir(prefix: &str) -> path::PathBuf {
    return env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4()));
}

/// Relay stream that answers "Hello world".
pub fn relay_sse_fixture() -> &'static str {
    return "data: {\"content\":\"Hello\"}\n\ndata: {\"content\":\" world\"}\n\ndata: [DONE]\n\n";
}

/// Upstream Gemini stream in `alt=sse` framing, answering "Hello world".
pub fn gemini_sse_fixture() -> &'static str {
    return r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"},"index":0}],"modelVersion":"gemini-2.0-flash-exp"}

data: {"candidates":[{"content":{"parts":[{"text":" world"}],"role":"model"},"finishReason":"STOP","index":0}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2,"totalTokenCount":6}}

"#;
}

/// Upstream Gemini stream that starts answering, then gets blocked.
pub fn gemini_blocked_sse_fixture() -> &'static str {
    return r#"data: {"candidates":[{"content":{"parts":[{"text":"Sure"}],"role":"model"},"index":0}]}

data: {"candidates":[{"finishReason":"SAFETY","index":0,"safetyRatings":[{"category":"HARM_CATEGORY_DANGEROUS_CONTENT","probability":"HIGH"}]}]}

"#;
}
