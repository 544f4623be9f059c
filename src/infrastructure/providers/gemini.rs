#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use futures::stream::TryStreamExt;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ByteStream;
use crate::domain::models::Provider;
use crate::domain::models::ProviderError;
use crate::domain::models::ProviderStream;
use crate::domain::models::RelayMessage;
use crate::domain::models::RelayRequest;
use crate::domain::models::Role;
use crate::domain::services::FrameDecoder;
use crate::domain::services::LineStream;

const MAX_OUTPUT_TOKENS: u32 = 2048;
const IMAGE_ONLY_PROMPT: &str = "Describe this image.";

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPartsBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ContentParts {
    Text(String),
    InlineData(ContentPartsBlob),
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<ContentParts>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GoogleSearch {}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiError>,
}

/// Splits a `data:<mime>;base64,<data>` URI. Anything else is `None`.
fn parse_data_uri(uri: &str) -> Option<ContentPartsBlob> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    if mime_type.is_empty() || data.is_empty() {
        return None;
    }

    return Some(ContentPartsBlob {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    });
}

fn to_content(message: &RelayMessage) -> Content {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "model",
    };

    let mut text = message.content.to_string();
    if text.trim().is_empty() && !message.images.is_empty() {
        text = IMAGE_ONLY_PROMPT.to_string();
    }

    let mut parts = vec![ContentParts::Text(text)];
    for image in message.images.iter() {
        match parse_data_uri(image) {
            Some(blob) => parts.push(ContentParts::InlineData(blob)),
            None => tracing::warn!("Skipping attachment that isn't a base64 data URI"),
        }
    }

    return Content {
        role: role.to_string(),
        parts,
    };
}

fn to_completion_request(request: &RelayRequest) -> CompletionRequest {
    let mut tools = vec![];
    if request.search_enabled {
        tools.push(Tool::default());
    }

    return CompletionRequest {
        contents: request.messages.iter().map(to_content).collect(),
        tools,
        generation_config: GenerationConfig {
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    };
}

/// Text carried by one streamed chunk. Safety stops and API errors embedded
/// in the stream are failures.
fn parse_chunk(payload: &str) -> Result<Option<String>, ProviderError> {
    let res: GenerateContentResponse = serde_json::from_str(payload).map_err(|err| {
        return ProviderError::new(None, &format!("Unreadable Gemini chunk: {err}"));
    })?;

    if let Some(err) = res.error {
        return Err(ProviderError::new(
            Some(err.code),
            &format!("[{} {}] {}", err.code, err.status, err.message),
        ));
    }

    if let Some(reason) = res.prompt_feedback.and_then(|feedback| return feedback.block_reason) {
        return Err(ProviderError::new(
            None,
            &format!("Prompt was blocked due to {reason}"),
        ));
    }

    let candidate = match res.candidates.into_iter().next() {
        Some(candidate) => candidate,
        None => return Ok(None),
    };

    let text = candidate
        .content
        .map(|content| {
            return content
                .parts
                .into_iter()
                .filter_map(|part| return part.text)
                .collect::<Vec<String>>()
                .join("");
        })
        .unwrap_or_default();

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ProviderError::new(
            None,
            "Candidate was blocked due to SAFETY",
        ));
    }

    if text.is_empty() {
        return Ok(None);
    }

    return Ok(Some(text));
}

pub struct Gemini {
    url: String,
    token: String,
    model: String,
    client: reqwest::Client,
}

impl Default for Gemini {
    fn default() -> Gemini {
        return Gemini::new(
            &Config::get(ConfigKey::GeminiURL),
            &Config::get(ConfigKey::GeminiToken),
            &Config::get(ConfigKey::Model),
        );
    }
}

impl Gemini {
    pub fn new(url: &str, token: &str, model: &str) -> Gemini {
        let model = model.strip_prefix("models/").unwrap_or(model);

        return Gemini {
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        };
    }

    pub fn is_configured(&self) -> bool {
        return !self.token.is_empty();
    }

    /// Checks the configured model is reachable with the configured key.
    pub async fn health_check(&self, timeout: Duration) -> Result<()> {
        if self.url.is_empty() {
            bail!("Gemini URL is not defined");
        }
        if self.token.is_empty() {
            bail!("Gemini token is not defined");
        }

        let url = format!(
            "{url}/v1beta/models/{model}?key={key}",
            url = self.url,
            model = self.model,
            key = self.token
        );

        let res = self.client.get(&url).timeout(timeout).send().await;
        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, "Gemini is not reachable");
                bail!("Gemini is not reachable");
            }
        };

        let status = res.status().as_u16();
        if status >= 400 {
            tracing::error!(status = status, "Gemini health check failed");
            bail!(format!("Gemini health check failed with status {status}"));
        }

        return Ok(());
    }

    fn stream_fragments(lines: LineStream) -> ProviderStream {
        let fragments = stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;

            loop {
                let line = match lines.next().await {
                    None => return None,
                    Some(Err(err)) => {
                        let err = ProviderError::new(None, &err.to_string());
                        return Some((Err(err), None));
                    }
                    Some(Ok(line)) => line,
                };

                let payload = match line.strip_prefix("data:") {
                    Some(payload) => payload.trim(),
                    None => continue,
                };
                if payload.is_empty() {
                    continue;
                }

                match parse_chunk(payload) {
                    Ok(None) => continue,
                    Ok(Some(text)) => return Some((Ok(text), Some(lines))),
                    Err(err) => return Some((Err(err), None)),
                }
            }
        });

        return Box::pin(fragments);
    }
}

#[async_trait]
impl Provider for Gemini {
    #[allow(clippy::implicit_return)]
    async fn stream(&self, request: &RelayRequest) -> Result<ProviderStream, ProviderError> {
        let req = to_completion_request(request);

        let res = self
            .client
            .post(format!(
                "{url}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={key}",
                url = self.url,
                model = self.model,
                key = self.token,
            ))
            .json(&req)
            .send()
            .await
            .map_err(|err| return ProviderError::new(None, &err.to_string()))?;

        let status = res.status().as_u16();
        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(
                status = status,
                body = body,
                "Failed to make completion request to Gemini"
            );
            return Err(ProviderError::new(
                Some(status),
                &format!("Gemini request failed ({status}): {body}"),
            ));
        }

        let bytes: ByteStream = Box::pin(res.bytes_stream().map_err(convert_err));
        return Ok(Gemini::stream_fragments(FrameDecoder::lines(bytes)));
    }
}
