#[cfg(test)]
#[path = "relay_client_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::AuthRequest;
use crate::domain::models::AuthResponse;
use crate::domain::models::ByteStream;
use crate::domain::models::ChatError;
use crate::domain::models::ErrorResponse;
use crate::domain::models::RelayRequest;
use crate::domain::models::Transport;
use crate::domain::models::UNAUTHORIZED_BODY;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

/// Talks to the relay over HTTP.
pub struct RelayClient {
    url: String,
    client: reqwest::Client,
}

impl Default for RelayClient {
    fn default() -> RelayClient {
        return RelayClient::new(&Config::get(ConfigKey::RelayURL));
    }
}

impl RelayClient {
    pub fn new(url: &str) -> RelayClient {
        return RelayClient {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        };
    }

    /// Exchanges the shared password for a credential.
    pub async fn login(&self, password: &str) -> Result<String> {
        let res = self
            .client
            .post(format!("{url}/api/auth", url = self.url))
            .json(&AuthRequest {
                password: password.to_string(),
            })
            .send()
            .await;

        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, "Relay is not reachable");
                bail!(format!("Relay at {} is not reachable", self.url));
            }
        };

        let status = res.status();
        if status.is_success() {
            let body = res.json::<AuthResponse>().await?;
            return Ok(body.token);
        }

        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|res| return res.error)
            .unwrap_or_else(|_| return format!("Request failed ({})", status.as_u16()));

        tracing::warn!(status = status.as_u16(), message = message, "Login failed");
        bail!(message);
    }
}

#[async_trait]
impl Transport for RelayClient {
    #[allow(clippy::implicit_return)]
    async fn open(&self, request: &RelayRequest, credential: &str) -> Result<ByteStream, ChatError> {
        let res = self
            .client
            .post(format!("{url}/api/chat", url = self.url))
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "Relay is not reachable");
                return ChatError::Transport(format!("Relay is not reachable: {err}"));
            })?;

        let status = res.status();
        if status.is_success() {
            return Ok(Box::pin(res.bytes_stream().map_err(convert_err)));
        }

        let body = res.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED && body == UNAUTHORIZED_BODY {
            return Err(ChatError::Auth);
        }

        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|res| return res.error)
            .unwrap_or_else(|_| return format!("Request failed ({})", status.as_u16()));

        tracing::error!(status = status.as_u16(), message = message, "Relay refused the request");
        return Err(ChatError::Transport(message));
    }
}
