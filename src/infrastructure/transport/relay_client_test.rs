use anyhow::Result;
use futures::StreamExt;
use mockito::Matcher;

use super::RelayClient;
use crate::domain::models::ChatError;
use crate::domain::models::Message;
use crate::domain::models::RelayRequest;
use crate::domain::models::Role;
use crate::domain::models::Transport;

fn request() -> RelayRequest {
    return RelayRequest::from_history(&[Message::new(Role::User, "Hi")], 12, false);
}

async fn open_err(client: &RelayClient) -> ChatError {
    match client.open(&request(), "credential").await {
        Ok(_) => panic!("expected the relay to refuse"),
        Err(err) => return err,
    }
}

#[tokio::test]
async fn it_logs_in() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/auth")
        .match_body(Matcher::Json(serde_json::json!({ "password": "hunter2" })))
        .with_status(200)
        .with_body(r#"{"token":"abc"}"#)
        .create_async()
        .await;

    let client = RelayClient::new(&format!("{}/", server.url()));
    assert_eq!(client.login("hunter2").await?, "abc");
    mock.assert_async().await;

    return Ok(());
}

#[tokio::test]
async fn it_reports_login_failures() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/auth")
        .with_status(401)
        .with_body(r#"{"error":"Invalid password"}"#)
        .create_async()
        .await;

    let client = RelayClient::new(&server.url());
    let err = client.login("wrong").await.unwrap_err();
    mock.assert_async().await;

    assert_eq!(err.to_string(), "Invalid password");
}

#[tokio::test]
async fn it_streams_the_response_body() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .match_header("authorization", "Bearer credential")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "messages": [{ "role": "user", "content": "Hi" }],
            "searchEnabled": false,
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(test_utils::relay_sse_fixture())
        .create_async()
        .await;

    let client = RelayClient::new(&server.url());
    let mut stream = client.open(&request(), "credential").await?;

    let mut body = vec![];
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    mock.assert_async().await;

    assert_eq!(String::from_utf8(body)?, test_utils::relay_sse_fixture());

    return Ok(());
}

#[tokio::test]
async fn it_maps_refused_credentials_to_auth_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(401)
        .with_body("Unauthorized")
        .create_async()
        .await;

    let client = RelayClient::new(&server.url());
    assert!(matches!(open_err(&client).await, ChatError::Auth));
}

#[tokio::test]
async fn it_keeps_other_401s_as_transport_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(401)
        .with_body(r#"{"error":"The provider rejected the API key, check the relay configuration."}"#)
        .create_async()
        .await;

    let client = RelayClient::new(&server.url());
    match open_err(&client).await {
        ChatError::Transport(message) => {
            assert_eq!(
                message,
                "The provider rejected the API key, check the relay configuration."
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn it_falls_back_to_the_status_code() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let client = RelayClient::new(&server.url());
    match open_err(&client).await {
        ChatError::Transport(message) => assert_eq!(message, "Request failed (502)"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn it_fails_when_the_relay_is_unreachable() {
    let client = RelayClient::new("http://127.0.0.1:1");
    assert!(matches!(open_err(&client).await, ChatError::Transport(_)));
}
