use futures::StreamExt;

use super::reencode;
use super::PrestreamFailure;
use super::INTERNAL_ERROR_MESSAGE;
use super::INVALID_API_KEY_MESSAGE;
use super::MODEL_NOT_FOUND_MESSAGE;
use crate::domain::models::ProtocolEvent;
use crate::domain::models::ProviderError;
use crate::domain::models::ProviderStream;
use crate::domain::models::RATE_LIMIT_MESSAGE;
use crate::domain::models::SAFETY_BLOCK_MESSAGE;

fn fragments(items: Vec<Result<&str, ProviderError>>) -> ProviderStream {
    let items = items
        .into_iter()
        .map(|item| return item.map(|text| return text.to_string()))
        .collect::<Vec<Result<String, ProviderError>>>();

    return Box::pin(futures::stream::iter(items));
}

async fn frames(stream: ProviderStream) -> String {
    return reencode(stream)
        .map(|event| return format!("data: {}\n\n", event.payload()))
        .collect::<Vec<String>>()
        .await
        .join("");
}

#[tokio::test]
async fn it_reencodes_fragments_and_completion() {
    let res = frames(fragments(vec![Ok("Hel"), Ok(""), Ok("lo \"world\"")])).await;
    assert_eq!(
        res,
        "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo \\\"world\\\"\"}\n\ndata: [DONE]\n\n"
    );
}

#[tokio::test]
async fn it_ends_with_a_classified_error() {
    let events = reencode(fragments(vec![
        Ok("Sure"),
        Err(ProviderError::new(None, "Candidate was blocked due to SAFETY")),
        Ok("never sent"),
    ]))
    .collect::<Vec<ProtocolEvent>>()
    .await;

    assert_eq!(
        events,
        vec![
            ProtocolEvent::Content("Sure".to_string()),
            ProtocolEvent::Error(SAFETY_BLOCK_MESSAGE.to_string()),
        ]
    );
}

#[tokio::test]
async fn it_classifies_midstream_rate_limits() {
    let events = reencode(fragments(vec![Err(ProviderError::new(
        None,
        "{\"error\":{\"code\":429,\"status\":\"RESOURCE_EXHAUSTED\"}}",
    ))]))
    .collect::<Vec<ProtocolEvent>>()
    .await;

    assert_eq!(events, vec![ProtocolEvent::Error(RATE_LIMIT_MESSAGE.to_string())]);
}

#[tokio::test]
async fn it_completes_an_empty_stream() {
    let events = reencode(fragments(vec![]))
        .collect::<Vec<ProtocolEvent>>()
        .await;
    assert_eq!(events, vec![ProtocolEvent::Done]);
}

#[test]
fn it_classifies_prestream_failures() {
    let cases = vec![
        (ProviderError::new(Some(429), "Too Many Requests"), 429, RATE_LIMIT_MESSAGE),
        (
            ProviderError::new(Some(400), "API key not valid. Please pass a valid API key."),
            401,
            INVALID_API_KEY_MESSAGE,
        ),
        (ProviderError::new(Some(403), "Forbidden"), 401, INVALID_API_KEY_MESSAGE),
        (
            ProviderError::new(Some(404), "models/unknown is not found"),
            404,
            MODEL_NOT_FOUND_MESSAGE,
        ),
        (
            ProviderError::new(None, "error sending request"),
            500,
            INTERNAL_ERROR_MESSAGE,
        ),
    ];

    for (err, status, message) in cases {
        let failure = PrestreamFailure::classify(&err);
        assert_eq!(failure.status, status, "{err}");
        assert_eq!(failure.message, message, "{err}");
    }
}
