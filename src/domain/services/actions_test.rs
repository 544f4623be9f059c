use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use test_utils::chunk_stream;
use tokio::sync::mpsc;

use super::help_text;
use super::ActionsService;
use crate::domain::models::Action;
use crate::domain::models::ByteStream;
use crate::domain::models::ChatError;
use crate::domain::models::Event;
use crate::domain::models::RelayRequest;
use crate::domain::models::Scope;
use crate::domain::models::SessionState;
use crate::domain::models::Store;
use crate::domain::models::StoreKey;
use crate::domain::models::Transcript;
use crate::domain::models::Transport;
use crate::domain::services::AppContext;
use crate::domain::services::Conversation;
use crate::domain::services::ConversationSettings;
use crate::infrastructure::store::LocalStore;

struct FixtureTransport {
    opened: Mutex<usize>,
}

#[async_trait]
impl Transport for FixtureTransport {
    #[allow(clippy::implicit_return)]
    async fn open(&self, _request: &RelayRequest, _credential: &str) -> Result<ByteStream, ChatError> {
        *self.opened.lock().unwrap() += 1;
        return Ok(chunk_stream(&[test_utils::relay_sse_fixture()]));
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    return tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn it_runs_actions_against_the_conversation() -> Result<()> {
    let store = Arc::new(LocalStore::new(test_utils::temp_dir("tyren-actions")));
    store
        .set(StoreKey::AuthToken, "credential", Scope::Session)
        .await?;
    let context = AppContext {
        store: store.clone(),
        transcript: Transcript::default(),
        search_enabled: false,
        credential: Some("credential".to_string()),
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let transport = Arc::new(FixtureTransport {
        opened: Mutex::new(0),
    });
    let conversation = Arc::new(Conversation::new(
        context,
        transport.clone(),
        event_tx.clone(),
        ConversationSettings::default(),
    ));

    let service_conversation = conversation.clone();
    let service = tokio::spawn(async move {
        return ActionsService::start(service_conversation, event_tx, &mut action_rx).await;
    });

    action_tx.send(Action::Cancel())?;
    assert_eq!(
        next_event(&mut event_rx).await,
        Event::Notice("Nothing to stop.".to_string())
    );

    action_tx.send(Action::ToggleSearch())?;
    assert_eq!(
        next_event(&mut event_rx).await,
        Event::Notice("Web search enabled.".to_string())
    );

    action_tx.send(Action::Send("Hi".to_string(), vec![]))?;
    loop {
        if let Event::GenerationFinished { state, .. } = next_event(&mut event_rx).await {
            assert_eq!(state, SessionState::Completed);
            break;
        }
    }
    assert_eq!(conversation.transcript().messages[1].content, "Hello world");
    assert_eq!(*transport.opened.lock().unwrap(), 1);

    action_tx.send(Action::Clear())?;
    assert_eq!(
        next_event(&mut event_rx).await,
        Event::Notice("Chat history cleared.".to_string())
    );

    action_tx.send(Action::Retry())?;
    assert_eq!(
        next_event(&mut event_rx).await,
        Event::Notice("There is no message to retry.".to_string())
    );

    action_tx.send(Action::Logout())?;
    assert_eq!(next_event(&mut event_rx).await, Event::LoggedOut());
    assert_eq!(store.get(StoreKey::AuthToken).await?, None);

    drop(action_tx);
    service.await??;

    return Ok(());
}

#[test]
fn it_lists_every_command_in_help() {
    let text = help_text();
    for command in ["/image", "/retry", "/stop", "/search", "/clear", "/logout", "/quit", "/help"] {
        assert!(text.contains(command), "{command} missing from help");
    }
}
