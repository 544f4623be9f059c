#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::GenerationSession;
use super::RenderSink;
use super::TranscriptSaver;
use super::DEFAULT_RENDER_INTERVAL;
use super::DEFAULT_SAVE_DEBOUNCE;
use crate::domain::models::ChatError;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::RelayRequest;
use crate::domain::models::Scope;
use crate::domain::models::SessionState;
use crate::domain::models::Store;
use crate::domain::models::StoreKey;
use crate::domain::models::Transcript;
use crate::domain::models::Transport;
use crate::domain::models::DEFAULT_HISTORY_WINDOW;
use crate::domain::services::AppContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversationSettings {
    pub history_window: usize,
    pub render_interval: Duration,
    pub save_debounce: Duration,
}

impl Default for ConversationSettings {
    fn default() -> ConversationSettings {
        return ConversationSettings {
            history_window: DEFAULT_HISTORY_WINDOW,
            render_interval: DEFAULT_RENDER_INTERVAL,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
        };
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send.
    Ignored,
    /// Another session is still active.
    Rejected,
    Finished(SessionState),
}

fn lock_cancel(
    slot: &Mutex<Option<CancellationToken>>,
) -> MutexGuard<'_, Option<CancellationToken>> {
    return slot
        .lock()
        .unwrap_or_else(|poisoned| return poisoned.into_inner());
}

/// Holds the re-entrancy flag and the session's cancellation handle for the
/// lifetime of one session. Both change under the cancel lock, so `cancel()`
/// never sees a busy conversation without a token.
struct SendGuard<'a> {
    flag: &'a AtomicBool,
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl<'a> SendGuard<'a> {
    fn acquire(
        flag: &'a AtomicBool,
        slot: &'a Mutex<Option<CancellationToken>>,
    ) -> Option<SendGuard<'a>> {
        let mut active = lock_cancel(slot);
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());

        return Some(SendGuard { flag, slot, token });
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        let mut active = lock_cancel(self.slot);
        *active = None;
        self.flag.store(false, Ordering::Release);
    }
}

/// The client's single conversation. Owns the transcript and runs at most
/// one generation session at a time.
pub struct Conversation {
    transcript: RwLock<Transcript>,
    sending: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    search_enabled: AtomicBool,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    saver: TranscriptSaver,
    tx: mpsc::UnboundedSender<Event>,
    settings: ConversationSettings,
}

impl Conversation {
    pub fn new(
        context: AppContext,
        transport: Arc<dyn Transport>,
        tx: mpsc::UnboundedSender<Event>,
        settings: ConversationSettings,
    ) -> Conversation {
        let saver = TranscriptSaver::spawn(
            context.store.clone(),
            settings.save_debounce,
            context.transcript.clone(),
        );

        return Conversation {
            transcript: RwLock::new(context.transcript),
            sending: AtomicBool::new(false),
            cancel: Mutex::new(None),
            search_enabled: AtomicBool::new(context.search_enabled),
            store: context.store,
            transport,
            saver,
            tx,
            settings,
        };
    }

    fn read_transcript(&self) -> RwLockReadGuard<'_, Transcript> {
        return self
            .transcript
            .read()
            .unwrap_or_else(|poisoned| return poisoned.into_inner());
    }

    fn write_transcript(&self) -> RwLockWriteGuard<'_, Transcript> {
        return self
            .transcript
            .write()
            .unwrap_or_else(|poisoned| return poisoned.into_inner());
    }

    fn acquire(&self) -> Option<SendGuard<'_>> {
        return SendGuard::acquire(&self.sending, &self.cancel);
    }

    pub fn transcript(&self) -> Transcript {
        return self.read_transcript().clone();
    }

    pub fn is_busy(&self) -> bool {
        return self.sending.load(Ordering::Acquire);
    }

    pub fn search_enabled(&self) -> bool {
        return self.search_enabled.load(Ordering::Acquire);
    }

    fn changed(&self) {
        self.saver.schedule(self.transcript());
    }

    fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Dropping event, no presentation layer is listening");
        }
    }

    pub async fn send(&self, content: &str, images: Vec<String>) -> SendOutcome {
        if content.trim().is_empty() && images.is_empty() {
            return SendOutcome::Ignored;
        }

        let guard = match self.acquire() {
            Some(guard) => guard,
            None => {
                tracing::debug!("Rejecting send while a response is streaming");
                return SendOutcome::Rejected;
            }
        };

        let placeholder = Message::placeholder();
        let message_id = placeholder.id.to_string();
        let request = {
            let mut transcript = self.write_transcript();
            transcript.push(Message::user(content.trim(), images));
            let request = RelayRequest::from_history(
                &transcript.messages,
                self.settings.history_window,
                self.search_enabled(),
            );
            transcript.push(placeholder);
            request
        };
        self.changed();

        return self.generate(&message_id, &request, guard.token.clone()).await;
    }

    /// Runs the last user message again, replacing whatever answered it.
    pub async fn retry(&self) -> SendOutcome {
        let guard = match self.acquire() {
            Some(guard) => guard,
            None => return SendOutcome::Rejected,
        };

        let prepared = {
            let mut transcript = self.write_transcript();
            match transcript.last_user_index() {
                None => None,
                Some(idx) => {
                    transcript.messages.truncate(idx + 1);
                    let request = RelayRequest::from_history(
                        &transcript.messages,
                        self.settings.history_window,
                        self.search_enabled(),
                    );
                    let placeholder = Message::placeholder();
                    let message_id = placeholder.id.to_string();
                    transcript.push(placeholder);
                    Some((message_id, request))
                }
            }
        };

        let (message_id, request) = match prepared {
            Some(prepared) => prepared,
            None => return SendOutcome::Ignored,
        };
        self.changed();

        return self.generate(&message_id, &request, guard.token.clone()).await;
    }

    async fn generate(
        &self,
        message_id: &str,
        request: &RelayRequest,
        cancel: CancellationToken,
    ) -> SendOutcome {
        let mut session =
            GenerationSession::new(message_id, self.settings.render_interval, cancel);
        let res = match self.credential().await {
            Some(credential) => {
                session
                    .run(self.transport.as_ref(), request, &credential, self)
                    .await
            }
            None => session.fail(ChatError::Auth, self),
        };

        if let Err(ChatError::Auth) = res {
            self.logout().await;
        }

        let state = session.state();
        if state == SessionState::Canceled {
            self.discard_placeholder(message_id);
        }
        tracing::debug!(
            message_id,
            state = %state,
            length = session.text().len(),
            "Generation finished"
        );

        self.emit(Event::GenerationFinished {
            message_id: message_id.to_string(),
            state,
        });

        return SendOutcome::Finished(state);
    }

    /// Drops an assistant message that never received any text.
    fn discard_placeholder(&self, message_id: &str) {
        {
            let mut transcript = self.write_transcript();
            if !transcript.get(message_id).is_some_and(Message::is_placeholder) {
                return;
            }
            transcript.remove(message_id);
        }

        self.changed();
    }

    /// Cancels the active session. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        match lock_cancel(&self.cancel).as_ref() {
            Some(token) => {
                token.cancel();
                return true;
            }
            None => return false,
        }
    }

    /// Empties the transcript. Refused while a response is streaming.
    pub fn clear(&self) -> bool {
        if self.is_busy() {
            return false;
        }

        self.write_transcript().clear();
        self.changed();

        return true;
    }

    /// Flips the search preference and returns the new value.
    pub async fn toggle_search(&self) -> bool {
        let enabled = !self.search_enabled.fetch_xor(true, Ordering::AcqRel);

        let res = self
            .store
            .set(
                StoreKey::SearchEnabled,
                &enabled.to_string(),
                Scope::Persistent,
            )
            .await;
        if let Err(err) = res {
            tracing::warn!(error = ?err, "Failed to save search preference");
        }

        return enabled;
    }

    /// Forgets the stored credential in both scopes.
    pub async fn logout(&self) {
        if let Err(err) = self.store.remove(StoreKey::AuthToken).await {
            tracing::warn!(error = ?err, "Failed to remove credential");
        }

        self.emit(Event::LoggedOut());
    }

    async fn credential(&self) -> Option<String> {
        match self.store.get(StoreKey::AuthToken).await {
            Ok(credential) => {
                return credential.filter(|credential| return !credential.trim().is_empty());
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to read credential");
                return None;
            }
        }
    }

    /// Writes pending history right away, used before exiting.
    pub async fn flush(&self) {
        self.saver.flush().await;
    }
}

impl RenderSink for Conversation {
    fn publish(&self, message_id: &str, text: &str) {
        // The message is gone when the transcript was cleared mid-stream.
        if !self.write_transcript().set_content(message_id, text) {
            return;
        }

        self.changed();
        self.emit(Event::Render {
            message_id: message_id.to_string(),
            text: text.to_string(),
        });
    }
}
