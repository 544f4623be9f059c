#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time;

use crate::domain::models::Scope;
use crate::domain::models::Store;
use crate::domain::models::StoreKey;
use crate::domain::models::Transcript;

pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(800);

/// Writes the transcript to the persistent store once changes have been
/// quiet for the debounce period. Saving is best effort: failures are
/// logged and never reach the conversation.
pub struct TranscriptSaver {
    store: Arc<dyn Store>,
    tx: watch::Sender<Transcript>,
}

impl TranscriptSaver {
    /// `current` is the transcript as loaded, so a flush without changes
    /// writes it back unchanged.
    pub fn spawn(store: Arc<dyn Store>, debounce: Duration, current: Transcript) -> TranscriptSaver {
        let (tx, mut rx) = watch::channel(current);

        let worker_store = store.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                loop {
                    match time::timeout(debounce, rx.changed()).await {
                        // Another change, restart the quiet period.
                        Ok(Ok(())) => continue,
                        // Sender dropped. Write what we have.
                        Ok(Err(_)) => break,
                        Err(_) => break,
                    }
                }

                let transcript = rx.borrow_and_update().clone();
                save(worker_store.as_ref(), &transcript).await;
            }
        });

        return TranscriptSaver { store, tx };
    }

    /// Schedules a save of the given snapshot, replacing any pending one.
    pub fn schedule(&self, transcript: Transcript) {
        self.tx.send_replace(transcript);
    }

    /// Writes the latest snapshot right away.
    pub async fn flush(&self) {
        let transcript = self.tx.borrow().clone();
        save(self.store.as_ref(), &transcript).await;
    }
}

async fn save(store: &dyn Store, transcript: &Transcript) {
    if let Err(err) = write(store, transcript).await {
        tracing::warn!(error = ?err, "Failed to save chat history");
    }
}

async fn write(store: &dyn Store, transcript: &Transcript) -> Result<()> {
    if transcript.is_empty() {
        store.remove(StoreKey::ChatHistory).await?;
        return Ok(());
    }

    let payload = serde_yaml::to_string(transcript)?;
    store
        .set(StoreKey::ChatHistory, &payload, Scope::Persistent)
        .await?;

    tracing::debug!(messages = transcript.len(), "Saved chat history");
    return Ok(());
}

/// Reads the saved transcript. Missing or unreadable history is an empty
/// transcript.
pub async fn load_transcript(store: &dyn Store) -> Transcript {
    let payload = match store.get(StoreKey::ChatHistory).await {
        Ok(Some(payload)) => payload,
        Ok(None) => return Transcript::default(),
        Err(err) => {
            tracing::warn!(error = ?err, "Failed to read chat history");
            return Transcript::default();
        }
    };

    match serde_yaml::from_str::<Transcript>(&payload) {
        Ok(transcript) => return transcript,
        Err(err) => {
            tracing::warn!(error = ?err, "Discarding unreadable chat history");
            return Transcript::default();
        }
    }
}
