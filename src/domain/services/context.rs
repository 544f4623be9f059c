use std::sync::Arc;

use crate::domain::models::Store;
use crate::domain::models::StoreKey;
use crate::domain::models::Transcript;
use crate::domain::services::persistence::load_transcript;

async fn read(store: &dyn Store, key: StoreKey) -> Option<String> {
    match store.get(key).await {
        Ok(value) => return value,
        Err(err) => {
            tracing::warn!(error = ?err, key = %key, "Failed to read stored value");
            return None;
        }
    }
}

/// Client state restored from storage once at startup and handed to the
/// components that need it.
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub transcript: Transcript,
    pub search_enabled: bool,
    pub credential: Option<String>,
}

impl AppContext {
    pub async fn load(store: Arc<dyn Store>) -> AppContext {
        let transcript = load_transcript(store.as_ref()).await;

        let search_enabled = read(store.as_ref(), StoreKey::SearchEnabled)
            .await
            .map(|value| return value.trim() == "true")
            .unwrap_or(false);
        let credential = read(store.as_ref(), StoreKey::AuthToken)
            .await
            .filter(|credential| return !credential.trim().is_empty());

        tracing::debug!(
            messages = transcript.len(),
            search_enabled,
            logged_in = credential.is_some(),
            "Loaded client state"
        );

        return AppContext {
            store,
            transcript,
            search_enabled,
            credential,
        };
    }
}
