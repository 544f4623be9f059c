use anyhow::Result;
use async_trait::async_trait;
use strum::EnumIter;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StoreKey {
    AuthToken,
    ChatHistory,
    SearchEnabled,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    /// Lives as long as the process.
    Session,
    /// Survives restarts.
    Persistent,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the session scoped value, falling back to the persistent one.
    async fn get(&self, key: StoreKey) -> Result<Option<String>>;

    /// Stores a value in exactly one scope, clearing the other.
    async fn set(&self, key: StoreKey, value: &str, scope: Scope) -> Result<()>;

    /// Removes a value from both scopes.
    async fn remove(&self, key: StoreKey) -> Result<()>;
}
