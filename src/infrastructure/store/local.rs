#[cfg(test)]
#[path = "local_test.rs"]
mod tests;

use std::path;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Scope;
use crate::domain::models::Store;
use crate::domain::models::StoreKey;

/// Key/value store with a per-process session scope and a persistent scope
/// backed by one file per key in the data directory.
pub struct LocalStore {
    pub data_dir: path::PathBuf,
    session: DashMap<StoreKey, String>,
}

impl Default for LocalStore {
    fn default() -> LocalStore {
        return LocalStore::new(path::PathBuf::from(Config::get(ConfigKey::DataDir)));
    }
}

impl LocalStore {
    pub fn new(data_dir: path::PathBuf) -> LocalStore {
        return LocalStore {
            data_dir,
            session: DashMap::new(),
        };
    }

    fn get_file_path(&self, key: StoreKey) -> path::PathBuf {
        return self.data_dir.join(key.to_string());
    }

    async fn remove_file(&self, key: StoreKey) -> Result<()> {
        let file_path = self.get_file_path(key);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }
}

#[async_trait]
impl Store for LocalStore {
    #[allow(clippy::implicit_return)]
    async fn get(&self, key: StoreKey) -> Result<Option<String>> {
        if let Some(value) = self.session.get(&key) {
            return Ok(Some(value.to_string()));
        }

        let file_path = self.get_file_path(key);
        if !file_path.exists() {
            return Ok(None);
        }

        let payload = fs::read_to_string(file_path).await?;
        return Ok(Some(payload));
    }

    #[allow(clippy::implicit_return)]
    async fn set(&self, key: StoreKey, value: &str, scope: Scope) -> Result<()> {
        match scope {
            Scope::Session => {
                self.remove_file(key).await?;
                self.session.insert(key, value.to_string());
            }
            Scope::Persistent => {
                self.session.remove(&key);
                if !self.data_dir.exists() {
                    fs::create_dir_all(&self.data_dir).await?;
                }

                let mut file = fs::File::create(self.get_file_path(key)).await?;
                file.write_all(value.as_bytes()).await?;
                file.flush().await?;
            }
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn remove(&self, key: StoreKey) -> Result<()> {
        self.session.remove(&key);
        self.remove_file(key).await?;

        return Ok(());
    }
}
