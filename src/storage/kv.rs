use std::{
    collections::HashMap,
    future::Future,
    ops::Deref,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::fs::operations::{overwrite_locked, read_locked};

/// Interface for the host's persisted key-value store. Values are whole documents: there are no
/// partial updates and no transactions, every `set` replaces what was there.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref + Sync> KeyValueStore for T
where
    T::Target: KeyValueStore,
{
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        self.deref().get(key)
    }

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send {
        self.deref().set(key, value)
    }
}

/// Stores every key as `<dir>/<key>.json`.
pub struct FileKeyValueStore {
    store_dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(store_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&store_dir)?;

        Ok(Self { store_dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(anyhow!("Illegal store key {key:?}"));
        }
        Ok(self.store_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        debug!("Reading {path:?}");
        Ok(read_locked(&path).await?)
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        debug!("Writing {} bytes into {path:?}", value.len());
        overwrite_locked(&path, value.as_bytes()).await?;
        Ok(())
    }
}

/// Process-local store. Clones share the same contents. Every access yields to the scheduler once
/// so interleavings look like they would against real I/O.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| anyhow!("Memory store lock was poisoned"))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        tokio::task::yield_now().await;
        Ok(self.values()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        tokio::task::yield_now().await;
        self.values()?.insert(key.to_owned(), value);
        Ok(())
    }
}
