//! Snapshot storage
//!
//! Stores each part of the application snapshot (items, settings,
//! preferences, sync group) as JSON under a fixed key in the repository.
//!
//! Item changes are written by an autosave task that listens to the item
//! change channel, so mutations never wait on disk.

use crate::config::{CORRUPT_KEY_SUFFIX, ITEMS_KEY};
use crate::database::{Item, Repository};
use crate::error::Result;
use crate::services::items::ItemsService;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// JSON snapshot storage over the key-value repository
#[derive(Clone)]
pub struct SnapshotStore {
    repo: Repository,
}

impl SnapshotStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Load and decode the value under `key`.
    ///
    /// A value that fails to decode is copied to `<key>.corrupt`, removed,
    /// and reported as missing so the caller starts from defaults.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = match self.repo.get_value(key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::error!("Stored value for {} is unreadable: {}", key, e);
                self.quarantine(key, &raw).await?;
                Ok(None)
            }
        }
    }

    /// Encode and store a value under `key`
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.repo.set_value(key, &json).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.repo.delete_value(key).await?;
        Ok(())
    }

    /// Load the item collection record by record.
    ///
    /// Records that fail to decode are skipped and kept under
    /// `items.corrupt`; the rest of the collection still loads.
    pub async fn load_items(&self) -> Result<Vec<Item>> {
        let records = match self.load::<Vec<Value>>(ITEMS_KEY).await? {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };

        let total = records.len();
        let mut items = Vec::with_capacity(total);
        let mut rejected = Vec::new();

        for record in records {
            match Item::deserialize(&record) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!("Skipping unreadable item record: {}", e);
                    rejected.push(record);
                }
            }
        }

        if !rejected.is_empty() {
            let corrupt_key = format!("{}{}", ITEMS_KEY, CORRUPT_KEY_SUFFIX);
            self.save(&corrupt_key, &rejected).await?;
            tracing::warn!("Moved {} unreadable items to {}", rejected.len(), corrupt_key);
        }

        tracing::debug!("Loaded {} of {} items", items.len(), total);
        Ok(items)
    }

    pub async fn save_items(&self, items: &[Item]) -> Result<()> {
        self.save(ITEMS_KEY, items).await?;
        tracing::debug!("Saved {} items", items.len());
        Ok(())
    }

    async fn quarantine(&self, key: &str, raw: &str) -> Result<()> {
        let corrupt_key = format!("{}{}", key, CORRUPT_KEY_SUFFIX);
        self.repo.set_value(&corrupt_key, raw).await?;
        self.repo.delete_value(key).await?;
        tracing::warn!("Moved unreadable value for {} to {}", key, corrupt_key);
        Ok(())
    }

    /// Start the autosave task writing the collection after every change
    pub fn spawn_autosave(&self, items: &ItemsService) -> JoinHandle<()> {
        let store = self.clone();
        let items = items.clone();
        let mut changes = items.subscribe();

        tokio::spawn(async move {
            tracing::info!("Starting item autosave");

            loop {
                let snapshot = match changes.recv().await {
                    Ok(event) => event.items,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Autosave skipped {} changes, saving current state", skipped);
                        std::sync::Arc::new(items.list())
                    }
                    Err(RecvError::Closed) => break,
                };

                if let Err(e) = store.save_items(&snapshot).await {
                    tracing::error!("Failed to save items: {}", e);
                }
            }

            tracing::info!("Item autosave stopped");
        })
    }
}

/// SHA-256 fingerprint of a collection, used to recognise snapshots that
/// are already applied.
pub fn fingerprint(items: &[Item]) -> Result<String> {
    let json = serde_json::to_vec(items)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}
