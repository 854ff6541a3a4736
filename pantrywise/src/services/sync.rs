//! Family sync service
//!
//! Shares the item collection with a family group through a
//! [`SyncProvider`]. Local changes are pushed fire-and-forget by a worker
//! task; snapshots arriving from the group replace the local collection
//! wholesale, so concurrent edits resolve as last writer wins.
//!
//! Sync failures are logged and never reach the caller or undo a local
//! change.

use crate::config::SYNC_GROUP_KEY;
use crate::database::Item;
use crate::error::{AppError, Result};
use crate::services::items::{ChangeOrigin, ItemsService};
use crate::storage::{fingerprint, SnapshotStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const GROUP_CHANNEL_CAPACITY: usize = 16;

/// Collection snapshot exchanged with a family group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSnapshot {
    pub items: Vec<Item>,
    pub updated_at: DateTime<Utc>,
    /// Device that pushed the snapshot
    pub updated_by: String,
}

/// Stream of snapshots pushed to a group. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<SharedSnapshot>,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<SharedSnapshot>) -> Self {
        Self { receiver }
    }

    /// Next snapshot, or `None` once the provider closes the stream.
    /// Snapshots missed while lagging are skipped; only the newest matters.
    pub async fn next(&mut self) -> Option<SharedSnapshot> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscription skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Remote store shared by a family group
#[async_trait]
pub trait SyncProvider: Send + Sync {
    fn provider_tag(&self) -> &'static str;

    async fn push(&self, group_id: &str, snapshot: &SharedSnapshot) -> Result<()>;

    async fn pull(&self, group_id: &str) -> Result<Option<SharedSnapshot>>;

    async fn subscribe(&self, group_id: &str) -> Result<Subscription>;
}

struct GroupChannel {
    latest: Option<SharedSnapshot>,
    sender: broadcast::Sender<SharedSnapshot>,
}

impl GroupChannel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(GROUP_CHANNEL_CAPACITY);
        Self {
            latest: None,
            sender,
        }
    }
}

/// In-process provider. Devices sharing one instance see each other's
/// pushes; used offline and in tests.
#[derive(Default)]
pub struct MemorySyncProvider {
    groups: Mutex<HashMap<String, GroupChannel>>,
    fail_pushes: AtomicBool,
}

impl MemorySyncProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent pushes fail, to exercise error paths
    pub fn set_fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::Relaxed);
    }

    pub async fn latest(&self, group_id: &str) -> Option<SharedSnapshot> {
        self.groups
            .lock()
            .await
            .get(group_id)
            .and_then(|group| group.latest.clone())
    }
}

#[async_trait]
impl SyncProvider for MemorySyncProvider {
    fn provider_tag(&self) -> &'static str {
        "memory"
    }

    async fn push(&self, group_id: &str, snapshot: &SharedSnapshot) -> Result<()> {
        if self.fail_pushes.load(Ordering::Relaxed) {
            return Err(AppError::Sync(format!("push to {} rejected", group_id)));
        }

        let mut groups = self.groups.lock().await;
        let group = groups
            .entry(group_id.to_string())
            .or_insert_with(GroupChannel::new);
        group.latest = Some(snapshot.clone());
        // A send error only means nobody is subscribed
        let _ = group.sender.send(snapshot.clone());
        Ok(())
    }

    async fn pull(&self, group_id: &str) -> Result<Option<SharedSnapshot>> {
        Ok(self.latest(group_id).await)
    }

    async fn subscribe(&self, group_id: &str) -> Result<Subscription> {
        let mut groups = self.groups.lock().await;
        let group = groups
            .entry(group_id.to_string())
            .or_insert_with(GroupChannel::new);
        Ok(Subscription::new(group.sender.subscribe()))
    }
}

/// Service keeping the local collection in step with a family group
#[derive(Clone)]
pub struct SyncService {
    provider: Arc<dyn SyncProvider>,
    items: ItemsService,
    store: SnapshotStore,
    device_id: String,
    active_group: Arc<RwLock<Option<String>>>,
    subscription: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncService {
    pub fn new(provider: Arc<dyn SyncProvider>, items: ItemsService, store: SnapshotStore) -> Self {
        Self {
            provider,
            items,
            store,
            device_id: Uuid::new_v4().to_string(),
            active_group: Arc::new(RwLock::new(None)),
            subscription: Arc::new(Mutex::new(None)),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn active_group(&self) -> Option<String> {
        self.active_group.read().await.clone()
    }

    /// Share the collection with `group_id`.
    ///
    /// If the group already holds data it replaces the local collection;
    /// otherwise the local collection is pushed to seed the group.
    pub async fn join_group(&self, group_id: &str) -> Result<()> {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(AppError::Validation("group id must not be empty".to_string()));
        }

        tracing::info!("Joining family group {} via {}", group_id, self.provider.provider_tag());
        self.leave_group_inner().await;

        *self.active_group.write().await = Some(group_id.to_string());
        self.store.save(SYNC_GROUP_KEY, group_id).await?;

        // Subscribe before pulling so pushes made in between are not lost
        let subscription = self.provider.subscribe(group_id).await?;
        let handle = self.spawn_listener(subscription);
        *self.subscription.lock().await = Some(handle);

        match self.provider.pull(group_id).await {
            Ok(Some(remote)) => self.apply_remote(remote),
            Ok(None) => self.push_snapshot(group_id, self.items.list()).await,
            Err(e) => tracing::warn!("Initial pull from group {} failed: {}", group_id, e),
        }

        Ok(())
    }

    /// Stop sharing; the local collection is kept as is
    pub async fn leave_group(&self) -> Result<()> {
        self.leave_group_inner().await;
        *self.active_group.write().await = None;
        self.store.remove(SYNC_GROUP_KEY).await?;
        tracing::info!("Left family group");
        Ok(())
    }

    /// Rejoin the group saved by a previous session, if any
    pub async fn restore(&self) -> Result<()> {
        if let Some(group_id) = self.store.load::<String>(SYNC_GROUP_KEY).await? {
            self.join_group(&group_id).await?;
        }
        Ok(())
    }

    /// Start the worker pushing every local change to the active group
    pub fn start(&self) -> JoinHandle<()> {
        let service = self.clone();
        let mut changes = self.items.subscribe();

        tokio::spawn(async move {
            tracing::info!("Starting sync worker");

            loop {
                let items = match changes.recv().await {
                    Ok(event) if event.origin == ChangeOrigin::Local => event.items.as_ref().clone(),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Sync worker skipped {} changes", skipped);
                        service.items.list()
                    }
                    Err(RecvError::Closed) => break,
                };

                if let Some(group_id) = service.active_group().await {
                    service.push_snapshot(&group_id, items).await;
                }
            }

            tracing::info!("Sync worker stopped");
        })
    }

    async fn push_snapshot(&self, group_id: &str, items: Vec<Item>) {
        let snapshot = SharedSnapshot {
            items,
            updated_at: Utc::now(),
            updated_by: self.device_id.clone(),
        };

        match self.provider.push(group_id, &snapshot).await {
            Ok(()) => tracing::debug!(
                "Pushed {} items to group {}",
                snapshot.items.len(),
                group_id
            ),
            Err(e) => tracing::error!("Failed to sync items to group {}: {}", group_id, e),
        }
    }

    /// Replace the local collection with a group snapshot unless it is
    /// identical to what is already here.
    pub fn apply_remote(&self, snapshot: SharedSnapshot) {
        let local = self.items.list();
        match (fingerprint(&local), fingerprint(&snapshot.items)) {
            (Ok(a), Ok(b)) if a == b => {
                tracing::debug!("Remote snapshot already applied");
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Could not fingerprint snapshot: {}", e);
            }
            _ => {}
        }

        tracing::info!(
            "Applying remote snapshot from {} ({} items)",
            snapshot.updated_by,
            snapshot.items.len()
        );
        self.items.replace_all(snapshot.items, ChangeOrigin::Remote);
    }

    fn spawn_listener(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let service = self.clone();

        tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                if snapshot.updated_by == service.device_id {
                    continue;
                }
                service.apply_remote(snapshot);
            }
            tracing::debug!("Group subscription closed");
        })
    }

    async fn leave_group_inner(&self) {
        if let Some(handle) = self.subscription.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{initialize_database, Category, ItemDraft, Repository};
    use crate::services::settings::SettingsService;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    async fn create_device(provider: Arc<dyn SyncProvider>) -> (SyncService, ItemsService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        let store = SnapshotStore::new(Repository::new(pool));
        let settings = SettingsService::new(store.clone());
        settings.load().await.unwrap();
        let items = ItemsService::new(settings);
        let sync = SyncService::new(provider, items.clone(), store);

        (sync, items)
    }

    /// Poll until `check` holds, failing after two seconds
    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_join_empty_group_seeds_it() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (sync, items) = create_device(provider.clone()).await;
        items.add(ItemDraft::new("Milk", Category::Food)).unwrap();

        sync.join_group("family").await.unwrap();

        let remote = provider.latest("family").await.unwrap();
        assert_eq!(remote.items.len(), 1);
        assert_eq!(remote.updated_by, sync.device_id());
        assert_eq!(sync.active_group().await, Some("family".to_string()));
    }

    #[tokio::test]
    async fn test_join_existing_group_replaces_local() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (first, first_items) = create_device(provider.clone()).await;
        first_items.add(ItemDraft::new("Milk", Category::Food)).unwrap();
        first.join_group("family").await.unwrap();

        let (second, second_items) = create_device(provider.clone()).await;
        second_items.add(ItemDraft::new("Soap", Category::Household)).unwrap();
        second.join_group("family").await.unwrap();

        let names: Vec<String> = second_items.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Milk"]);
    }

    #[tokio::test]
    async fn test_local_changes_reach_other_devices() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (first, first_items) = create_device(provider.clone()).await;
        let (second, second_items) = create_device(provider.clone()).await;
        first.start();
        second.start();
        first.join_group("family").await.unwrap();
        second.join_group("family").await.unwrap();

        let milk = first_items.add(ItemDraft::new("Milk", Category::Food)).unwrap();

        eventually(|| second_items.get(&milk.id).is_some()).await;

        second_items.mark_used(&milk.id);

        eventually(|| first_items.get(&milk.id).map(|i| i.used).unwrap_or(false)).await;
    }

    #[tokio::test]
    async fn test_push_failure_keeps_local_state() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (sync, items) = create_device(provider.clone()).await;
        sync.start();
        sync.join_group("family").await.unwrap();
        provider.set_fail_pushes(true);

        let milk = items.add(ItemDraft::new("Milk", Category::Food)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(items.get(&milk.id).is_some());
        let remote = provider.latest("family").await.unwrap();
        assert!(remote.items.is_empty());
    }

    #[tokio::test]
    async fn test_identical_remote_snapshot_is_ignored() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (sync, items) = create_device(provider).await;
        items.add(ItemDraft::new("Milk", Category::Food)).unwrap();
        let mut changes = items.subscribe();

        sync.apply_remote(SharedSnapshot {
            items: items.list(),
            updated_at: Utc::now(),
            updated_by: "other".to_string(),
        });

        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_and_restore_group() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (sync, _items) = create_device(provider).await;

        sync.join_group("family").await.unwrap();
        sync.leave_group().await.unwrap();
        assert_eq!(sync.active_group().await, None);

        sync.restore().await.unwrap();
        assert_eq!(sync.active_group().await, None);

        sync.join_group("family").await.unwrap();
        sync.restore().await.unwrap();
        assert_eq!(sync.active_group().await, Some("family".to_string()));
    }

    /// Provider where another device pushes while a pull is in flight
    struct BusyGroupProvider {
        inner: MemorySyncProvider,
        concurrent: SharedSnapshot,
    }

    #[async_trait]
    impl SyncProvider for BusyGroupProvider {
        fn provider_tag(&self) -> &'static str {
            "busy"
        }

        async fn push(&self, group_id: &str, snapshot: &SharedSnapshot) -> Result<()> {
            self.inner.push(group_id, snapshot).await
        }

        async fn pull(&self, group_id: &str) -> Result<Option<SharedSnapshot>> {
            let before = self.inner.pull(group_id).await?;
            self.inner.push(group_id, &self.concurrent).await?;
            Ok(before)
        }

        async fn subscribe(&self, group_id: &str) -> Result<Subscription> {
            self.inner.subscribe(group_id).await
        }
    }

    #[tokio::test]
    async fn test_push_during_join_is_received() {
        let (_, other_items) = create_device(Arc::new(MemorySyncProvider::new())).await;
        let eggs = other_items.add(ItemDraft::new("Eggs", Category::Food)).unwrap();

        let provider = Arc::new(BusyGroupProvider {
            inner: MemorySyncProvider::new(),
            concurrent: SharedSnapshot {
                items: other_items.list(),
                updated_at: Utc::now(),
                updated_by: "other-device".to_string(),
            },
        });

        let (sync, items) = create_device(provider).await;

        sync.join_group("family").await.unwrap();

        eventually(|| items.get(&eggs.id).is_some()).await;
    }

    #[tokio::test]
    async fn test_blank_group_rejected() {
        let provider = Arc::new(MemorySyncProvider::new());
        let (sync, _items) = create_device(provider).await;

        assert!(matches!(sync.join_group("  ").await, Err(AppError::Validation(_))));
    }
}
