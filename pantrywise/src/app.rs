//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::{BACKUPS_DIR_NAME, DATABASE_FILE_NAME};
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::{
    AttentionService, BackupService, ChangeOrigin, ItemsService, LogNotifier, Notifier,
    SettingsService, SyncProvider, SyncService,
};
use crate::storage::SnapshotStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub snapshot_store: SnapshotStore,
    pub settings_service: SettingsService,
    pub items_service: ItemsService,
    pub backup_service: BackupService,
    pub sync_service: SyncService,
    pub attention_service: AttentionService,
}

impl AppState {
    /// Open the data directory and load persisted state.
    ///
    /// Background tasks (autosave, sync) are not started; see
    /// [`start_background_tasks`](Self::start_background_tasks).
    pub async fn open(
        app_data_dir: PathBuf,
        provider: Arc<dyn SyncProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        tracing::info!("App data directory: {:?}", app_data_dir);

        std::fs::create_dir_all(&app_data_dir)?;
        std::fs::create_dir_all(app_data_dir.join(BACKUPS_DIR_NAME))?;

        let pool = create_pool(&app_data_dir.join(DATABASE_FILE_NAME)).await?;
        let repo = Repository::new(pool);
        let store = SnapshotStore::new(repo.clone());

        let settings_service = SettingsService::new(store.clone());
        settings_service.load().await?;

        let items_service = ItemsService::new(settings_service.clone());
        let items = store.load_items().await?;
        tracing::info!("Loaded {} items", items.len());
        items_service.replace_all(items, ChangeOrigin::Local);

        let backup_service = BackupService::new(
            repo,
            items_service.clone(),
            settings_service.clone(),
            app_data_dir.clone(),
        );
        let sync_service = SyncService::new(provider, items_service.clone(), store.clone());
        let attention_service = AttentionService::new(items_service.clone(), notifier);

        Ok(Self {
            app_data_dir,
            snapshot_store: store,
            settings_service,
            items_service,
            backup_service,
            sync_service,
            attention_service,
        })
    }

    /// Open the data directory and start every background task
    pub async fn initialize(app_data_dir: PathBuf, provider: Arc<dyn SyncProvider>) -> Result<Self> {
        tracing::info!("Initializing application");

        let state = Self::open(app_data_dir, provider, Arc::new(LogNotifier)).await?;
        state.start_background_tasks().await;

        tracing::info!("Application initialized successfully");
        Ok(state)
    }

    /// Start autosave, the sync worker and the attention checker, and
    /// rejoin the family group saved by the last session
    pub async fn start_background_tasks(&self) {
        self.snapshot_store.spawn_autosave(&self.items_service);

        self.sync_service.start();
        if let Err(e) = self.sync_service.restore().await {
            tracing::error!("Failed to rejoin family group: {}", e);
        }

        self.attention_service.clone().start();
    }
}
