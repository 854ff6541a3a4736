//! Backup service
//!
//! Exports the whole application snapshot (items, settings, preferences) as
//! JSON and imports it back. Backup files are the same JSON written to the
//! backups directory with a recorded SHA-256 checksum.
//!
//! Import parses everything before touching any state: a snapshot that
//! fails to parse leaves the application exactly as it was.

use crate::config::{BACKUPS_DIR_NAME, BACKUP_RETENTION_COUNT};
use crate::database::{Backup, Item, Repository};
use crate::error::{AppError, Result};
use crate::services::items::{ChangeOrigin, ItemsService};
use crate::services::settings::{AppSettings, SettingsService};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Whole-application snapshot. Absent keys are left unchanged on import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<AppSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    repo: Repository,
    items: ItemsService,
    settings: SettingsService,
    backups_dir: PathBuf,
}

impl BackupService {
    pub fn new(
        repo: Repository,
        items: ItemsService,
        settings: SettingsService,
        app_data_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            items,
            settings,
            backups_dir: app_data_dir.join(BACKUPS_DIR_NAME),
        }
    }

    /// Current state as a snapshot
    pub fn snapshot(&self) -> Snapshot {
        let preferences = self.settings.preferences();
        Snapshot {
            items: Some(self.items.list()),
            settings: Some(self.settings.get()),
            dark_mode: Some(preferences.dark_mode),
            language: Some(preferences.language),
        }
    }

    /// Export the current state as pretty-printed JSON
    pub fn export_snapshot(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        tracing::info!("Exported snapshot ({} bytes)", json.len());
        Ok(json)
    }

    /// Import a JSON snapshot, replacing each part it contains.
    ///
    /// Returns false if the text is not a valid snapshot; nothing changes
    /// in that case.
    pub async fn import_snapshot(&self, json: &str) -> bool {
        let snapshot: Snapshot = match serde_json::from_str(json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Import failed, snapshot is invalid: {}", e);
                return false;
            }
        };

        self.apply(snapshot).await;
        true
    }

    async fn apply(&self, snapshot: Snapshot) {
        if let Some(items) = snapshot.items {
            tracing::info!("Importing {} items", items.len());
            self.items.replace_all(items, ChangeOrigin::Local);
        }

        // Storage errors below are logged: the in-memory state is already
        // replaced and stays authoritative for this session.
        if let Some(settings) = snapshot.settings {
            if let Err(e) = self.settings.replace(settings).await {
                tracing::error!("Failed to save imported settings: {}", e);
            }
        }

        if let Some(dark_mode) = snapshot.dark_mode {
            if let Err(e) = self.settings.set_dark_mode(dark_mode).await {
                tracing::error!("Failed to save imported dark mode: {}", e);
            }
        }

        if let Some(language) = snapshot.language {
            if let Err(e) = self.settings.set_language(language).await {
                tracing::error!("Failed to save imported language: {}", e);
            }
        }
    }

    /// Write the current snapshot to a new backup file
    pub async fn create_backup(&self) -> Result<PathBuf> {
        tracing::info!("Creating backup");

        fs::create_dir_all(&self.backups_dir).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let backup_path = self.backups_dir.join(format!("backup_{}.json", timestamp));

        let json = self.export_snapshot()?;
        let checksum = calculate_checksum(json.as_bytes());
        fs::write(&backup_path, json.as_bytes()).await?;

        let size = json.len() as i64;
        self.repo
            .record_backup(backup_path.to_string_lossy().as_ref(), size, &checksum)
            .await?;

        tracing::info!("Backup created: {:?} ({} bytes)", backup_path, size);

        self.apply_retention_policy().await?;

        Ok(backup_path)
    }

    /// Keep only the newest backups
    async fn apply_retention_policy(&self) -> Result<()> {
        let backups = self.repo.list_backups().await?;

        for backup in backups.iter().skip(BACKUP_RETENTION_COUNT) {
            tracing::info!("Deleting old backup: {}", backup.path);

            if let Err(e) = fs::remove_file(&backup.path).await {
                tracing::warn!("Failed to delete backup file {}: {}", backup.path, e);
            }
            self.repo.delete_backup(&backup.id).await?;
        }

        Ok(())
    }

    /// List recorded backups, newest first
    pub async fn list_backups(&self) -> Result<Vec<Backup>> {
        self.repo.list_backups().await
    }

    /// Restore from a backup file or any exported snapshot file.
    ///
    /// Files recorded by [`create_backup`](Self::create_backup) must still
    /// match their checksum. Returns the import result.
    pub async fn restore_backup(&self, backup_path: &Path) -> Result<bool> {
        tracing::info!("Restoring from backup: {:?}", backup_path);

        let data = fs::read(backup_path).await?;

        let recorded = self
            .repo
            .find_backup_by_path(backup_path.to_string_lossy().as_ref())
            .await?;

        if let Some(backup) = recorded {
            let actual = calculate_checksum(&data);
            if actual != backup.checksum {
                return Err(AppError::Backup(format!(
                    "Checksum mismatch for {:?}: expected {}, got {}",
                    backup_path, backup.checksum, actual
                )));
            }
        }

        let json = String::from_utf8(data)
            .map_err(|e| AppError::Import(format!("Backup is not UTF-8: {}", e)))?;

        let imported = self.import_snapshot(&json).await;
        if imported {
            tracing::info!("Restore completed successfully");
        }

        Ok(imported)
    }
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
