//! Settings service
//!
//! Holds the defaults applied to new items and the display preferences,
//! cached in memory and persisted through the snapshot store.
//!
//! Reads are synchronous so item creation always sees the settings current
//! at the moment it runs. Changes are never applied to existing items.

use crate::config::{
    DARK_MODE_KEY, DEFAULT_EXPIRY_DAYS, DEFAULT_LANGUAGE, DEFAULT_NOTIFY_DAYS, LANGUAGE_KEY,
    SETTINGS_KEY,
};
use crate::error::Result;
use crate::expiry;
use crate::storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Defaults applied to newly created items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default = "default_expiry_days")]
    pub default_expiry_days: u32,
    #[serde(default = "default_notify_days")]
    pub default_notify_days: u32,
}

fn default_expiry_days() -> u32 {
    DEFAULT_EXPIRY_DAYS
}

fn default_notify_days() -> u32 {
    DEFAULT_NOTIFY_DAYS
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_expiry_days: default_expiry_days(),
            default_notify_days: default_notify_days(),
        }
    }
}

/// Partial settings update; only `Some` fields are merged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub default_expiry_days: Option<u32>,
    pub default_notify_days: Option<u32>,
}

impl SettingsPatch {
    /// Build a patch from settings form text. Blank fields are left alone,
    /// anything else goes through day-count coercion.
    pub fn from_form(expiry_days: &str, notify_days: &str) -> Self {
        let coerce = |text: &str| {
            if text.trim().is_empty() {
                None
            } else {
                Some(expiry::coerce_day_count(text))
            }
        };

        Self {
            default_expiry_days: coerce(expiry_days),
            default_notify_days: coerce(notify_days),
        }
    }

    fn apply(&self, settings: &mut AppSettings) {
        if let Some(days) = self.default_expiry_days {
            settings.default_expiry_days = days;
        }
        if let Some(days) = self.default_notify_days {
            settings.default_notify_days = days;
        }
    }
}

/// Display preferences carried in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub dark_mode: bool,
    pub language: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct SettingsState {
    settings: AppSettings,
    preferences: Preferences,
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    store: SnapshotStore,
    state: Arc<RwLock<SettingsState>>,
}

impl SettingsService {
    /// Create a service holding defaults; call [`load`](Self::load) to read
    /// persisted values.
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            state: Arc::new(RwLock::new(SettingsState::default())),
        }
    }

    /// Load settings and preferences from storage, writing defaults for
    /// anything missing
    pub async fn load(&self) -> Result<AppSettings> {
        let settings = match self.store.load::<AppSettings>(SETTINGS_KEY).await? {
            Some(settings) => settings,
            None => {
                tracing::info!("Settings not found, creating default settings");
                let default = AppSettings::default();
                self.store.save(SETTINGS_KEY, &default).await?;
                default
            }
        };

        let dark_mode = self.store.load::<bool>(DARK_MODE_KEY).await?.unwrap_or(false);
        let language = self
            .store
            .load::<String>(LANGUAGE_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.settings = settings;
        state.preferences = Preferences { dark_mode, language };

        Ok(settings)
    }

    /// Current settings
    pub fn get(&self) -> AppSettings {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .settings
    }

    /// Merge a patch and persist the result
    pub async fn update(&self, patch: SettingsPatch) -> Result<AppSettings> {
        let updated = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            patch.apply(&mut state.settings);
            state.settings
        };

        self.store.save(SETTINGS_KEY, &updated).await?;
        tracing::info!(
            "Settings updated: expiry {} days, notify {} days",
            updated.default_expiry_days,
            updated.default_notify_days
        );

        Ok(updated)
    }

    /// Replace all settings, as done by snapshot import
    pub async fn replace(&self, settings: AppSettings) -> Result<()> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.settings = settings;
        }

        self.store.save(SETTINGS_KEY, &settings).await
    }

    /// Current display preferences
    pub fn preferences(&self) -> Preferences {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .preferences
            .clone()
    }

    pub async fn set_dark_mode(&self, enabled: bool) -> Result<()> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.preferences.dark_mode = enabled;
        }

        self.store.save(DARK_MODE_KEY, &enabled).await
    }

    pub async fn set_language(&self, language: impl Into<String>) -> Result<()> {
        let language = language.into();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.preferences.language = language.clone();
        }

        self.store.save(LANGUAGE_KEY, &language).await
    }
}
