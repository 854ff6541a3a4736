//! Services module
//!
//! Business logic services that coordinate the in-memory state, storage
//! and background tasks.

pub mod attention;
pub mod backup;
pub mod items;
pub mod settings;
pub mod sync;
pub mod views;

pub use attention::{AttentionNotice, AttentionService, LogNotifier, Notifier};
pub use backup::{BackupService, Snapshot};
pub use items::{ChangeOrigin, ItemsChanged, ItemsService};
pub use settings::{AppSettings, Preferences, SettingsPatch, SettingsService};
pub use sync::{MemorySyncProvider, SharedSnapshot, Subscription, SyncProvider, SyncService};
