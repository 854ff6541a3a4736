//! Application configuration constants
//!
//! Central location for thresholds, defaults, storage keys and intervals
//! used throughout the application.

// ===== Urgency Thresholds =====

/// Upper bound (inclusive) of the `critical` urgency band, in days
pub const CRITICAL_MAX_DAYS: i64 = 1;

/// Upper bound (inclusive) of the `warning` band and of the `Expiring` filter
pub const EXPIRING_SOON_MAX_DAYS: i64 = 4;

// ===== New Item Defaults =====

/// Days until expiry applied when a new item gives no expiry
pub const DEFAULT_EXPIRY_DAYS: u32 = 7;

/// Days before expiry an item enters the attention queue, when not given
pub const DEFAULT_NOTIFY_DAYS: u32 = 3;

/// Display language used until the user picks one
pub const DEFAULT_LANGUAGE: &str = "en";

// ===== Storage Keys =====

pub const ITEMS_KEY: &str = "items";
pub const SETTINGS_KEY: &str = "settings";
pub const DARK_MODE_KEY: &str = "darkMode";
pub const LANGUAGE_KEY: &str = "language";
/// Shared family group the collection is synced with, if any
pub const SYNC_GROUP_KEY: &str = "familyGroupId";

/// Suffix appended to a key when its stored value could not be read
pub const CORRUPT_KEY_SUFFIX: &str = ".corrupt";

// ===== Files =====

pub const DATABASE_FILE_NAME: &str = "pantry.sqlite";
pub const BACKUPS_DIR_NAME: &str = "backups";

/// Number of backup files kept on disk; older files are removed
pub const BACKUP_RETENTION_COUNT: usize = 10;

// ===== Background Tasks =====

/// How often the attention notifier re-checks the collection (1 hour)
pub const ATTENTION_CHECK_INTERVAL_SECS: u64 = 3_600;

/// Capacity of the item change broadcast channel.
/// Slow receivers that lag behind re-read the full collection.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ===== Statistics =====

pub const WEEK_DAYS: i64 = 7;
pub const MONTH_DAYS: i64 = 30;
pub const YEAR_DAYS: i64 = 365;
