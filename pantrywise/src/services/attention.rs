//! Attention notifier
//!
//! Runs a background check that raises a notice when an item enters the
//! attention queue, and again whenever its urgency band changes.
//! Delivery is left to a [`Notifier`]; the default one logs.

use crate::config::ATTENTION_CHECK_INTERVAL_SECS;
use crate::expiry::{self, Urgency};
use crate::services::items::ItemsService;
use crate::services::views;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Notice for one item needing attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionNotice {
    pub item_id: String,
    pub item_name: String,
    pub days_until_expiry: i64,
    pub urgency: Urgency,
}

impl AttentionNotice {
    pub fn message(&self) -> String {
        match self.days_until_expiry {
            d if d < 0 => format!("{} expired {} day(s) ago", self.item_name, -d),
            0 => format!("{} expires today", self.item_name),
            d => format!("{} expires in {} day(s)", self.item_name, d),
        }
    }
}

/// Delivers attention notices to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &AttentionNotice);
}

/// Writes notices to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &AttentionNotice) {
        tracing::info!("Attention ({}): {}", notice.urgency, notice.message());
    }
}

/// Attention service with background checker
#[derive(Clone)]
pub struct AttentionService {
    items: ItemsService,
    notifier: Arc<dyn Notifier>,
    /// Last band each item was notified in
    notified: Arc<Mutex<HashMap<String, Urgency>>>,
}

impl AttentionService {
    pub fn new(items: ItemsService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            items,
            notifier,
            notified: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start the background checker
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Starting attention checker");

            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(ATTENTION_CHECK_INTERVAL_SECS));

            loop {
                interval.tick().await;

                let notices = self.check(expiry::today()).await;
                if !notices.is_empty() {
                    tracing::debug!("Raised {} attention notices", notices.len());
                }
            }
        })
    }

    /// Notify about queue items not yet notified in their current band.
    ///
    /// Items that left the queue are forgotten, so they notify again if
    /// they come back.
    pub async fn check(&self, today: NaiveDate) -> Vec<AttentionNotice> {
        let items = self.items.list();
        let queue = views::attention_queue(&items, today);
        let mut notified = self.notified.lock().await;

        notified.retain(|id, _| queue.iter().any(|item| &item.id == id));

        let mut notices = Vec::new();
        for item in queue {
            let days = item.days_left(today);
            let urgency = Urgency::classify(days);

            if notified.get(&item.id) == Some(&urgency) {
                continue;
            }

            let notice = AttentionNotice {
                item_id: item.id.clone(),
                item_name: item.name.clone(),
                days_until_expiry: days,
                urgency,
            };
            self.notifier.notify(&notice);
            notified.insert(item.id.clone(), urgency);
            notices.push(notice);
        }

        notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{initialize_database, Category, ItemDraft, Repository};
    use crate::services::settings::SettingsService;
    use crate::storage::SnapshotStore;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: StdMutex<Vec<AttentionNotice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: &AttentionNotice) {
            self.seen.lock().unwrap().push(notice.clone());
        }
    }

    async fn create_test_service() -> (AttentionService, ItemsService, Arc<RecordingNotifier>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        let settings = SettingsService::new(SnapshotStore::new(Repository::new(pool)));
        settings.load().await.unwrap();
        let items = ItemsService::new(settings);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AttentionService::new(items.clone(), notifier.clone());

        (service, items, notifier)
    }

    #[tokio::test]
    async fn test_check_notifies_once_per_band() {
        let (service, items, notifier) = create_test_service().await;
        let today = expiry::today();
        let milk = items
            .add(
                ItemDraft::new("Milk", Category::Food)
                    .expires_on(today + Duration::days(3))
                    .notify_days_before(3),
            )
            .unwrap();
        items
            .add(
                ItemDraft::new("Rice", Category::Food)
                    .expires_on(today + Duration::days(60))
                    .notify_days_before(3),
            )
            .unwrap();

        let first = service.check(today).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].item_id, milk.id);
        assert_eq!(first[0].urgency, Urgency::Warning);

        // Same band: silent
        assert!(service.check(today).await.is_empty());

        // Two days later the item is critical
        let later = service.check(today + Duration::days(2)).await;
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].urgency, Urgency::Critical);

        assert_eq!(notifier.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_used_items_leave_the_queue() {
        let (service, items, _notifier) = create_test_service().await;
        let today = expiry::today();
        let milk = items
            .add(
                ItemDraft::new("Milk", Category::Food)
                    .expires_on(today - Duration::days(1))
                    .notify_days_before(0),
            )
            .unwrap();

        assert_eq!(service.check(today).await.len(), 1);

        items.mark_used(&milk.id);
        assert!(service.check(today).await.is_empty());
        assert!(service.notified.lock().await.is_empty());
    }

    #[test]
    fn test_notice_message() {
        let mut notice = AttentionNotice {
            item_id: "1".to_string(),
            item_name: "Milk".to_string(),
            days_until_expiry: -2,
            urgency: Urgency::Expired,
        };
        assert_eq!(notice.message(), "Milk expired 2 day(s) ago");

        notice.days_until_expiry = 0;
        assert_eq!(notice.message(), "Milk expires today");

        notice.days_until_expiry = 3;
        assert_eq!(notice.message(), "Milk expires in 3 day(s)");
    }
}
