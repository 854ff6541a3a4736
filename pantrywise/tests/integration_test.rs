//! Integration tests for Pantrywise
//!
//! These tests verify end-to-end functionality including:
//! - Item lifecycle against persisted storage
//! - Autosave and reload across sessions
//! - Export/import and family sync between two devices

use chrono::Duration;
use pantrywise::app::AppState;
use pantrywise::database::{Category, ItemDraft, ItemPatch};
use pantrywise::expiry;
use pantrywise::services::views::{self, DashboardQuery, ItemFilter, SortKey, StatsPeriod};
use pantrywise::services::{LogNotifier, MemorySyncProvider, SettingsPatch};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to open an application over a fresh data directory
async fn create_test_app(provider: Arc<MemorySyncProvider>) -> (AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let state = AppState::open(temp_dir.path().to_path_buf(), provider, Arc::new(LogNotifier))
        .await
        .unwrap();

    (state, temp_dir)
}

/// Poll until `check` holds, failing after two seconds
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_item_lifecycle_and_views() {
    let (state, _temp) = create_test_app(Arc::new(MemorySyncProvider::new())).await;
    let items = &state.items_service;
    let today = expiry::today();

    let milk = items
        .add(
            ItemDraft::new("Milk", Category::Food)
                .quantity(1)
                .expires_on(today + Duration::days(2))
                .notify_days_before(3),
        )
        .unwrap();
    let soap = items
        .add(ItemDraft::new("Soap", Category::Household).expires_in("30"))
        .unwrap();
    let yoghurt = items
        .add(ItemDraft::new("Yoghurt", Category::Food).expires_on(today - Duration::days(1)))
        .unwrap();

    let all = items.list();
    let ids = |filter| -> Vec<String> {
        views::filter_items(&all, filter, today)
            .into_iter()
            .map(|i| i.id.clone())
            .collect()
    };

    assert_eq!(ids(ItemFilter::All).len(), 3);
    assert_eq!(ids(ItemFilter::Food), vec![milk.id.clone(), yoghurt.id.clone()]);
    assert_eq!(ids(ItemFilter::Household), vec![soap.id.clone()]);
    assert_eq!(ids(ItemFilter::Expiring), vec![milk.id.clone()]);
    assert_eq!(ids(ItemFilter::Expired), vec![yoghurt.id.clone()]);

    let queue: Vec<String> = views::attention_queue(&all, today)
        .into_iter()
        .map(|i| i.name.clone())
        .collect();
    assert_eq!(queue, vec!["Yoghurt", "Milk"]);

    // Use the milk, waste the yoghurt
    assert!(items.mark_used(&milk.id));
    assert!(!items.update(
        &milk.id,
        ItemPatch {
            quantity: Some(3),
            ..ItemPatch::default()
        }
    ));

    let all = items.list();
    let dashboard = views::dashboard(
        &all,
        &DashboardQuery {
            filter: ItemFilter::All,
            sort: SortKey::Name,
            search: String::new(),
        },
        today,
    );
    let names: Vec<&str> = dashboard.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Soap", "Yoghurt"]);

    let stats = views::waste_statistics(&all, StatsPeriod::Week, today);
    assert_eq!(stats.used_count, 1);
    assert_eq!(stats.wasted_count, 1);
    assert_eq!(stats.most_wasted, vec![("Yoghurt".to_string(), 1)]);

    for item in &all {
        assert_eq!(item.used, item.date_used.is_some());
    }
}

#[tokio::test]
async fn test_autosave_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();
    let provider = Arc::new(MemorySyncProvider::new());

    let milk_id = {
        let state = AppState::open(data_dir.clone(), provider.clone(), Arc::new(LogNotifier))
            .await
            .unwrap();
        state.start_background_tasks().await;

        state
            .settings_service
            .update(SettingsPatch::from_form("5", "1"))
            .await
            .unwrap();
        let milk = state
            .items_service
            .add(ItemDraft::new("Milk", Category::Food))
            .unwrap();
        state.items_service.mark_used(&milk.id);

        let store = state.snapshot_store.clone();
        let mut saved = Vec::new();
        for _ in 0..200 {
            saved = store.load_items().await.unwrap();
            if saved.first().map(|i| i.used).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(saved.len(), 1);
        milk.id
    };

    let reopened = AppState::open(data_dir, provider, Arc::new(LogNotifier))
        .await
        .unwrap();

    let milk = reopened.items_service.get(&milk_id).unwrap();
    assert!(milk.used);
    assert!(milk.date_used.is_some());
    assert_eq!(milk.notify_days_before, 1);
    assert_eq!(reopened.settings_service.get().default_expiry_days, 5);
}

#[tokio::test]
async fn test_export_then_import_into_new_app() {
    let provider = Arc::new(MemorySyncProvider::new());
    let (source, _source_dir) = create_test_app(provider.clone()).await;
    let (target, _target_dir) = create_test_app(provider).await;

    source
        .items_service
        .add_many(vec![
            ItemDraft::new("Rice", Category::Food),
            ItemDraft::new("", Category::Food),
            ItemDraft::new("Bleach", Category::Household),
        ]);
    source.settings_service.set_language("fr").await.unwrap();

    let exported = source.backup_service.export_snapshot().unwrap();

    assert!(target.backup_service.import_snapshot(&exported).await);
    assert_eq!(target.items_service.list(), source.items_service.list());
    assert_eq!(target.settings_service.preferences().language, "fr");

    assert!(!target.backup_service.import_snapshot("not json").await);
    assert_eq!(target.items_service.list().len(), 2);
}

#[tokio::test]
async fn test_family_sync_between_devices() {
    let provider = Arc::new(MemorySyncProvider::new());
    let (phone, _phone_dir) = create_test_app(provider.clone()).await;
    let (tablet, _tablet_dir) = create_test_app(provider.clone()).await;
    phone.start_background_tasks().await;
    tablet.start_background_tasks().await;

    phone.sync_service.join_group("smith-family").await.unwrap();
    tablet.sync_service.join_group("smith-family").await.unwrap();

    let eggs = phone
        .items_service
        .add(ItemDraft::new("Eggs", Category::Food))
        .unwrap();

    let tablet_items = tablet.items_service.clone();
    let eggs_id = eggs.id.clone();
    eventually(move || tablet_items.get(&eggs_id).is_some()).await;

    tablet.items_service.delete(&eggs.id);

    let phone_items = phone.items_service.clone();
    eventually(move || phone_items.list().is_empty()).await;

    // Sync failures never revert local edits
    provider.set_fail_pushes(true);
    let bread = phone
        .items_service
        .add(ItemDraft::new("Bread", Category::Food))
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(phone.items_service.get(&bread.id).is_some());
    assert!(tablet.items_service.get(&bread.id).is_none());
}
