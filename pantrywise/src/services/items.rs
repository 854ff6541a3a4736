//! Items service
//!
//! Owns the in-memory item collection and its lifecycle:
//! `active -> used` (terminal, kept for statistics) or `-> removed`.
//!
//! Every mutation applies synchronously and then publishes an
//! [`ItemsChanged`] event. Autosave and family sync consume those events
//! on their own tasks; their failures never undo a local change.

use crate::config::CHANGE_CHANNEL_CAPACITY;
use crate::database::{ExpiryInput, Item, ItemDraft, ItemPatch};
use crate::error::{AppError, Result};
use crate::expiry;
use crate::services::settings::SettingsService;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Where a collection change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A mutation made on this device, including imports
    Local,
    /// A snapshot received from the shared family group
    Remote,
}

/// Published after every change with the full resulting collection
#[derive(Debug, Clone)]
pub struct ItemsChanged {
    pub origin: ChangeOrigin,
    pub items: Arc<Vec<Item>>,
}

/// Service for managing inventory items
#[derive(Clone)]
pub struct ItemsService {
    items: Arc<RwLock<Vec<Item>>>,
    settings: SettingsService,
    events: broadcast::Sender<ItemsChanged>,
}

impl ItemsService {
    pub fn new(settings: SettingsService) -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            settings,
            events,
        }
    }

    /// Receive an event after every change to the collection
    pub fn subscribe(&self) -> broadcast::Receiver<ItemsChanged> {
        self.events.subscribe()
    }

    /// Snapshot of the whole collection, including used items
    pub fn list(&self) -> Vec<Item> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get an item by ID
    pub fn get(&self, id: &str) -> Option<Item> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Create a new item from a draft.
    ///
    /// Drafts with a blank name are rejected and nothing is stored.
    pub fn add(&self, draft: ItemDraft) -> Result<Item> {
        let item = self.build_item(draft)?;

        tracing::info!("Adding item {} ({})", item.name, item.id);
        let mut items = self.write();
        items.push(item.clone());
        self.publish(items, ChangeOrigin::Local);

        Ok(item)
    }

    /// Add several drafts; each is validated independently and invalid
    /// ones are skipped. Returns how many were added.
    pub fn add_many(&self, drafts: Vec<ItemDraft>) -> usize {
        let total = drafts.len();
        let mut built = Vec::with_capacity(total);

        for draft in drafts {
            match self.build_item(draft) {
                Ok(item) => built.push(item),
                Err(e) => tracing::warn!("Skipping draft in batch: {}", e),
            }
        }

        let added = built.len();
        if added > 0 {
            let mut items = self.write();
            items.extend(built);
            self.publish(items, ChangeOrigin::Local);
        }

        tracing::info!("Added {} of {} items", added, total);
        added
    }

    /// Merge a patch into an active item.
    ///
    /// Returns false when the item is missing or already used; neither is
    /// an error.
    pub fn update(&self, id: &str, patch: ItemPatch) -> bool {
        let mut items = self.write();

        let item = match items.iter_mut().find(|item| item.id == id) {
            Some(item) => item,
            None => {
                tracing::debug!("Update ignored, item not found: {}", id);
                return false;
            }
        };

        if item.used {
            tracing::debug!("Update ignored, item already used: {}", id);
            return false;
        }

        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                tracing::warn!("Ignoring empty name in update for {}", id);
            } else {
                item.name = name.to_string();
            }
        }
        if let Some(quantity) = patch.quantity {
            item.quantity = quantity.max(1);
        }
        if let Some(category) = patch.category {
            item.category = category;
        }
        if let Some(expiry_date) = patch.expiry_date {
            item.expiry_date = expiry_date;
            item.days_until_expiry = expiry::days_until_expiry(expiry_date, expiry::today());
        }
        if let Some(days) = patch.notify_days_before {
            item.notify_days_before = days;
        }
        if let Some(image) = patch.image {
            item.image = image;
        }

        tracing::debug!("Updated item: {}", id);
        self.publish(items, ChangeOrigin::Local);
        true
    }

    /// Remove an item; returns false if it did not exist
    pub fn delete(&self, id: &str) -> bool {
        let mut items = self.write();
        let before = items.len();
        items.retain(|item| item.id != id);

        if items.len() == before {
            tracing::debug!("Delete ignored, item not found: {}", id);
            return false;
        }

        tracing::info!("Deleted item: {}", id);
        self.publish(items, ChangeOrigin::Local);
        true
    }

    /// Mark an item as used. Returns false if it is missing or was already
    /// used, so repeated calls keep the first use date.
    pub fn mark_used(&self, id: &str) -> bool {
        let mut items = self.write();

        match items.iter_mut().find(|item| item.id == id) {
            Some(item) if !item.used => {
                item.used = true;
                item.date_used = Some(Utc::now());
                tracing::info!("Marked item used: {}", id);
            }
            Some(_) => {
                tracing::debug!("Item already used: {}", id);
                return false;
            }
            None => {
                tracing::debug!("Mark used ignored, item not found: {}", id);
                return false;
            }
        }

        self.publish(items, ChangeOrigin::Local);
        true
    }

    /// Start a fresh draft carrying only the name of an existing item.
    ///
    /// The original item is left untouched.
    pub fn re_add_draft(&self, id: &str) -> Option<ItemDraft> {
        self.get(id)
            .map(|item| ItemDraft::new(item.name, Default::default()))
    }

    /// Replace the whole collection, as done by load, import and remote sync.
    ///
    /// Items are normalized, items without a name are dropped and duplicate
    /// ids keep their first occurrence.
    pub fn replace_all(&self, incoming: Vec<Item>, origin: ChangeOrigin) {
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(incoming.len());

        for mut item in incoming {
            if item.name.trim().is_empty() {
                tracing::warn!("Dropping item without a name: {}", item.id);
                continue;
            }
            if !seen.insert(item.id.clone()) {
                tracing::warn!("Dropping duplicate item id: {}", item.id);
                continue;
            }
            item.normalize(now);
            normalized.push(item);
        }

        tracing::info!("Replacing collection with {} items ({:?})", normalized.len(), origin);
        let mut items = self.write();
        *items = normalized;
        self.publish(items, origin);
    }

    fn build_item(&self, draft: ItemDraft) -> Result<Item> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("item name must not be empty".to_string()));
        }

        // Settings are read now so later changes never apply retroactively
        let settings = self.settings.get();
        let today = expiry::today();

        let expiry_date = match draft.expiry {
            Some(ExpiryInput::On(date)) => date,
            Some(ExpiryInput::InDays(days)) => expiry::date_from_day_offset(&days, today),
            None => expiry::add_days(today, settings.default_expiry_days),
        };

        Ok(Item {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            quantity: draft.quantity.max(1),
            category: draft.category,
            expiry_date,
            days_until_expiry: expiry::days_until_expiry(expiry_date, today),
            date_added: Utc::now(),
            notify_days_before: draft
                .notify_days_before
                .unwrap_or(settings.default_notify_days),
            used: false,
            date_used: None,
            image: draft.image,
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Item>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish while still holding the write guard so events arrive in
    /// mutation order.
    fn publish(&self, items: RwLockWriteGuard<'_, Vec<Item>>, origin: ChangeOrigin) {
        let snapshot = Arc::new(items.clone());
        // A send error only means nobody is listening
        let _ = self.events.send(ItemsChanged {
            origin,
            items: snapshot,
        });
        drop(items);
    }
}
