//! Data models
//!
//! Rust structs representing stored entities and mutation requests.
//! Items serialize with camelCase keys so snapshots stay readable by
//! other clients of the same family group.

use crate::expiry;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

/// Kind of inventory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    #[serde(alias = "Food")]
    Food,
    #[serde(alias = "Household")]
    Household,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Household => "household",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "food" => Ok(Category::Food),
            "household" => Ok(Category::Household),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

/// A tracked inventory entry with an expiry date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(deserialize_with = "loose::id")]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "loose::quantity", default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub category: Category,
    #[serde(deserialize_with = "loose::calendar_date")]
    pub expiry_date: NaiveDate,
    /// Cache of `expiry_date - today` at the last edit. Not authoritative.
    #[serde(deserialize_with = "loose::signed_days", default)]
    pub days_until_expiry: i64,
    pub date_added: DateTime<Utc>,
    #[serde(deserialize_with = "loose::day_count", default)]
    pub notify_days_before: u32,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub date_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl Item {
    /// Live day count; prefer this over the cached `days_until_expiry`.
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        expiry::days_until_expiry(self.expiry_date, today)
    }

    /// Restore lifecycle invariants on an item read from outside the store.
    ///
    /// Returns true if anything had to change.
    pub fn normalize(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if self.used && self.date_used.is_none() {
            tracing::warn!("Item {} is used without a use date, stamping {}", self.id, now);
            self.date_used = Some(now);
            changed = true;
        }

        if !self.used && self.date_used.is_some() {
            tracing::warn!("Item {} has a use date but is not used, clearing it", self.id);
            self.date_used = None;
            changed = true;
        }

        if self.quantity == 0 {
            self.quantity = 1;
            changed = true;
        }

        changed
    }
}

/// When a new item expires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryInput {
    /// Explicit calendar date
    On(NaiveDate),
    /// Days from the creation date, as typed by the user
    InDays(String),
}

/// Create item request
///
/// Fields left as `None` are filled from the settings current when the
/// item is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub name: String,
    pub quantity: u32,
    pub category: Category,
    pub expiry: Option<ExpiryInput>,
    pub notify_days_before: Option<u32>,
    pub image: Option<String>,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            quantity: 1,
            category,
            expiry: None,
            notify_days_before: None,
            image: None,
        }
    }

    /// Quantities below 1 are raised to 1.
    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }

    pub fn expires_on(mut self, date: NaiveDate) -> Self {
        self.expiry = Some(ExpiryInput::On(date));
        self
    }

    pub fn expires_in(mut self, days: impl Into<String>) -> Self {
        self.expiry = Some(ExpiryInput::InDays(days.into()));
        self
    }

    pub fn notify_days_before(mut self, days: u32) -> Self {
        self.notify_days_before = Some(days);
        self
    }

    pub fn image(mut self, uri: impl Into<String>) -> Self {
        self.image = Some(uri.into());
        self
    }

    /// Build a draft from raw form text, coercing numeric fields.
    pub fn from_form(form: &ItemForm) -> Self {
        let mut draft = Self::new(form.name.clone(), form.category)
            .quantity(expiry::coerce_quantity(&form.quantity));

        if let Some(date) = form.expiry_date {
            draft.expiry = Some(ExpiryInput::On(date));
        } else if let Some(days) = form.expiry_days.as_ref().filter(|d| !d.trim().is_empty()) {
            draft.expiry = Some(ExpiryInput::InDays(days.clone()));
        }

        if let Some(days) = form.notify_days.as_ref().filter(|d| !d.trim().is_empty()) {
            draft.notify_days_before = Some(expiry::coerce_day_count(days));
        }

        draft.image = form.image.clone();
        draft
    }
}

/// Raw add-item form input, before numeric coercion
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemForm {
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_days: Option<String>,
    #[serde(default)]
    pub notify_days: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Update item request; only `Some` fields are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
    pub category: Option<Category>,
    pub expiry_date: Option<NaiveDate>,
    pub notify_days_before: Option<u32>,
    /// `Some(None)` clears the image
    pub image: Option<Option<String>>,
}

/// Backup record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Backup {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub size: i64,
    pub checksum: String,
}

/// Deserializers for values written by clients that store numbers as text
/// and dates as full timestamps.
mod loose {
    use super::*;
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Int(v) => Ok(v.to_string()),
            NumberOrText::Float(v) => Ok(v.to_string()),
            NumberOrText::Text(v) if !v.trim().is_empty() => Ok(v),
            NumberOrText::Text(_) => Err(D::Error::custom("item id must not be empty")),
        }
    }

    pub fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        Ok(match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Int(v) => u32::try_from(v).unwrap_or(0).max(1),
            NumberOrText::Float(v) => (v.trunc() as u32).max(1),
            NumberOrText::Text(v) => expiry::coerce_quantity(&v),
        })
    }

    pub fn day_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        Ok(match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Int(v) => u32::try_from(v).unwrap_or(0),
            NumberOrText::Float(v) if v >= 0.0 => v.trunc() as u32,
            NumberOrText::Float(_) => 0,
            NumberOrText::Text(v) => expiry::coerce_day_count(&v),
        })
    }

    pub fn signed_days<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Ok(match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Int(v) => v,
            NumberOrText::Float(v) => v.trunc() as i64,
            NumberOrText::Text(v) => v.trim().parse().unwrap_or(0),
        })
    }

    /// Accepts `2024-05-01` or any RFC 3339 timestamp. Timestamps are read
    /// as the local calendar date they fall on.
    pub fn calendar_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(date);
        }

        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Local).date_naive())
            .map_err(|e| D::Error::custom(format!("invalid expiry date {:?}: {}", raw, e)))
    }
}
