//! Derived views over the item collection
//!
//! Everything here is a pure function of the items and a reference date.
//! Results are recomputed on every call and never stored.
//!
//! Used items never appear in dashboard views or the attention queue; they
//! only count towards statistics.

use crate::config::{EXPIRING_SOON_MAX_DAYS, MONTH_DAYS, WEEK_DAYS, YEAR_DAYS};
use crate::database::{Category, Item};
use crate::expiry::Urgency;
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Dashboard filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemFilter {
    #[default]
    All,
    Food,
    Household,
    /// Due within 0..=4 days
    Expiring,
    Expired,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item, today: NaiveDate) -> bool {
        if item.used {
            return false;
        }

        let days = item.days_left(today);
        match self {
            ItemFilter::All => true,
            ItemFilter::Food => item.category == Category::Food,
            ItemFilter::Household => item.category == Category::Household,
            ItemFilter::Expiring => (0..=EXPIRING_SOON_MAX_DAYS).contains(&days),
            ItemFilter::Expired => days < 0,
        }
    }
}

impl FromStr for ItemFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ItemFilter::All),
            "food" => Ok(ItemFilter::Food),
            "household" => Ok(ItemFilter::Household),
            "expiring" => Ok(ItemFilter::Expiring),
            "expired" => Ok(ItemFilter::Expired),
            other => Err(format!("Unknown filter: {}", other)),
        }
    }
}

/// Dashboard sort order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Name ascending, case-insensitive
    Name,
    /// Soonest expiry first
    #[default]
    Expiry,
    /// Most recently added first
    Added,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "expiry" => Ok(SortKey::Expiry),
            "added" => Ok(SortKey::Added),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

pub fn filter_items(items: &[Item], filter: ItemFilter, today: NaiveDate) -> Vec<&Item> {
    items
        .iter()
        .filter(|item| filter.matches(item, today))
        .collect()
}

/// Stable sort; equal keys keep their input order.
pub fn sort_items(items: &mut [&Item], key: SortKey, today: NaiveDate) {
    match key {
        SortKey::Name => items.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        }),
        SortKey::Expiry => items.sort_by_key(|item| item.days_left(today)),
        SortKey::Added => items.sort_by(|a, b| b.date_added.cmp(&a.date_added)),
    }
}

/// Case-insensitive name search; a blank query keeps everything
pub fn search_items<'a>(items: &[&'a Item], query: &str) -> Vec<&'a Item> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return items.to_vec();
    }

    items
        .iter()
        .copied()
        .filter(|item| item.name.to_lowercase().contains(&query))
        .collect()
}

/// What the dashboard list is showing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub filter: ItemFilter,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub search: String,
}

/// Filter, then search, then sort
pub fn dashboard<'a>(items: &'a [Item], query: &DashboardQuery, today: NaiveDate) -> Vec<&'a Item> {
    let filtered = filter_items(items, query.filter, today);
    let mut visible = search_items(&filtered, &query.search);
    sort_items(&mut visible, query.sort, today);
    visible
}

/// Active items that are expired or inside their own notify window,
/// soonest first
pub fn attention_queue(items: &[Item], today: NaiveDate) -> Vec<&Item> {
    let mut queue: Vec<&Item> = items
        .iter()
        .filter(|item| needs_attention(item, today))
        .collect();
    queue.sort_by_key(|item| item.days_left(today));
    queue
}

pub fn needs_attention(item: &Item, today: NaiveDate) -> bool {
    if item.used {
        return false;
    }
    let days = item.days_left(today);
    days < 0 || days <= i64::from(item.notify_days_before)
}

/// Badge count for notifications
pub fn attention_count(items: &[Item], today: NaiveDate) -> usize {
    items.iter().filter(|item| needs_attention(item, today)).count()
}

/// Urgency band of an item; used items have none
pub fn urgency(item: &Item, today: NaiveDate) -> Option<Urgency> {
    if item.used {
        None
    } else {
        Some(Urgency::classify(item.days_left(today)))
    }
}

/// Header counters for the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub active: usize,
    pub expiring: usize,
    pub expired: usize,
    pub used: usize,
    pub attention: usize,
}

pub fn inventory_summary(items: &[Item], today: NaiveDate) -> InventorySummary {
    let mut summary = InventorySummary::default();

    for item in items {
        if item.used {
            summary.used += 1;
            continue;
        }
        summary.active += 1;
        if ItemFilter::Expiring.matches(item, today) {
            summary.expiring += 1;
        }
        if ItemFilter::Expired.matches(item, today) {
            summary.expired += 1;
        }
        if needs_attention(item, today) {
            summary.attention += 1;
        }
    }

    summary
}

/// Time window for statistics, ending today (inclusive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatsPeriod {
    Week,
    #[default]
    Month,
    Year,
    AllTime,
}

impl StatsPeriod {
    fn length_days(&self) -> Option<i64> {
        match self {
            StatsPeriod::Week => Some(WEEK_DAYS),
            StatsPeriod::Month => Some(MONTH_DAYS),
            StatsPeriod::Year => Some(YEAR_DAYS),
            StatsPeriod::AllTime => None,
        }
    }

    /// Whether `date` falls in `(today - length, today]`
    pub fn contains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        match self.length_days() {
            Some(length) => date <= today && date > today - Duration::days(length),
            None => true,
        }
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            "all" | "alltime" => Ok(StatsPeriod::AllTime),
            other => Err(format!("Unknown period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub food: usize,
    pub household: usize,
}

impl CategoryCounts {
    fn record(&mut self, category: Category) {
        match category {
            Category::Food => self.food += 1,
            Category::Household => self.household += 1,
        }
    }
}

/// How an item ended up, for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Used on or before its expiry date
    EffectivelyUsed,
    /// Expired unused, or used after its expiry date
    Wasted,
}

/// Usage and waste aggregate for one period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteStatistics {
    pub used_count: usize,
    pub wasted_count: usize,
    pub used_by_category: CategoryCounts,
    pub wasted_by_category: CategoryCounts,
    /// Names by number of wasted items, most wasted first
    pub most_wasted: Vec<(String, usize)>,
}

impl WasteStatistics {
    /// Share of finished items that were wasted, in percent
    pub fn waste_rate(&self) -> f64 {
        let total = self.used_count + self.wasted_count;
        if total == 0 {
            0.0
        } else {
            self.wasted_count as f64 * 100.0 / total as f64
        }
    }
}

/// Classify an item for statistics within `period`.
///
/// Each item gets at most one outcome. Effectively used items are windowed
/// by their use date, wasted items by their expiry date.
pub fn outcome(item: &Item, period: StatsPeriod, today: NaiveDate) -> Option<Outcome> {
    match item.date_used {
        Some(used_at) if item.used => {
            let used_on = used_at.with_timezone(&Local).date_naive();
            if used_on <= item.expiry_date {
                period
                    .contains(used_on, today)
                    .then_some(Outcome::EffectivelyUsed)
            } else {
                period
                    .contains(item.expiry_date, today)
                    .then_some(Outcome::Wasted)
            }
        }
        _ if !item.used && item.days_left(today) < 0 => period
            .contains(item.expiry_date, today)
            .then_some(Outcome::Wasted),
        _ => None,
    }
}

pub fn waste_statistics(items: &[Item], period: StatsPeriod, today: NaiveDate) -> WasteStatistics {
    let mut stats = WasteStatistics::default();

    for item in items {
        match outcome(item, period, today) {
            Some(Outcome::EffectivelyUsed) => {
                stats.used_count += 1;
                stats.used_by_category.record(item.category);
            }
            Some(Outcome::Wasted) => {
                stats.wasted_count += 1;
                stats.wasted_by_category.record(item.category);
                match stats.most_wasted.iter_mut().find(|(name, _)| *name == item.name) {
                    Some((_, count)) => *count += 1,
                    None => stats.most_wasted.push((item.name.clone(), 1)),
                }
            }
            None => {}
        }
    }

    // Stable: ties stay in first-encountered order
    stats.most_wasted.sort_by(|a, b| b.1.cmp(&a.1));
    stats
}
