//! Client-side faceted filtering over a fetched catalog snapshot.
//!
//! Everything here is pure: inputs are never mutated and results preserve the
//! relative order of the input list.

use std::{cmp::Ordering, collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use shared::protocol::CatalogItem;

pub const DEFAULT_PRICE_MIN: u64 = 0;
/// Leaving the upper bound here means "no upper bound".
pub const DEFAULT_PRICE_MAX: u64 = 10_000;
/// Hours assumed for items that carry no duration.
pub const DEFAULT_DURATION_HOURS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationBucket {
    #[serde(rename = "0-2")]
    UpToTwo,
    #[serde(rename = "2-5")]
    TwoToFive,
    #[serde(rename = "5-10")]
    FiveToTen,
    #[serde(rename = "10+")]
    TenPlus,
}

impl DurationBucket {
    pub const ALL: [Self; 4] = [
        Self::UpToTwo,
        Self::TwoToFive,
        Self::FiveToTen,
        Self::TenPlus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::UpToTwo => "0-2",
            Self::TwoToFive => "2-5",
            Self::FiveToTen => "5-10",
            Self::TenPlus => "10+",
        }
    }

    /// Bounded buckets are inclusive on both ends; `10+` is `>= 10`.
    pub fn contains(self, hours: f64) -> bool {
        match self {
            Self::UpToTwo => (0.0..=2.0).contains(&hours),
            Self::TwoToFive => (2.0..=5.0).contains(&hours),
            Self::FiveToTen => (5.0..=10.0).contains(&hours),
            Self::TenPlus => hours >= 10.0,
        }
    }
}

impl fmt::Display for DurationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DurationBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.label() == s.trim())
            .ok_or_else(|| {
                format!("unknown duration bucket '{s}' (expected 0-2, 2-5, 5-10 or 10+)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u64,
    pub max: u64,
}

impl Default for PriceRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_PRICE_MIN,
            max: DEFAULT_PRICE_MAX,
        }
    }
}

impl PriceRange {
    pub fn contains(&self, price: u64) -> bool {
        price >= self.min && (self.max == DEFAULT_PRICE_MAX || price <= self.max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub search_term: String,
    pub category: Option<String>,
    pub level: Option<String>,
    pub price: PriceRange,
    pub duration: Option<DurationBucket>,
}

impl FilterCriteria {
    /// Resets every field, including the search term, in one step.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn active_filter_count(&self) -> usize {
        [
            !self.search_term.is_empty(),
            self.category.is_some(),
            self.level.is_some(),
            self.price != PriceRange::default(),
            self.duration.is_some(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn matches(&self, item: &CatalogItem) -> bool {
        self.matches_search(item)
            && self
                .category
                .as_deref()
                .map_or(true, |category| item.category == category)
            && self.level.as_deref().map_or(true, |level| item.level == level)
            && self
                .duration
                .map_or(true, |bucket| bucket.contains(effective_duration(item)))
            && self.price.contains(item.price)
    }

    fn matches_search(&self, item: &CatalogItem) -> bool {
        if self.search_term.is_empty() {
            return true;
        }
        let term = self.search_term.to_lowercase();
        item.title.to_lowercase().contains(&term)
            || item.description.to_lowercase().contains(&term)
            || item
                .instructor_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&term))
    }
}

pub fn effective_duration(item: &CatalogItem) -> f64 {
    item.duration.unwrap_or(DEFAULT_DURATION_HOURS)
}

/// Distinct, non-empty facet values in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub levels: Vec<String>,
    pub instructors: Vec<String>,
}

pub fn derive_filter_options(items: &[CatalogItem]) -> FilterOptions {
    FilterOptions {
        categories: distinct(items.iter().map(|item| item.category.as_str())),
        levels: distinct(items.iter().map(|item| item.level.as_str())),
        instructors: distinct(items.iter().filter_map(|item| item.instructor_name.as_deref())),
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|value| !value.is_empty() && seen.insert(*value))
        .map(str::to_string)
        .collect()
}

pub fn apply_filters<'a>(
    items: &'a [CatalogItem],
    criteria: &FilterCriteria,
) -> Vec<&'a CatalogItem> {
    items.iter().filter(|item| criteria.matches(item)).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    /// Keeps the server's order.
    #[default]
    Relevance,
    Title,
    PriceLowToHigh,
    PriceHighToLow,
    Duration,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "title" => Ok(Self::Title),
            "price" | "price-low-to-high" => Ok(Self::PriceLowToHigh),
            "price-desc" | "price-high-to-low" => Ok(Self::PriceHighToLow),
            "duration" => Ok(Self::Duration),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

/// Stable sort; ties keep their filtered order.
pub fn sort_items(items: &mut [&CatalogItem], key: SortKey) {
    match key {
        SortKey::Relevance => {}
        SortKey::Title => items.sort_by_cached_key(|item| item.title.to_lowercase()),
        SortKey::PriceLowToHigh => items.sort_by_key(|item| item.price),
        SortKey::PriceHighToLow => items.sort_by(|a, b| b.price.cmp(&a.price)),
        SortKey::Duration => items.sort_by(|a, b| {
            effective_duration(a)
                .partial_cmp(&effective_duration(b))
                .unwrap_or(Ordering::Equal)
        }),
    }
}

/// Listing-page state: the fetched snapshot plus the user's current criteria.
#[derive(Debug, Clone, Default)]
pub struct CatalogBrowser {
    items: Vec<CatalogItem>,
    options: FilterOptions,
    pub criteria: FilterCriteria,
    pub sort: SortKey,
}

impl CatalogBrowser {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut browser = Self::default();
        browser.replace_items(items);
        browser
    }

    /// Swaps in a fresh snapshot. Criteria are kept.
    pub fn replace_items(&mut self, items: Vec<CatalogItem>) {
        self.options = derive_filter_options(&items);
        self.items = items;
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn visible(&self) -> Vec<&CatalogItem> {
        let mut visible = apply_filters(&self.items, &self.criteria);
        sort_items(&mut visible, self.sort);
        visible
    }

    pub fn clear_filters(&mut self) {
        self.criteria.clear();
    }
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
