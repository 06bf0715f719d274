use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::extractor::AdSnapshot;

/// A tracked OLX ad, uniquely keyed by URL.
///
/// Created on the first subscription to a URL, updated by each check
/// cycle, and deleted when the last subscriber removes interest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedAd {
    pub id: i64,
    pub url: String,
    pub current_price: Option<Decimal>,
    pub currency: Option<String>,
    pub title: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedAd {
    /// A stored snapshot is usable only when price and currency are both
    /// present; anything less leaves the ad unresolved.
    pub fn is_resolved(&self) -> bool {
        self.current_price.is_some() && self.currency.is_some()
    }

    /// Whether a freshly extracted snapshot differs from the stored one.
    ///
    /// An unresolved ad is never treated as changed: its first successful
    /// check seeds the baseline. A snapshot without a title keeps the old
    /// title, so a missing title is not a change either.
    pub fn has_changed(&self, snapshot: &AdSnapshot) -> bool {
        if !self.is_resolved() {
            return false;
        }
        if self.current_price.as_ref() != Some(&snapshot.price) {
            return true;
        }
        if self.currency.as_deref() != Some(snapshot.currency.as_str()) {
            return true;
        }
        match &snapshot.title {
            Some(title) => self.title.as_deref() != Some(title.as_str()),
            None => false,
        }
    }
}
