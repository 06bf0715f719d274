use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A notification recipient, uniquely keyed by e-mail address.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Interest of one subscriber in one tracked ad.
///
/// The (subscriber, ad) pair is unique: a subscriber cannot subscribe
/// twice to the same ad.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub subscriber_id: i64,
    pub ad_id: i64,
    pub created_at: DateTime<Utc>,
}
