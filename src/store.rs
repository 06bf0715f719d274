use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::config::DatabaseConfig;
use crate::extractor::AdSnapshot;
use crate::models::{Subscriber, Subscription, TrackedAd};
use crate::utils::error::{AppError, Result};

/// SQLite-backed repository for tracked ads, subscribers, and their
/// subscriptions. All writes are per-ad row updates; last write wins.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_with(&config.url, config.max_connections).await
    }

    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ads (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                url             TEXT NOT NULL UNIQUE,
                current_price   TEXT,
                currency        TEXT,
                title           TEXT,
                last_checked_at TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL UNIQUE,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                subscriber_id INTEGER NOT NULL REFERENCES subscribers(id) ON DELETE CASCADE,
                ad_id         INTEGER NOT NULL REFERENCES ads(id) ON DELETE CASCADE,
                created_at    TEXT NOT NULL,
                UNIQUE (subscriber_id, ad_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // --- Ads ---

    pub async fn find_ad_by_url(&self, url: &str) -> Result<Option<TrackedAd>> {
        let row = sqlx::query("SELECT * FROM ads WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ad_from_row).transpose()
    }

    pub async fn get_ad(&self, ad_id: i64) -> Result<TrackedAd> {
        let row = sqlx::query("SELECT * FROM ads WHERE id = ?")
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => ad_from_row(&row),
            None => Err(AppError::NotFound {
                resource: format!("ad {}", ad_id),
            }),
        }
    }

    /// Finds the tracked ad for a URL, creating an unresolved row when the
    /// URL is seen for the first time.
    pub async fn upsert_ad_by_url(&self, url: &str) -> Result<TrackedAd> {
        if let Some(ad) = self.find_ad_by_url(url).await? {
            return Ok(ad);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO ads (url, created_at, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_ad_by_url(url).await?.ok_or(AppError::NotFound {
            resource: format!("ad for {}", url),
        })
    }

    /// Persists a fresh snapshot and checked-at timestamp for an ad.
    ///
    /// A snapshot without a title keeps the previously stored title, per
    /// the workflow's no-accidental-overwrite rule.
    pub async fn record_snapshot(
        &self,
        ad_id: i64,
        snapshot: &AdSnapshot,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE ads SET current_price = ?, currency = ?, \
             title = COALESCE(?, title), last_checked_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(snapshot.price.to_string())
        .bind(&snapshot.currency)
        .bind(snapshot.title.as_deref())
        .bind(checked_at)
        .bind(Utc::now())
        .bind(ad_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ads that have at least one active subscriber. Ads nobody watches
    /// are never fetched by the check workflow.
    pub async fn ads_with_subscribers(&self) -> Result<Vec<TrackedAd>> {
        let rows = sqlx::query(
            "SELECT DISTINCT a.* FROM ads a \
             JOIN subscriptions s ON s.ad_id = a.id \
             ORDER BY a.id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ad_from_row).collect()
    }

    // --- Subscribers & subscriptions ---

    pub async fn ensure_subscriber(&self, email: &str, name: &str) -> Result<Subscriber> {
        let existing = sqlx::query_as::<_, Subscriber>(
            "SELECT id, email, name, created_at FROM subscribers WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(subscriber) = existing {
            return Ok(subscriber);
        }

        sqlx::query("INSERT INTO subscribers (email, name, created_at) VALUES (?, ?, ?)")
            .bind(email)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        sqlx::query_as::<_, Subscriber>(
            "SELECT id, email, name, created_at FROM subscribers WHERE email = ?",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn create_subscription(
        &self,
        subscriber_id: i64,
        ad_id: i64,
    ) -> Result<Subscription> {
        let existing = sqlx::query(
            "SELECT id FROM subscriptions WHERE subscriber_id = ? AND ad_id = ?",
        )
        .bind(subscriber_id)
        .bind(ad_id)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(AppError::Validation(
                "You are already subscribed to this ad".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO subscriptions (subscriber_id, ad_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(subscriber_id)
        .bind(ad_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, Subscription>(
            "SELECT id, subscriber_id, ad_id, created_at FROM subscriptions \
             WHERE subscriber_id = ? AND ad_id = ?",
        )
        .bind(subscriber_id)
        .bind(ad_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Removes a (subscriber, ad) pair. When the last subscription of an
    /// ad disappears, the ad row is deleted too; nothing keeps tracking
    /// a URL nobody watches.
    pub async fn remove_subscription(&self, subscriber_id: i64, ad_id: i64) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM subscriptions WHERE subscriber_id = ? AND ad_id = ?",
        )
        .bind(subscriber_id)
        .bind(ad_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("subscription ({}, {})", subscriber_id, ad_id),
            });
        }

        sqlx::query(
            "DELETE FROM ads WHERE id = ? \
             AND NOT EXISTS (SELECT 1 FROM subscriptions WHERE ad_id = ?)",
        )
        .bind(ad_id)
        .bind(ad_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_subscriber(&self, email: &str) -> Result<Option<Subscriber>> {
        sqlx::query_as::<_, Subscriber>(
            "SELECT id, email, name, created_at FROM subscribers WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn subscribers_of(&self, ad_id: i64) -> Result<Vec<Subscriber>> {
        sqlx::query_as::<_, Subscriber>(
            "SELECT u.id, u.email, u.name, u.created_at FROM subscribers u \
             JOIN subscriptions s ON s.subscriber_id = u.id \
             WHERE s.ad_id = ? ORDER BY u.id",
        )
        .bind(ad_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Ads a subscriber is watching, for the `list` command.
    pub async fn ads_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<TrackedAd>> {
        let rows = sqlx::query(
            "SELECT a.* FROM ads a \
             JOIN subscriptions s ON s.ad_id = a.id \
             WHERE s.subscriber_id = ? ORDER BY a.id",
        )
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ad_from_row).collect()
    }
}

/// Prices live in TEXT columns because SQLite has no decimal type; the
/// stored value is the canonical `Decimal` rendering.
fn ad_from_row(row: &SqliteRow) -> Result<TrackedAd> {
    let price_text: Option<String> = row.try_get("current_price")?;
    let current_price = match price_text.as_deref() {
        Some(text) => Some(Decimal::from_str(text).map_err(|e| {
            AppError::Internal(format!("corrupt stored price {:?}: {}", text, e))
        })?),
        None => None,
    };

    Ok(TrackedAd {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        current_price,
        currency: row.try_get("currency")?,
        title: row.try_get("title")?,
        last_checked_at: row.try_get("last_checked_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
