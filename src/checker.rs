use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CheckerConfig;
use crate::models::TrackedAd;
use crate::notifier::{Notifier, PriceChangeEvent};
use crate::scraper::AdScraper;
use crate::store::Store;
use crate::utils::error::Result;

/// Outcome counters for one check run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRunReport {
    pub ads_checked: usize,
    pub ads_succeeded: usize,
    pub ads_skipped: usize,
    pub changes_detected: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub total_time_ms: u64,
}

/// The change-detection workflow: scrape every ad somebody watches,
/// persist the fresh snapshot, and notify subscribers.
///
/// Processing is batch-sequential: one fetch at a time, one delivery at
/// a time, no retries and no partial-batch resume. A re-run is
/// idempotent at the snapshot level (last write wins); whether it
/// re-notifies depends on the `notify_only_on_change` policy.
pub struct PriceChecker {
    store: Store,
    scraper: AdScraper,
    notifier: Arc<dyn Notifier>,
    notify_only_on_change: bool,
}

impl PriceChecker {
    pub fn new(
        store: Store,
        scraper: AdScraper,
        notifier: Arc<dyn Notifier>,
        config: &CheckerConfig,
    ) -> Self {
        Self {
            store,
            scraper,
            notifier,
            notify_only_on_change: config.notify_only_on_change,
        }
    }

    /// Runs one full check cycle over all ads with at least one
    /// subscriber. Per-ad scrape failures and per-recipient delivery
    /// failures are logged and counted; only a persistence failure
    /// aborts the run.
    pub async fn run_once(&self) -> Result<CheckRunReport> {
        let started = Instant::now();
        let mut report = CheckRunReport::default();

        tracing::info!("price check started");

        let ads = self.store.ads_with_subscribers().await?;
        if ads.is_empty() {
            tracing::info!("no ads with active subscriptions, skipping price check");
            return Ok(report);
        }

        for ad in &ads {
            report.ads_checked += 1;
            self.check_ad(ad, &mut report).await?;
        }

        report.total_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            ads_checked = report.ads_checked,
            ads_skipped = report.ads_skipped,
            changes_detected = report.changes_detected,
            notifications_sent = report.notifications_sent,
            notifications_failed = report.notifications_failed,
            "price check finished"
        );
        Ok(report)
    }

    async fn check_ad(&self, ad: &TrackedAd, report: &mut CheckRunReport) -> Result<()> {
        let snapshot = match self.scraper.scrape(&ad.url).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Stored snapshot stays untouched; the ad gets another
                // chance on the next run.
                tracing::warn!(url = %ad.url, error = %e, "scrape failed, skipping update");
                report.ads_skipped += 1;
                return Ok(());
            }
        };

        let changed = ad.has_changed(&snapshot);
        self.store.record_snapshot(ad.id, &snapshot, Utc::now()).await?;
        report.ads_succeeded += 1;

        if changed {
            report.changes_detected += 1;
            tracing::info!(
                url = %ad.url,
                old_price = ?ad.current_price,
                new_price = %snapshot.price,
                "ad data changed"
            );
        }

        let should_notify = changed || !self.notify_only_on_change;
        if !should_notify {
            tracing::debug!(url = %ad.url, "ad data unchanged, not notifying");
            return Ok(());
        }

        let title = snapshot
            .title
            .clone()
            .or_else(|| ad.title.clone())
            .unwrap_or_else(|| "Unknown Title".to_string());

        for subscriber in self.store.subscribers_of(ad.id).await? {
            let event = PriceChangeEvent {
                ad_url: ad.url.clone(),
                ad_title: title.clone(),
                old_price: ad.current_price,
                new_price: snapshot.price,
                currency: snapshot.currency.clone(),
                recipient_email: subscriber.email.clone(),
                recipient_name: subscriber.name.clone(),
            };

            match self.notifier.notify(&event).await {
                Ok(()) => report.notifications_sent += 1,
                Err(e) => {
                    // One bad recipient must not block the rest.
                    tracing::error!(
                        recipient = %subscriber.email,
                        url = %ad.url,
                        error = %e,
                        "failed to send notification"
                    );
                    report.notifications_failed += 1;
                }
            }
        }

        Ok(())
    }
}
