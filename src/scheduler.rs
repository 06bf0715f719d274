use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::checker::PriceChecker;
use crate::config::is_valid_cron;
use crate::utils::error::{AppError, Result};

/// Runs the check workflow on a cron schedule.
///
/// One job, one checker; an in-flight guard skips a tick when the
/// previous run has not finished yet, so checks never overlap.
pub struct CheckScheduler {
    scheduler: JobScheduler,
    checker: Arc<PriceChecker>,
    schedule: String,
}

impl CheckScheduler {
    pub async fn new(checker: Arc<PriceChecker>, schedule: &str) -> Result<Self> {
        if !is_valid_cron(schedule) {
            return Err(AppError::Validation(format!(
                "Invalid cron expression: {}",
                schedule
            )));
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("scheduler setup failed: {}", e)))?;

        Ok(Self {
            scheduler,
            checker,
            schedule: schedule.to_string(),
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let checker = Arc::clone(&self.checker);
        let in_flight = Arc::new(AtomicBool::new(false));

        // tokio-cron-scheduler expects a seconds field in front of the
        // standard 5-field expression.
        let expression = format!("0 {}", self.schedule);
        let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let checker = Arc::clone(&checker);
            let in_flight = Arc::clone(&in_flight);

            Box::pin(async move {
                if in_flight.swap(true, Ordering::SeqCst) {
                    tracing::warn!("previous price check still running, skipping this tick");
                    return;
                }

                match checker.run_once().await {
                    Ok(report) => tracing::info!(
                        ads_checked = report.ads_checked,
                        notifications_sent = report.notifications_sent,
                        "scheduled price check completed"
                    ),
                    Err(e) => tracing::error!(error = %e, "scheduled price check failed"),
                }

                in_flight.store(false, Ordering::SeqCst);
            })
        })
        .map_err(|e| AppError::Internal(format!("failed to create cron job: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("failed to register cron job: {}", e)))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("failed to start scheduler: {}", e)))?;

        tracing::info!(schedule = %self.schedule, "price check scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("scheduler shutdown failed: {}", e)))?;
        tracing::info!("price check scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckerConfig, ScraperConfig};
    use crate::notifier::{Notifier, PriceChangeEvent};
    use crate::scraper::AdScraper;
    use crate::store::Store;
    use async_trait::async_trait;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _event: &PriceChangeEvent) -> crate::Result<()> {
            Ok(())
        }
    }

    async fn test_checker() -> (Arc<PriceChecker>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("sched.db").display());
        let store = Store::connect_with(&url, 1).await.unwrap();
        let scraper = AdScraper::new(ScraperConfig {
            user_agent: "TestAgent/1.0".to_string(),
            accept_language: "uk-UA".to_string(),
            request_timeout: 5,
        })
        .unwrap();
        let config = CheckerConfig {
            notify_only_on_change: true,
            schedule: "*/5 * * * *".to_string(),
        };
        let checker = Arc::new(PriceChecker::new(store, scraper, Arc::new(NullNotifier), &config));
        (checker, dir)
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected() {
        let (checker, _dir) = test_checker().await;
        let result = CheckScheduler::new(checker, "not a cron").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (checker, _dir) = test_checker().await;
        let mut scheduler = CheckScheduler::new(checker, "0 0 * * *").await.unwrap();
        scheduler.start().await.unwrap();
        scheduler.shutdown().await.unwrap();
    }
}
