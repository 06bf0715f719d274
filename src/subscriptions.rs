use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::models::{Subscriber, TrackedAd};
use crate::scraper::AdScraper;
use crate::store::Store;
use crate::utils::error::{AppError, Result};

/// OLX listing URLs look like `https://www.olx.ua/d/<slug>.html` (or a
/// trailing slash). Anything else is rejected before we touch the network.
static AD_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https://www\.olx\.ua/d/.+?(\.html|/)$").expect("valid ad URL regex")
});

pub fn validate_ad_url(raw: &str) -> Result<()> {
    url::Url::parse(raw)
        .map_err(|e| AppError::Validation(format!("Not a valid URL: {}", e)))?;
    if AD_URL_RE.is_match(raw) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Not a valid OLX ad URL: {}",
            raw
        )))
    }
}

/// Manages who watches what.
///
/// Subscribing to a URL nobody tracks yet scrapes it once to seed the
/// stored snapshot; a page we cannot extract a price from is refused
/// rather than tracked blind.
pub struct SubscriptionManager {
    store: Store,
    scraper: AdScraper,
}

impl SubscriptionManager {
    pub fn new(store: Store, scraper: AdScraper) -> Self {
        Self { store, scraper }
    }

    pub async fn subscribe(&self, email: &str, name: &str, url: &str) -> Result<TrackedAd> {
        let subscriber = self.store.ensure_subscriber(email, name).await?;

        let ad = match self.store.find_ad_by_url(url).await? {
            Some(ad) => ad,
            None => {
                // Scrape before inserting so a dead or unresolvable page
                // never leaves an ad row behind.
                let snapshot = self.scraper.scrape(url).await?;
                let ad = self.store.upsert_ad_by_url(url).await?;
                self.store.record_snapshot(ad.id, &snapshot, Utc::now()).await?;
                self.store.get_ad(ad.id).await?
            }
        };

        self.store.create_subscription(subscriber.id, ad.id).await?;
        tracing::info!(email = %email, url = %url, "subscription created");
        Ok(ad)
    }

    pub async fn unsubscribe(&self, email: &str, url: &str) -> Result<()> {
        let subscriber = self.require_subscriber(email).await?;
        let ad = self
            .store
            .find_ad_by_url(url)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("ad for {}", url),
            })?;

        self.store.remove_subscription(subscriber.id, ad.id).await?;
        tracing::info!(email = %email, url = %url, "subscription removed");
        Ok(())
    }

    pub async fn list(&self, email: &str) -> Result<Vec<TrackedAd>> {
        let subscriber = self.require_subscriber(email).await?;
        self.store.ads_for_subscriber(subscriber.id).await
    }

    async fn require_subscriber(&self, email: &str) -> Result<Subscriber> {
        self.store
            .find_subscriber(email)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("subscriber {}", email),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScraperConfig;
    use rstest::rstest;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[rstest]
    #[case("https://www.olx.ua/d/uk/obyavlenie/velosiped-IDabc.html", true)]
    #[case("https://www.olx.ua/d/obyavlenie/sofa/", true)]
    #[case("HTTPS://WWW.OLX.UA/D/OBYAVLENIE/SOFA.HTML", true)]
    #[case("https://www.olx.ua/uk/obyavlenie/velosiped.html", false)]
    #[case("https://olx.ua/d/obyavlenie/velosiped.html", false)]
    #[case("https://www.olx.ua/d/", false)]
    #[case("http://www.olx.ua/d/obyavlenie/velosiped.html", false)]
    #[case("not a url", false)]
    fn test_validate_ad_url(#[case] url: &str, #[case] valid: bool) {
        assert_eq!(validate_ad_url(url).is_ok(), valid);
    }

    const PRODUCT_PAGE: &str = r#"
        <html><head>
        <script type="application/ld+json">
        {"@type": "Product", "name": "Bike",
         "offers": {"price": "150.00", "priceCurrency": "UAH"}}
        </script>
        </head><body></body></html>
    "#;

    async fn test_manager() -> (SubscriptionManager, Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("subs.db").display());
        let store = Store::connect_with(&url, 2).await.unwrap();
        let scraper = AdScraper::new(ScraperConfig {
            user_agent: "TestAgent/1.0".to_string(),
            accept_language: "uk-UA".to_string(),
            request_timeout: 5,
        })
        .unwrap();
        (SubscriptionManager::new(store.clone(), scraper), store, dir)
    }

    #[tokio::test]
    async fn test_subscribe_new_url_seeds_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ad.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
            .mount(&server)
            .await;

        let (manager, store, _dir) = test_manager().await;
        let ad = manager
            .subscribe("alice@example.com", "Alice", &format!("{}/ad.html", server.uri()))
            .await
            .unwrap();

        assert!(ad.is_resolved());
        assert_eq!(ad.title.as_deref(), Some("Bike"));
        assert_eq!(store.ads_with_subscribers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_existing_ad_skips_scrape() {
        // No mock server at all: an already-tracked URL must not be fetched.
        let (manager, store, _dir) = test_manager().await;
        store
            .upsert_ad_by_url("https://www.olx.ua/d/obyavlenie/sofa.html")
            .await
            .unwrap();

        let ad = manager
            .subscribe(
                "alice@example.com",
                "Alice",
                "https://www.olx.ua/d/obyavlenie/sofa.html",
            )
            .await
            .unwrap();
        assert!(!ad.is_resolved());
    }

    #[tokio::test]
    async fn test_subscribe_unresolvable_page_leaves_no_ad() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let (manager, store, _dir) = test_manager().await;
        let url = format!("{}/empty.html", server.uri());
        let err = manager
            .subscribe("alice@example.com", "Alice", &url)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unresolved { .. }));
        assert!(store.find_ad_by_url(&url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ad.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
            .mount(&server)
            .await;

        let (manager, _store, _dir) = test_manager().await;
        let url = format!("{}/ad.html", server.uri());
        manager.subscribe("alice@example.com", "Alice", &url).await.unwrap();

        let err = manager
            .subscribe("alice@example.com", "Alice", &url)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ad.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
            .mount(&server)
            .await;

        let (manager, _store, _dir) = test_manager().await;
        let url = format!("{}/ad.html", server.uri());
        manager.subscribe("alice@example.com", "Alice", &url).await.unwrap();

        assert_eq!(manager.list("alice@example.com").await.unwrap().len(), 1);

        manager.unsubscribe("alice@example.com", &url).await.unwrap();
        assert!(manager.list("alice@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_subscriber() {
        let (manager, _store, _dir) = test_manager().await;
        let err = manager
            .unsubscribe("ghost@example.com", "https://www.olx.ua/d/obyavlenie/x.html")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
