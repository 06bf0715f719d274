use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::config::ScraperConfig;
use crate::extractor::{self, AdSnapshot};
use crate::utils::error::{AppError, Result};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
                           image/avif,image/webp,image/apng,*/*;q=0.8,\
                           application/signed-exchange;v=b3;q=0.9";

/// Fetches OLX ad pages and runs snapshot extraction over them.
///
/// The HTTP client is built once from an immutable [`ScraperConfig`]:
/// browser-like request identity, redirects followed, fixed per-request
/// timeout. There is no retry policy; a failed fetch fails the check for
/// that ad only.
#[derive(Clone)]
pub struct AdScraper {
    client: reqwest::Client,
    config: ScraperConfig,
}

impl AdScraper {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| AppError::Validation(format!("Invalid user agent: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| AppError::Validation(format!("Invalid accept language: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Fetches the ad page and extracts its snapshot.
    ///
    /// Transport and HTTP-status failures surface as [`AppError::Fetch`]
    /// with the URL and any status/body context; a page that neither pass
    /// of the extractor can resolve surfaces as [`AppError::Unresolved`].
    pub async fn scrape(&self, url: &str) -> Result<AdSnapshot> {
        tracing::info!(url, "attempting to scrape ad page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Fetch {
                url: url.to_string(),
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Fetch {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: body.chars().take(200).collect(),
            });
        }

        let html = response.text().await.map_err(|e| AppError::Fetch {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("failed to read body: {}", e),
        })?;

        extractor::extract(&html).map_err(|_| AppError::Unresolved {
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ScraperConfig {
        ScraperConfig {
            user_agent: "TestAgent/1.0".to_string(),
            accept_language: "uk-UA,uk;q=0.9".to_string(),
            request_timeout: 5,
        }
    }

    const PRODUCT_PAGE: &str = r#"<html><body>
        <script type="application/ld+json">
            {"@type":"Product","name":"Bike","offers":{"price":"150.00","priceCurrency":"UAH"}}
        </script>
    </body></html>"#;

    #[tokio::test]
    async fn test_scrape_resolves_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/d/uk/obyavlenie/velosiped.html"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
            .mount(&server)
            .await;

        let scraper = AdScraper::new(test_config()).unwrap();
        let url = format!("{}/d/uk/obyavlenie/velosiped.html", server.uri());
        let snapshot = scraper.scrape(&url).await.unwrap();

        assert_eq!(snapshot.price, Decimal::from_str("150.00").unwrap());
        assert_eq!(snapshot.currency, "UAH");
        assert_eq!(snapshot.title.as_deref(), Some("Bike"));
    }

    #[tokio::test]
    async fn test_scrape_http_error_is_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("ad gone"))
            .mount(&server)
            .await;

        let scraper = AdScraper::new(test_config()).unwrap();
        let err = scraper.scrape(&server.uri()).await.unwrap_err();

        match err {
            AppError::Fetch { status, message, .. } => {
                assert_eq!(status, Some(404));
                assert!(message.contains("ad gone"));
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scrape_unparseable_page_is_unresolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>nothing</body></html>"),
            )
            .mount(&server)
            .await;

        let scraper = AdScraper::new(test_config()).unwrap();
        let err = scraper.scrape(&server.uri()).await.unwrap_err();
        assert!(matches!(err, AppError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_scrape_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
            .mount(&server)
            .await;

        let scraper = AdScraper::new(test_config()).unwrap();
        let url = format!("{}/old", server.uri());
        let snapshot = scraper.scrape(&url).await.unwrap();
        assert_eq!(snapshot.currency, "UAH");
    }
}
