use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde::Deserialize;
use thiserror::Error;

/// The extracted price/currency/title triple for one check of one ad.
/// Produced fresh on every extraction attempt and never mutated; a new
/// snapshot replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdSnapshot {
    pub price: Decimal,
    pub currency: String,
    pub title: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no price or currency could be resolved")]
    Unresolved,
}

/// Leading numeric run of a whitespace-stripped, comma-normalized price string.
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("invalid regex: price"));

/// Trailing non-numeric, non-whitespace run of the raw price string.
static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\d\s.]+)$").expect("invalid regex: currency"));

/// Classification of one JSON-LD `<script>` block.
///
/// OLX ad pages embed schema.org descriptions of the ad; a block is only
/// usable when it declares a product-like type and carries a complete
/// offer (price and currency). Anything else, including malformed JSON,
/// is unrecognized and skipped.
#[derive(Debug)]
enum StructuredBlock {
    Recognized {
        price: Decimal,
        currency: String,
        title: Option<String>,
    },
    Unrecognized,
}

#[derive(Debug, Deserialize)]
struct RawStructuredData {
    #[serde(rename = "@type")]
    schema_type: Option<String>,
    name: Option<String>,
    offers: Option<RawOffers>,
}

#[derive(Debug, Deserialize)]
struct RawOffers {
    price: Option<RawPrice>,
    #[serde(rename = "priceCurrency")]
    price_currency: Option<String>,
}

/// schema.org allows both `"price": "150.00"` and `"price": 150`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Text(String),
    Number(serde_json::Number),
}

impl RawPrice {
    fn to_decimal(&self) -> Option<Decimal> {
        match self {
            RawPrice::Text(s) => Decimal::from_str(s.trim()).ok(),
            RawPrice::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        }
    }
}

const PRODUCT_TYPES: &[&str] = &["Product", "Offer", "ItemPage"];

fn classify_block(body: &str) -> StructuredBlock {
    let data: RawStructuredData = match serde_json::from_str(body) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!(error = %e, "skipping invalid JSON-LD block");
            return StructuredBlock::Unrecognized;
        }
    };

    let is_product = data
        .schema_type
        .as_deref()
        .is_some_and(|t| PRODUCT_TYPES.contains(&t));
    if !is_product {
        return StructuredBlock::Unrecognized;
    }

    let Some(offers) = data.offers else {
        return StructuredBlock::Unrecognized;
    };
    let price = offers.price.as_ref().and_then(RawPrice::to_decimal);
    match (price, offers.price_currency) {
        (Some(price), Some(currency)) => StructuredBlock::Recognized {
            price,
            currency,
            title: data.name,
        },
        _ => StructuredBlock::Unrecognized,
    }
}

/// Parses a raw price-container string such as `"1 234,56 грн"` into its
/// numeric and currency parts. Whitespace is stripped and the decimal
/// comma converted to a point before the numeric match; the currency is
/// the trailing symbol run of the raw string.
fn parse_price_text(raw: &str) -> (Option<Decimal>, Option<String>) {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let price = PRICE_RE
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok());

    let currency = CURRENCY_RE
        .captures(raw.trim_end())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    (price, currency)
}

fn element_text(element: scraper::ElementRef) -> String {
    element.text().collect::<String>()
}

/// Extracts a price snapshot from a fetched OLX ad page.
///
/// Two passes, first success wins:
/// 1. JSON-LD `<script>` blocks in document order; malformed blocks are
///    skipped, never fatal.
/// 2. The `[data-testid="ad-price-container"]` / `ad-title-container`
///    markup, with comma-to-point normalization of the price text.
///
/// A snapshot is returned only when one pass resolved both price and
/// currency; the title may come from whichever pass found it.
pub fn extract(html: &str) -> Result<AdSnapshot, ExtractError> {
    let document = Html::parse_document(html);

    // --- Pass 1: JSON-LD structured data, the most reliable source ---
    let json_ld = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    for script in document.select(&json_ld) {
        let body = script.text().collect::<String>();
        if let StructuredBlock::Recognized {
            price,
            currency,
            title,
        } = classify_block(&body)
        {
            tracing::debug!(%price, %currency, "price resolved from JSON-LD");
            return Ok(AdSnapshot {
                price,
                currency,
                title,
            });
        }
    }

    tracing::debug!("no usable JSON-LD block, falling back to markup selectors");

    // --- Pass 2: markup fallback, tied to current OLX page structure ---
    let price_selector = Selector::parse(r#"[data-testid="ad-price-container"] span"#).unwrap();
    let (mut price, mut currency) = (None, None);
    if let Some(node) = document.select(&price_selector).next() {
        let raw = element_text(node);
        (price, currency) = parse_price_text(&raw);
        tracing::debug!(raw = %raw.trim(), "price container text");
    } else {
        tracing::debug!("price container not found in markup");
    }

    let title_selector = Selector::parse(r#"[data-testid="ad-title-container"]"#).unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(|node| element_text(node).trim().to_string())
        .filter(|t| !t.is_empty());

    match (price, currency) {
        (Some(price), Some(currency)) => Ok(AdSnapshot {
            price,
            currency,
            title,
        }),
        _ => Err(ExtractError::Unresolved),
    }
}
