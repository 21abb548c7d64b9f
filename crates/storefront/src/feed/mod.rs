//! Spreadsheet product feed.
//!
//! The catalog can be maintained in a published spreadsheet instead of the
//! store. [`FeedClient`] fetches its JSON rows and [`normalize_rows`] turns
//! them into products, filling in defaults for missing cells.
//! [`FeedPoller`] refetches on an interval and publishes each good catalog;
//! a failed fetch leaves the last good catalog in place.

use std::time::Duration;

use fresh_market_core::catalog::{DEFAULT_CATEGORY, DEFAULT_UNIT, icon_for_category};
use fresh_market_core::{Catalog, Price, Product, ProductId};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::config::FeedConfig;

/// Per-request timeout for feed fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Shortest poll interval `FeedPoller::spawn` will use.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that can occur when fetching the product feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed answered with a non-success status.
    #[error("feed returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The body was not a row list.
    #[error("unexpected feed shape: {0}")]
    Shape(String),
}

/// Client for the product feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: Url,
}

impl FeedClient {
    /// Create a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(url: Url) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch and normalize the current rows.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the status is not successful, or
    /// the body is not a row list.
    pub async fn fetch(&self) -> Result<Catalog, FeedError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        let products = normalize_rows(body)?;
        tracing::debug!(url = %self.url, products = products.len(), "feed fetched");
        Ok(Catalog::new(products))
    }
}

/// Normalize feed rows into products.
///
/// Accepts a bare array of row objects or an object holding one under
/// `rows`, `data`, or `products`. Column names are matched without regard
/// to case. Rows without an id are skipped; other missing cells take
/// defaults (price 0, unit `件`, category `未分類`, icon by category).
///
/// # Errors
///
/// Returns [`FeedError::Shape`] if no row array is found.
pub fn normalize_rows(body: Value) -> Result<Vec<Product>, FeedError> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(mut fields) => ["rows", "data", "products"]
            .iter()
            .find_map(|key| match fields.remove(*key) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| FeedError::Shape("object without a rows array".to_string()))?,
        other => return Err(FeedError::Shape(format!("expected rows, got {other}"))),
    };

    Ok(rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match row {
            Value::Object(cells) => normalize_row(index, &lowercase_keys(cells)),
            _ => {
                tracing::warn!(row = index, "skipping non-object feed row");
                None
            }
        })
        .collect())
}

fn lowercase_keys(cells: Map<String, Value>) -> Map<String, Value> {
    cells
        .into_iter()
        .map(|(key, value)| (key.trim().to_lowercase(), value))
        .collect()
}

fn normalize_row(index: usize, cells: &Map<String, Value>) -> Option<Product> {
    let Some(id) = text(cells, "id") else {
        tracing::warn!(row = index, "skipping feed row without id");
        return None;
    };
    let category = text(cells, "category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let icon = text(cells, "icon").unwrap_or_else(|| icon_for_category(&category).to_string());

    Some(Product {
        name: text(cells, "name").unwrap_or_else(|| id.clone()),
        price: price(index, cells.get("price")),
        unit: text(cells, "unit").unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        stock: cells.get("stock").and_then(whole_number),
        enabled: cells.get("enabled").is_none_or(truthy),
        id: ProductId::new(id),
        category,
        icon,
    })
}

/// A non-blank cell as trimmed text. Numbers are accepted as text.
fn text(cells: &Map<String, Value>, key: &str) -> Option<String> {
    match cells.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn price(index: usize, cell: Option<&Value>) -> Price {
    let amount = match cell {
        Some(Value::Number(n)) => n.to_string().parse::<Decimal>().ok(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<Decimal>().ok(),
        _ => return Price::ZERO,
    };
    match amount.map(Price::new) {
        Some(Ok(price)) => price,
        _ => {
            tracing::warn!(row = index, "invalid price in feed row, using 0");
            Price::ZERO
        }
    }
}

fn whole_number(cell: &Value) -> Option<u32> {
    match cell {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(cell: &Value) -> bool {
    match cell {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "false" | "0" | "no" | "n" | "off" | "停用"
        ),
        _ => true,
    }
}

// ===== Polling =====

/// Polls the feed in the background and publishes each good catalog.
///
/// Dropping the poller stops it.
#[derive(Debug)]
pub struct FeedPoller {
    task: JoinHandle<()>,
    updates: watch::Receiver<Option<Catalog>>,
}

impl FeedPoller {
    /// Start polling with the configured URL and interval.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        Ok(Self::spawn(FeedClient::new(config.url.clone())?, config.poll_interval))
    }

    /// Start polling `client` every `interval`. The first fetch happens
    /// immediately. Intervals shorter than 10ms are raised to 10ms.
    #[must_use]
    pub fn spawn(client: FeedClient, interval: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let (tx, updates) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match client.fetch().await {
                    Ok(catalog) => {
                        let changed = tx.send_if_modified(|current| {
                            if current.as_ref() == Some(&catalog) {
                                false
                            } else {
                                *current = Some(catalog);
                                true
                            }
                        });
                        if changed {
                            tracing::info!(url = %client.url(), "feed catalog updated");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(url = %client.url(), error = %e, "feed fetch failed, keeping last catalog");
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });
        Self { task, updates }
    }

    /// Subscribe to published catalogs. `None` until the first good fetch.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Catalog>> {
        self.updates.clone()
    }

    /// The last good catalog.
    #[must_use]
    pub fn latest(&self) -> Option<Catalog> {
        self.updates.borrow().clone()
    }
}

impl Drop for FeedPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
