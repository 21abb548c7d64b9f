//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `FRESH_MARKET_APP_ID` - Application id scoping every store path
//!   (default: `default-fresh-market`, see [`sanitize_app_id`])
//! - `FRESH_MARKET_FEED_URL` - Spreadsheet product feed; when set it replaces
//!   the store catalog as the product source
//! - `FRESH_MARKET_FEED_POLL_SECS` - Feed poll interval (default: 60)
//! - `FRESH_MARKET_CACHE_DIR` - Directory for the offline member cache
//!   (default: `.fresh-market`)
//! - `FRESH_MARKET_WRITE_ATTEMPTS` - Store write attempts before a write is
//!   reported as failed (default: 5)
//! - `FRESH_MARKET_RETRY_INITIAL_MS` - First retry delay (default: 200)
//! - `FRESH_MARKET_RETRY_MAX_MS` - Retry delay cap (default: 5000)
//! - `FRESH_MARKET_AUTH_TOKEN` - Custom sign-in token; anonymous sign-in is
//!   used when absent
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::sync::RetryPolicy;

/// App id used when the configured one is missing or unusable.
pub const DEFAULT_APP_ID: &str = "default-fresh-market";

const DEFAULT_FEED_POLL_SECS: u64 = 60;
const DEFAULT_CACHE_DIR: &str = ".fresh-market";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront sync layer configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Sanitized application id
    pub app_id: String,
    /// Product feed, if the catalog comes from a spreadsheet
    pub feed: Option<FeedConfig>,
    /// Directory holding the offline member cache
    pub cache_dir: PathBuf,
    /// Backoff policy for store writes
    pub retry: RetryPolicy,
    /// Custom sign-in token
    pub auth_token: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("app_id", &self.app_id)
            .field("feed", &self.feed)
            .field("cache_dir", &self.cache_dir)
            .field("retry", &self.retry)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sentry_dsn", &self.sentry_dsn)
            .finish()
    }
}

/// Spreadsheet product feed settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: Url,
    pub poll_interval: Duration,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            feed: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            retry: RetryPolicy::default(),
            auth_token: None,
            sentry_dsn: None,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let app_id = lookup("FRESH_MARKET_APP_ID")
            .map_or_else(|| DEFAULT_APP_ID.to_string(), |raw| sanitize_app_id(&raw));

        let feed = match lookup("FRESH_MARKET_FEED_URL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => {
                let url = Url::parse(raw.trim()).map_err(|e| {
                    ConfigError::InvalidEnvVar("FRESH_MARKET_FEED_URL".to_string(), e.to_string())
                })?;
                let secs = parse_or_default(&lookup, "FRESH_MARKET_FEED_POLL_SECS", DEFAULT_FEED_POLL_SECS)?;
                if secs == 0 {
                    return Err(ConfigError::InvalidEnvVar(
                        "FRESH_MARKET_FEED_POLL_SECS".to_string(),
                        "must be at least 1".to_string(),
                    ));
                }
                Some(FeedConfig {
                    url,
                    poll_interval: Duration::from_secs(secs),
                })
            }
            None => None,
        };

        let cache_dir = PathBuf::from(
            lookup("FRESH_MARKET_CACHE_DIR").unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()),
        );

        let defaults = RetryPolicy::default();
        let max_attempts = parse_or_default(&lookup, "FRESH_MARKET_WRITE_ATTEMPTS", defaults.max_attempts)?;
        let initial_ms = parse_or_default(
            &lookup,
            "FRESH_MARKET_RETRY_INITIAL_MS",
            duration_ms(defaults.initial_backoff),
        )?;
        let max_ms = parse_or_default(
            &lookup,
            "FRESH_MARKET_RETRY_MAX_MS",
            duration_ms(defaults.max_backoff),
        )?;
        if max_ms < initial_ms {
            return Err(ConfigError::InvalidEnvVar(
                "FRESH_MARKET_RETRY_MAX_MS".to_string(),
                format!("must not be below FRESH_MARKET_RETRY_INITIAL_MS ({initial_ms})"),
            ));
        }
        let retry = RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_ms),
            max_backoff: Duration::from_millis(max_ms),
        };

        let auth_token = lookup("FRESH_MARKET_AUTH_TOKEN")
            .filter(|v| !v.is_empty())
            .map(SecretString::from);
        let sentry_dsn = lookup("SENTRY_DSN").filter(|v| !v.is_empty());

        Ok(Self {
            app_id,
            feed,
            cache_dir,
            retry,
            auth_token,
            sentry_dsn,
        })
    }
}

/// Reduce a raw runtime app id to the path-safe segment used in the store.
///
/// Keeps the part before the first `/`, then at most the first two
/// `_`-separated pieces. Ids that do not carry the `c_` marker fall back to
/// [`DEFAULT_APP_ID`].
///
/// ```
/// use fresh_market_storefront::config::sanitize_app_id;
///
/// assert_eq!(sanitize_app_id("c_abc123_extra/path"), "c_abc123");
/// assert_eq!(sanitize_app_id("something-else"), "default-fresh-market");
/// ```
#[must_use]
pub fn sanitize_app_id(raw: &str) -> String {
    let first = raw.split('/').next().unwrap_or_default();
    let segment = first.split('_').take(2).collect::<Vec<_>>().join("_");
    if segment.contains("c_") {
        segment
    } else {
        DEFAULT_APP_ID.to_string()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        _ => Ok(default),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
