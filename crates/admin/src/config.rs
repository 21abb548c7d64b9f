//! Back office configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! Everything read by [`StorefrontConfig`], plus:
//!
//! ## Optional
//! - `FRESH_MARKET_ADMIN_PASSWORD_HASH` - Argon2 PHC hash of the shared
//!   back office password (generate with `fm-cli hash-password`). Without
//!   it only members with the admin role can sign in.

use argon2::password_hash::PasswordHash as PhcString;
use fresh_market_core::PasswordHash;
use fresh_market_storefront::StorefrontConfig;
use fresh_market_storefront::config::ConfigError;
use secrecy::{ExposeSecret, SecretString};

const ADMIN_PASSWORD_HASH: &str = "FRESH_MARKET_ADMIN_PASSWORD_HASH";

/// Back office configuration.
#[derive(Clone)]
pub struct AdminConfig {
    /// Store, cache, and retry settings shared with the storefront
    pub storefront: StorefrontConfig,
    /// Shared admin password hash (PHC string)
    pub admin_password_hash: Option<SecretString>,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("storefront", &self.storefront)
            .field(
                "admin_password_hash",
                &self.admin_password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, including
    /// an admin password hash that is not a PHC string.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storefront = StorefrontConfig::from_lookup(&lookup)?;

        let admin_password_hash = match lookup(ADMIN_PASSWORD_HASH).filter(|v| !v.trim().is_empty()) {
            Some(raw) => {
                let raw = raw.trim().to_string();
                PhcString::new(&raw).map_err(|e| {
                    ConfigError::InsecureSecret(
                        ADMIN_PASSWORD_HASH.to_string(),
                        format!("must be a PHC hash, not a password ({e})"),
                    )
                })?;
                Some(SecretString::from(raw))
            }
            None => None,
        };

        Ok(Self {
            storefront,
            admin_password_hash,
        })
    }

    /// The configured admin password hash.
    #[must_use]
    pub fn password_hash(&self) -> Option<PasswordHash> {
        self.admin_password_hash
            .as_ref()
            .and_then(|secret| PasswordHash::from_phc(secret.expose_secret()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use fresh_market_storefront::auth::hash_password;

    use super::*;

    fn lookup_from(pairs: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, String> = pairs.into_iter().collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_accepts_phc_hash() {
        let hash = hash_password("correct horse").unwrap();
        let config =
            AdminConfig::from_lookup(lookup_from(vec![(ADMIN_PASSWORD_HASH, hash.as_str().to_string())]))
                .unwrap();
        assert_eq!(config.password_hash().unwrap(), hash);
        assert!(format!("{config:?}").contains("[REDACTED]"));
        assert!(!format!("{config:?}").contains("argon2"));
    }

    #[test]
    fn test_rejects_plaintext_password() {
        let err = AdminConfig::from_lookup(lookup_from(vec![(
            ADMIN_PASSWORD_HASH,
            "hunter22".to_string(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(..)));
    }

    #[test]
    fn test_hash_is_optional() {
        let config = AdminConfig::from_lookup(lookup_from(vec![])).unwrap();
        assert!(config.password_hash().is_none());
    }
}
