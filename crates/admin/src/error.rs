//! Unified error handling for the back office.

use fresh_market_core::OrderStatus;
use fresh_market_storefront::auth::AuthError;
use fresh_market_storefront::cache::CacheError;
use fresh_market_storefront::feed::FeedError;
use fresh_market_storefront::store::StoreError;
use thiserror::Error;

/// Back office error type.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Sign-in or credential handling failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Document store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Local member cache could not be read or written.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Product feed import failed.
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Order status change not allowed.
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl AdminError {
    /// Send unexpected failures to Sentry. Input and permission errors are
    /// expected and only logged by the caller.
    pub fn report(&self) {
        if matches!(self, Self::Store(_) | Self::Cache(_) | Self::Feed(_)) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Back office error"
            );
        }
    }
}

/// Result type alias for back office operations.
pub type Result<T> = std::result::Result<T, AdminError>;

/// Set the Sentry user context for a signed-in operator.
pub fn set_sentry_user(operator: &str, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(operator.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_error_display() {
        let err = AdminError::NotFound("order o-1".to_string());
        assert_eq!(err.to_string(), "Not found: order o-1");

        let err = AdminError::InvalidTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Processing,
        };
        assert_eq!(err.to_string(), "Order cannot move from Completed to Processing");
    }

    #[test]
    fn test_auth_errors_convert() {
        let err: AdminError = AuthError::AccountDisabled.into();
        assert!(matches!(err, AdminError::Auth(AuthError::AccountDisabled)));
    }
}
