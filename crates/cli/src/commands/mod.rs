//! Command implementations.

pub mod cache;
pub mod demo;
pub mod feed;
pub mod password;

use fresh_market_admin::AdminError;
use fresh_market_storefront::SyncError;
use fresh_market_storefront::auth::AuthError;
use fresh_market_storefront::cache::CacheError;
use fresh_market_storefront::feed::FeedError;
use fresh_market_storefront::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Feed(#[from] FeedError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Admin(#[from] AdminError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CommandError> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}
