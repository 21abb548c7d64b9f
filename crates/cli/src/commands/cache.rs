//! Member cache inspection.

use std::path::Path;

use fresh_market_storefront::cache::MemberCache;

use super::{CommandError, print_json};

/// Print the cached member list from `dir`.
///
/// # Errors
///
/// Returns error if the cache file exists but cannot be read.
pub async fn show(dir: &Path) -> Result<(), CommandError> {
    let cache = MemberCache::in_dir(dir);
    let members = cache.load().await?;
    tracing::info!(path = %cache.path().display(), members = members.len(), "member cache loaded");
    print_json(&members)
}
