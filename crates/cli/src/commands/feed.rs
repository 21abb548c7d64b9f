//! Product feed checks.

use fresh_market_storefront::feed::FeedClient;
use url::Url;

use super::{CommandError, print_json};

/// Fetch the feed once and print the normalized products.
///
/// # Errors
///
/// Returns error if the feed cannot be fetched or parsed.
pub async fn fetch(url: Url) -> Result<(), CommandError> {
    let client = FeedClient::new(url)?;
    let catalog = client.fetch().await?;

    tracing::info!(
        products = catalog.all().len(),
        visible = catalog.visible().count(),
        categories = ?catalog.categories(),
        "feed fetched"
    );
    print_json(catalog.all())
}
