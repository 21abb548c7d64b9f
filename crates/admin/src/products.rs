//! Product catalog maintenance.

use std::sync::Arc;

use fresh_market_core::{Catalog, Product, ProductId};
use fresh_market_storefront::feed::FeedClient;
use fresh_market_storefront::store::{Caller, DocumentStore, StoreError, StorePaths, WriteMode};
use serde_json::json;
use tracing::instrument;

use crate::error::{AdminError, Result};

/// Writes the shared product collection as an administrator.
pub struct ProductDesk {
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    caller: Caller,
}

impl ProductDesk {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, paths: StorePaths, caller: Caller) -> Self {
        Self {
            store,
            paths,
            caller,
        }
    }

    /// Every stored product, including disabled ones.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn list(&self) -> Result<Vec<Product>> {
        let docs = self.store.list(&self.caller, &self.paths.products()).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| {
                doc.to_product()
                    .map_err(|e| tracing::warn!(error = %e, "skipping malformed product"))
                    .ok()
            })
            .collect())
    }

    /// Create or replace a product.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for a blank id or name, or error if
    /// the write fails.
    #[instrument(skip_all, fields(product = %product.id))]
    pub async fn upsert(&self, product: &Product) -> Result<()> {
        if product.id.as_str().trim().is_empty() || product.name.trim().is_empty() {
            return Err(AdminError::BadRequest(
                "product id and name cannot be empty".to_string(),
            ));
        }
        let data = serde_json::to_value(product)
            .map_err(|e| AdminError::BadRequest(format!("product not serializable: {e}")))?;
        self.store
            .write(&self.caller, &self.paths.product(&product.id), data, WriteMode::Replace)
            .await?;
        Ok(())
    }

    /// Show or hide a product. Hidden products stay in the store.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` for an unknown product.
    pub async fn set_enabled(&self, id: &ProductId, enabled: bool) -> Result<()> {
        let path = self.paths.product(id);
        if self.store.get(&self.caller, &path).await?.is_none() {
            return Err(AdminError::NotFound(format!("product {id}")));
        }
        self.store
            .write(&self.caller, &path, json!({ "enabled": enabled }), WriteMode::Merge)
            .await?;
        tracing::info!(product = %id, enabled, "product visibility changed");
        Ok(())
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` for an unknown product.
    pub async fn delete(&self, id: &ProductId) -> Result<()> {
        match self.store.delete(&self.caller, &self.paths.product(id)).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(AdminError::NotFound(format!("product {id}"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the default produce catalog if the store has no products.
    /// Returns how many products were written.
    ///
    /// # Errors
    ///
    /// Returns error if a read or write fails.
    pub async fn seed_if_empty(&self) -> Result<usize> {
        if !self.list().await?.is_empty() {
            return Ok(0);
        }
        self.upsert_all(&Catalog::seed()).await
    }

    /// Copy every product from the spreadsheet feed into the store.
    /// Returns how many products were written.
    ///
    /// # Errors
    ///
    /// Returns error if the feed cannot be fetched or a write fails.
    #[instrument(skip_all, fields(url = %client.url()))]
    pub async fn import_feed(&self, client: &FeedClient) -> Result<usize> {
        let catalog = client.fetch().await?;
        self.upsert_all(&catalog).await
    }

    async fn upsert_all(&self, catalog: &Catalog) -> Result<usize> {
        for product in catalog.all() {
            self.upsert(product).await?;
        }
        tracing::info!(products = catalog.all().len(), "catalog written");
        Ok(catalog.all().len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fresh_market_core::{MemberId, Price};
    use fresh_market_storefront::store::MemoryStore;

    use super::*;

    fn desk(store: &MemoryStore, caller: Caller) -> ProductDesk {
        ProductDesk::new(Arc::new(store.clone()), StorePaths::new("c_test"), caller)
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let store = MemoryStore::new();
        let desk = desk(&store, Caller::admin(None));

        assert_eq!(desk.seed_if_empty().await.unwrap(), 8);
        assert_eq!(desk.seed_if_empty().await.unwrap(), 0);
        assert_eq!(desk.list().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_disabled_products_stay_stored() {
        let store = MemoryStore::new();
        let desk = desk(&store, Caller::admin(None));
        let product = Product::new("p100", "地瓜葉", Price::from_whole(25), "把", "葉菜類", "🥬");
        desk.upsert(&product).await.unwrap();

        desk.set_enabled(&product.id, false).await.unwrap();
        let stored = desk.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].enabled);
        assert!(Catalog::new(stored).visible().next().is_none());

        assert!(matches!(
            desk.set_enabled(&ProductId::new("missing"), true).await,
            Err(AdminError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_members_cannot_write_products() {
        let store = MemoryStore::new();
        let desk = desk(&store, Caller::member(MemberId::new("u1")));
        let product = Product::new("p100", "地瓜葉", Price::from_whole(25), "把", "葉菜類", "🥬");
        assert!(matches!(
            desk.upsert(&product).await,
            Err(AdminError::Store(StoreError::PermissionDenied { .. }))
        ));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let store = MemoryStore::new();
        let desk = desk(&store, Caller::admin(None));
        let product = Product::new("p100", " ", Price::ZERO, "把", "葉菜類", "🥬");
        assert!(matches!(desk.upsert(&product).await, Err(AdminError::BadRequest(_))));
    }
}
