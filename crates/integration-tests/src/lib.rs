//! Integration tests for Fresh Market.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p fresh-market-integration-tests
//! ```
//!
//! Everything runs against [`MemoryStore`], so no services are needed.
//!
//! # Test Categories
//!
//! - `cart_properties` - Cart and favorites behavior through the sync engine
//! - `reconciliation` - Local writes racing remote snapshots
//! - `checkout` - Order submission, partial failure, and idempotent retry
//! - `back_office` - Admin flows over orders placed by shoppers

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fresh_market_admin::ProductDesk;
use fresh_market_core::{Catalog, MemberId, Price, Product};
use fresh_market_storefront::SyncEngine;
use fresh_market_storefront::auth::{Identity, IdentityProvider};
use fresh_market_storefront::store::{
    Caller, DocPath, Document, DocumentStore, MemoryStore, StorePaths, StoreResult, WriteMode,
};
use fresh_market_storefront::sync::RetryPolicy;
use serde_json::Value;
use tokio::sync::{Mutex, watch};

/// App id every test store is namespaced under.
pub const APP_ID: &str = "c_integration";

#[must_use]
pub fn paths() -> StorePaths {
    StorePaths::new(APP_ID)
}

/// Retries that finish in milliseconds.
#[must_use]
pub const fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

#[must_use]
pub fn back_office() -> Caller {
    Caller::admin(None)
}

// ===== Fixtures =====

/// Store the given products through the back office.
///
/// # Panics
///
/// Panics if a product cannot be written.
pub async fn stock(store: &Arc<dyn DocumentStore>, products: &[Product]) {
    let desk = ProductDesk::new(Arc::clone(store), paths(), back_office());
    for product in products {
        desk.upsert(product).await.expect("stock product");
    }
}

/// Store the seed catalog.
pub async fn stock_seed(store: &Arc<dyn DocumentStore>) {
    stock(store, Catalog::seed().all()).await;
}

/// A product priced in whole dollars.
#[must_use]
pub fn product(id: &str, name: &str, price: u32) -> Product {
    Product::new(id, name, Price::from_whole(price), "件", "葉菜類", "🥬")
}

/// An engine signed in as `member` with every initial snapshot applied.
pub async fn shopper(store: &Arc<dyn DocumentStore>, member: &str) -> SyncEngine {
    let mut engine = SyncEngine::with_paths(Arc::clone(store), paths(), fast_retry());
    engine.open().await;
    engine
        .bind(Identity {
            id: MemberId::new(member),
            provider: IdentityProvider::Token,
        })
        .await;
    engine.settle().await;
    engine
}

// ===== Gated store =====

#[derive(Debug)]
struct Gate {
    prefix: Mutex<Option<DocPath>>,
    open: watch::Sender<bool>,
    held: watch::Sender<usize>,
}

/// A [`DocumentStore`] that can hold writes in flight.
///
/// Writes under a gated prefix wait until [`GatedStore::release`] is called,
/// so a test can land other changes on the inner store while the engine's
/// write is still outstanding. Everything else goes straight through.
#[derive(Debug, Clone)]
pub struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Gate>,
}

impl GatedStore {
    #[must_use]
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            gate: Arc::new(Gate {
                prefix: Mutex::new(None),
                open: watch::Sender::new(true),
                held: watch::Sender::new(0),
            }),
        }
    }

    /// The store writes are eventually applied to.
    #[must_use]
    pub const fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Hold every later write at or under `prefix`.
    pub async fn hold_writes_under(&self, prefix: DocPath) {
        *self.gate.prefix.lock().await = Some(prefix);
        self.gate.open.send_replace(false);
    }

    /// Let held writes continue and stop holding new ones.
    pub async fn release(&self) {
        *self.gate.prefix.lock().await = None;
        self.gate.open.send_replace(true);
    }

    /// Wait until at least `count` writes have been held since creation.
    pub async fn wait_for_held(&self, count: usize) {
        let mut held = self.gate.held.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = held.wait_for(|n| *n >= count).await;
    }

    async fn pass(&self, path: &DocPath) {
        let gated = self
            .gate
            .prefix
            .lock()
            .await
            .as_ref()
            .is_some_and(|prefix| path.as_str().starts_with(prefix.as_str()));
        if !gated {
            return;
        }
        self.gate.held.send_modify(|n| *n += 1);
        let mut open = self.gate.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn get(&self, caller: &Caller, path: &DocPath) -> StoreResult<Option<Document>> {
        self.inner.get(caller, path).await
    }

    async fn list(&self, caller: &Caller, collection: &DocPath) -> StoreResult<Vec<Document>> {
        self.inner.list(caller, collection).await
    }

    async fn list_group(&self, caller: &Caller, collection_id: &str) -> StoreResult<Vec<Document>> {
        self.inner.list_group(caller, collection_id).await
    }

    async fn watch_document(
        &self,
        caller: &Caller,
        path: &DocPath,
    ) -> StoreResult<watch::Receiver<Option<Document>>> {
        self.inner.watch_document(caller, path).await
    }

    async fn watch_collection(
        &self,
        caller: &Caller,
        collection: &DocPath,
    ) -> StoreResult<watch::Receiver<Vec<Document>>> {
        self.inner.watch_collection(caller, collection).await
    }

    async fn write(
        &self,
        caller: &Caller,
        path: &DocPath,
        data: Value,
        mode: WriteMode,
    ) -> StoreResult<Document> {
        self.pass(path).await;
        self.inner.write(caller, path, data, mode).await
    }

    async fn create(
        &self,
        caller: &Caller,
        collection: &DocPath,
        data: Value,
        idempotency_key: Option<&str>,
    ) -> StoreResult<Document> {
        self.pass(collection).await;
        self.inner.create(caller, collection, data, idempotency_key).await
    }

    async fn delete(&self, caller: &Caller, path: &DocPath) -> StoreResult<()> {
        self.inner.delete(caller, path).await
    }
}
