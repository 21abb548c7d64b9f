//! Cart and favorites behavior through the sync engine.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use fresh_market_core::{Cart, Catalog, MemberId, Price, ProductId};
use fresh_market_integration_tests::{fast_retry, paths, product, shopper, stock, stock_seed};
use fresh_market_storefront::auth::{Identity, IdentityProvider};
use fresh_market_storefront::store::{Caller, DocumentStore, MemoryStore};
use fresh_market_storefront::{Entity, SyncEngine, SyncError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SHOPPER: &str = "shopper-1";

fn memory() -> (MemoryStore, Arc<dyn DocumentStore>) {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    (store, shared)
}

fn expected_total(cart: &Cart) -> Price {
    cart.lines().iter().map(|line| line.price.times(line.quantity)).sum()
}

async fn stored_cart(store: &MemoryStore, member: &str) -> Cart {
    let member = MemberId::new(member);
    store
        .get(&Caller::member(member.clone()), &paths().cart(&member))
        .await
        .unwrap()
        .unwrap()
        .decode::<Cart>()
        .unwrap()
}

// =============================================================================
// Totals
// =============================================================================

#[tokio::test]
async fn test_total_matches_lines_after_random_edits() {
    let (store, shared) = memory();
    stock_seed(&shared).await;
    let mut engine = shopper(&shared, SHOPPER).await;

    let ids: Vec<ProductId> = Catalog::seed().all().iter().map(|p| p.id.clone()).collect();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let id = &ids[rng.random_range(0..ids.len())];
        if rng.random_bool(0.5) {
            engine.add_item(id, rng.random_range(1..=3)).unwrap();
        } else {
            let _ = engine.adjust_quantity(id, rng.random_range(-3..=2)).unwrap();
        }

        let cart = engine.cart();
        assert_eq!(engine.cart_total(), expected_total(cart));
        assert!(cart.lines().iter().all(|line| line.quantity >= 1));
        let mut seen: Vec<&ProductId> = cart.lines().iter().map(|l| &l.product_id).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), cart.line_count());
    }

    engine.settle().await;
    assert!(!engine.is_dirty(Entity::Cart));
    assert_eq!(&stored_cart(&store, SHOPPER).await, engine.cart());
}

#[tokio::test]
async fn test_add_add_decrement_leaves_one() {
    let (store, shared) = memory();
    stock(&shared, &[product("a", "Spinach", 35)]).await;
    let mut engine = shopper(&shared, SHOPPER).await;
    let a = ProductId::new("a");

    engine.add_item(&a, 1).unwrap();
    engine.add_item(&a, 1).unwrap();
    engine.adjust_quantity(&a, -1).unwrap();

    assert_eq!(engine.cart().get(&a).unwrap().quantity, 1);
    assert_eq!(engine.cart_total(), Price::from_whole(35));

    engine.settle().await;
    let stored = stored_cart(&store, SHOPPER).await;
    assert_eq!(stored.get(&a).unwrap().quantity, 1);
}

#[tokio::test]
async fn test_decrement_to_zero_removes_line() {
    let (store, shared) = memory();
    stock(&shared, &[product("a", "Spinach", 35), product("b", "Kale", 40)]).await;
    let mut engine = shopper(&shared, SHOPPER).await;

    engine.add_item(&ProductId::new("a"), 2).unwrap();
    engine.add_item(&ProductId::new("b"), 1).unwrap();
    engine.adjust_quantity(&ProductId::new("a"), -2).unwrap();

    assert_eq!(engine.line_count(), 1);
    assert_eq!(engine.item_count(), 1);

    engine.settle().await;
    assert_eq!(stored_cart(&store, SHOPPER).await.line_count(), 1);
}

#[tokio::test]
async fn test_adjusting_missing_line_writes_nothing() {
    let (_store, shared) = memory();
    stock_seed(&shared).await;
    let mut engine = shopper(&shared, SHOPPER).await;

    let handle = engine.adjust_quantity(&ProductId::new("p001"), 1).unwrap();

    assert!(handle.is_none());
    assert!(engine.cart().is_empty());
    assert!(!engine.is_dirty(Entity::Cart));
}

#[tokio::test]
async fn test_unknown_product_is_rejected() {
    let (_store, shared) = memory();
    stock_seed(&shared).await;
    let mut engine = shopper(&shared, SHOPPER).await;

    let err = engine.add_item(&ProductId::new("nope"), 1).unwrap_err();

    assert!(matches!(err, SyncError::UnknownProduct(_)));
    assert!(engine.cart().is_empty());
}

// =============================================================================
// Favorites
// =============================================================================

#[tokio::test]
async fn test_favorite_toggled_twice_is_unchanged() {
    let (store, shared) = memory();
    stock_seed(&shared).await;
    let mut engine = shopper(&shared, SHOPPER).await;
    let p002 = ProductId::new("p002");
    let p005 = ProductId::new("p005");

    assert!(engine.toggle_favorite(&p002).unwrap());
    engine.settle().await;
    let before = engine.profile().unwrap().favorites.clone();

    assert!(engine.toggle_favorite(&p005).unwrap());
    assert!(!engine.toggle_favorite(&p005).unwrap());
    engine.settle().await;

    assert_eq!(engine.profile().unwrap().favorites, before);

    let member = MemberId::new(SHOPPER);
    let stored = store
        .get(&Caller::member(member.clone()), &paths().profile(&member))
        .await
        .unwrap()
        .unwrap();
    let favorites = stored.data["favorites"].as_array().unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0], "p002");
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn test_unbound_engine_rejects_cart_changes() {
    let (_store, shared) = memory();
    stock_seed(&shared).await;
    let mut engine = SyncEngine::with_paths(shared, paths(), fast_retry());
    engine.open().await;
    engine.settle().await;

    let err = engine.add_item(&ProductId::new("p001"), 1).unwrap_err();

    assert!(matches!(err, SyncError::NotAuthenticated));
    assert!(engine.cart().is_empty());
    assert!(matches!(
        engine.toggle_favorite(&ProductId::new("p001")),
        Err(SyncError::NotAuthenticated)
    ));
    assert!(matches!(engine.checkout().await, Err(SyncError::NotAuthenticated)));
}

#[tokio::test]
async fn test_switching_members_does_not_leak_cart() {
    let (_store, shared) = memory();
    stock_seed(&shared).await;
    let mut engine = shopper(&shared, "alice").await;
    engine.add_item(&ProductId::new("p001"), 4).unwrap();
    engine.settle().await;

    engine.unbind();
    assert!(engine.cart().is_empty());
    assert!(engine.profile().is_none());

    let bob = Identity {
        id: MemberId::new("bob"),
        provider: IdentityProvider::Token,
    };
    engine.bind(bob).await;
    engine.settle().await;
    assert!(engine.cart().is_empty());

    let alice_again = shopper(&shared, "alice").await;
    assert_eq!(alice_again.cart().item_count(), 4);
}
