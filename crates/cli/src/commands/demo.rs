//! Scripted shopping session.
//!
//! Seeds an in-memory store, signs a shopper in, fills and checks out a
//! cart through the sync engine, then reads the result back as the back
//! office would.
//!
//! With `--fail-clear` every attempt at the first cart-clear write fails,
//! the checkout reports the failure, and a second checkout with the same
//! cart finishes it without placing a second order.

use std::path::Path;
use std::sync::Arc;

use fresh_market_admin::{OrderDesk, ProductDesk, reports};
use fresh_market_core::{MemberId, ProductId, ProfileUpdate};
use fresh_market_storefront::auth::{LocalAuthProvider, sign_in};
use fresh_market_storefront::store::{Caller, DocumentStore, MemoryStore, StorePaths};
use fresh_market_storefront::{StorefrontConfig, SyncEngine, SyncError};

use super::{CommandError, print_json};

const SHOPPER: &str = "demo-shopper";
const BASKET: [(&str, u32); 3] = [("p001", 2), ("p004", 1), ("p007", 3)];

/// Run the session and print the placed order and revenue summary.
///
/// # Errors
///
/// Returns error if any step the script expects to succeed fails.
pub async fn run(
    config: &StorefrontConfig,
    fail_clear: bool,
    save: Option<&Path>,
) -> Result<(), CommandError> {
    let store = MemoryStore::new();
    let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let paths = StorePaths::new(config.app_id.clone());
    let back_office = Caller::admin(None);

    let seeded = ProductDesk::new(Arc::clone(&shared), paths.clone(), back_office.clone())
        .seed_if_empty()
        .await?;
    tracing::info!(seeded, "catalog seeded");

    let auth = LocalAuthProvider::new();
    let member = MemberId::new(SHOPPER);
    let token = auth.issue_token(&member);
    let identity = sign_in(&auth, Some(&token)).await?;

    let mut engine = SyncEngine::with_paths(Arc::clone(&shared), paths.clone(), config.retry.clone());
    engine.open().await;
    engine.bind(identity).await;
    engine.settle().await;

    engine.sign_in_profile("示範用戶", "demo@example.com")?;
    engine.update_profile(ProfileUpdate {
        name: "示範用戶".to_string(),
        email: "demo@example.com".to_string(),
        address: "台北市大安區和平東路 1 號".to_string(),
    })?;
    for (id, quantity) in BASKET {
        engine.add_item(&ProductId::new(id), quantity)?;
    }
    engine.toggle_favorite(&ProductId::new("p005"))?;
    engine.settle().await;
    tracing::info!(
        total = %engine.cart_total(),
        lines = engine.line_count(),
        items = engine.item_count(),
        "cart ready"
    );

    if fail_clear {
        store.fail_writes_under(&paths.cart(&member), config.retry.max_attempts);
    }

    let order = match engine.checkout().await {
        Ok(order) => order,
        Err(SyncError::PersistenceFailure { reason, .. }) if fail_clear => {
            tracing::warn!(%reason, "checkout failed, retrying with the same cart");
            store.clear_faults();
            engine.checkout().await?
        }
        Err(e) => return Err(e.into()),
    };
    engine.settle().await;

    for notification in engine.drain_notifications() {
        tracing::info!(level = ?notification.level, "{}", notification.message);
    }
    print_json(&order)?;

    let views = OrderDesk::new(shared, paths, back_office).list_orders().await?;
    tracing::info!(
        orders = views.len(),
        revenue = %reports::total_revenue(&views),
        "back office view"
    );
    print_json(&reports::revenue_by_member(&views))?;

    if let Some(path) = save {
        store.save_to(path).await?;
        tracing::info!(path = %path.display(), "store saved");
    }
    engine.close();
    Ok(())
}
