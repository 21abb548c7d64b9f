//! Order management across every member.
//!
//! Orders are stored only under their member. The back office view joins
//! each order with its member's profile when it is read, so nothing is
//! written twice.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fresh_market_core::{MemberId, MemberProfile, Order, OrderId, OrderStatus};
use fresh_market_storefront::store::{Caller, DocumentStore, StoreError, StorePaths, WriteMode};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{AdminError, Result};

/// An order with its member's current profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderView {
    /// The member the order is stored under.
    pub member_id: MemberId,
    pub order: Order,
    /// `None` when the member has no profile document.
    pub profile: Option<MemberProfile>,
}

impl AdminOrderView {
    /// The member's current name, or the name captured on the order.
    #[must_use]
    pub fn member_name(&self) -> &str {
        self.profile
            .as_ref()
            .map_or(self.order.draft.customer_name.as_str(), |p| p.name.as_str())
    }

    /// The member's email, if their profile has one.
    #[must_use]
    pub fn member_email(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .map(|p| p.email.as_str())
            .filter(|e| !e.is_empty())
    }
}

/// Reads and updates orders as an administrator.
pub struct OrderDesk {
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    caller: Caller,
}

impl OrderDesk {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, paths: StorePaths, caller: Caller) -> Self {
        Self {
            store,
            paths,
            caller,
        }
    }

    /// Every order in the store, newest first, joined with its member's
    /// profile. Malformed orders are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the store refuses or fails a read.
    #[instrument(skip_all)]
    pub async fn list_orders(&self) -> Result<Vec<AdminOrderView>> {
        let docs = self.store.list_group(&self.caller, "orders").await?;

        let mut orders = Vec::with_capacity(docs.len());
        for doc in &docs {
            let Some(member_id) = self.paths.owner_of(&doc.path) else {
                continue;
            };
            match doc.to_order() {
                Ok(order) => orders.push((member_id, order)),
                Err(e) => tracing::warn!(error = %e, "skipping malformed order"),
            }
        }

        let members: BTreeSet<&MemberId> = orders.iter().map(|(member, _)| member).collect();
        let mut profiles = BTreeMap::new();
        for member in members {
            profiles.insert(member.clone(), self.profile(member).await?);
        }

        let mut views: Vec<AdminOrderView> = orders
            .into_iter()
            .map(|(member_id, order)| AdminOrderView {
                profile: profiles.get(&member_id).cloned().flatten(),
                member_id,
                order,
            })
            .collect();
        views.sort_by(|a, b| {
            b.order
                .created_at
                .cmp(&a.order.created_at)
                .then_with(|| b.order.id.cmp(&a.order.id))
        });
        Ok(views)
    }

    /// Move an order to `status`. Only Processing to Completed is allowed.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` for an unknown order and
    /// `AdminError::InvalidTransition` for any other status change.
    #[instrument(skip_all, fields(member = %member, order = %order_id, status = %status))]
    pub async fn update_status(
        &self,
        member: &MemberId,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let path = self.paths.order(member, order_id);
        let doc = self
            .store
            .get(&self.caller, &path)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("order {order_id}")))?;

        let current = doc.to_order()?.status();
        if !current.can_transition_to(status) {
            return Err(AdminError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let doc = self
            .store
            .write(&self.caller, &path, json!({ "status": status }), WriteMode::Merge)
            .await?;
        tracing::info!("order status updated");
        Ok(doc.to_order()?)
    }

    /// Delete an order.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` for an unknown order.
    pub async fn delete_order(&self, member: &MemberId, order_id: &OrderId) -> Result<()> {
        match self
            .store
            .delete(&self.caller, &self.paths.order(member, order_id))
            .await
        {
            Ok(()) => {
                tracing::info!(member = %member, order = %order_id, "order deleted");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(AdminError::NotFound(format!("order {order_id}"))),
            Err(e) => Err(e.into()),
        }
    }

    async fn profile(&self, member: &MemberId) -> Result<Option<MemberProfile>> {
        let Some(doc) = self.store.get(&self.caller, &self.paths.profile(member)).await? else {
            return Ok(None);
        };
        Ok(doc
            .decode()
            .map_err(|e| tracing::warn!(error = %e, "ignoring malformed profile"))
            .ok())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fresh_market_core::{Cart, CheckoutKey, OrderDraft, Price, Product};
    use fresh_market_storefront::store::MemoryStore;

    use super::*;

    struct Fixture {
        store: MemoryStore,
        paths: StorePaths,
        desk: OrderDesk,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let paths = StorePaths::new("c_test");
        let desk = OrderDesk::new(Arc::new(store.clone()), paths.clone(), Caller::admin(None));
        Fixture { store, paths, desk }
    }

    async fn place_order(f: &Fixture, member: &str, quantity: u32) -> OrderId {
        let member = MemberId::new(member);
        let caller = Caller::member(member.clone());
        let mut cart = Cart::new();
        cart.add_item(
            &Product::new("p001", "高麗菜", Price::from_whole(45), "顆", "葉菜類", "🥬"),
            quantity,
        );
        let draft = OrderDraft::from_cart(
            CheckoutKey::generate(),
            member.clone(),
            &MemberProfile::default(),
            &cart,
        )
        .unwrap();
        let doc = f
            .store
            .create(
                &caller,
                &f.paths.orders(&member),
                serde_json::to_value(draft).unwrap(),
                None,
            )
            .await
            .unwrap();
        OrderId::new(doc.id())
    }

    async fn write_profile(f: &Fixture, member: &str, name: &str) {
        let member = MemberId::new(member);
        f.store
            .write(
                &Caller::member(member.clone()),
                &f.paths.profile(&member),
                json!({ "name": name, "email": "shopper@example.com", "address": "台北市" }),
                WriteMode::Replace,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_joins_profiles_newest_first() {
        let f = fixture();
        write_profile(&f, "u1", "林小姐").await;
        let first = place_order(&f, "u1", 1).await;
        let second = place_order(&f, "u2", 3).await;

        let views = f.desk.list_orders().await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].order.id, second);
        assert_eq!(views[1].order.id, first);

        assert_eq!(views[1].member_name(), "林小姐");
        assert_eq!(views[1].member_email(), Some("shopper@example.com"));
        assert!(views[0].profile.is_none());
        assert_eq!(views[0].member_name(), "新用戶");
    }

    #[tokio::test]
    async fn test_profile_rename_shows_on_read() {
        let f = fixture();
        write_profile(&f, "u1", "林小姐").await;
        place_order(&f, "u1", 1).await;
        write_profile(&f, "u1", "林太太").await;

        let views = f.desk.list_orders().await.unwrap();
        assert_eq!(views[0].member_name(), "林太太");
        assert_eq!(views[0].order.draft.customer_name, "新用戶");
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let f = fixture();
        let member = MemberId::new("u1");
        let order = place_order(&f, "u1", 2).await;

        let updated = f
            .desk
            .update_status(&member, &order, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(updated.status(), OrderStatus::Completed);
        assert_eq!(updated.total(), Price::from_whole(90));

        let err = f
            .desk
            .update_status(&member, &order, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_delete_order() {
        let f = fixture();
        let member = MemberId::new("u1");
        let order = place_order(&f, "u1", 1).await;

        f.desk.delete_order(&member, &order).await.unwrap();
        assert!(f.desk.list_orders().await.unwrap().is_empty());
        assert!(matches!(
            f.desk.delete_order(&member, &order).await,
            Err(AdminError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_members_cannot_read_all_orders() {
        let f = fixture();
        let desk = OrderDesk::new(
            Arc::new(f.store.clone()),
            f.paths.clone(),
            Caller::member(MemberId::new("u1")),
        );
        assert!(matches!(
            desk.list_orders().await,
            Err(AdminError::Store(StoreError::PermissionDenied { .. }))
        ));
    }
}
