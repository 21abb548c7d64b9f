//! Orders.
//!
//! An order is an immutable snapshot of a cart taken at checkout. Only its
//! status changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartLine};
use crate::profile::MemberProfile;
use crate::types::{CheckoutKey, MemberId, OrderId, OrderStatus, Price, ProductId};

/// A product line frozen into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "id")]
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub unit: String,
    pub icon: String,
    pub quantity: u32,
}

impl OrderLine {
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.price.times(self.quantity)
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            price: line.price,
            unit: line.unit.clone(),
            icon: line.icon.clone(),
            quantity: line.quantity,
        }
    }
}

/// The order document written at checkout, before the store assigns an id.
///
/// This is also the stored shape of every order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub checkout_key: CheckoutKey,
    #[serde(rename = "customerUID")]
    pub member_id: MemberId,
    pub customer_name: String,
    #[serde(default)]
    pub shipping_address: String,
    pub items: Vec<OrderLine>,
    pub total: Price,
    #[serde(default)]
    pub status: OrderStatus,
}

impl OrderDraft {
    /// Snapshot `cart` into a new order. Returns `None` for an empty cart.
    #[must_use]
    pub fn from_cart(
        checkout_key: CheckoutKey,
        member_id: MemberId,
        profile: &MemberProfile,
        cart: &Cart,
    ) -> Option<Self> {
        if cart.is_empty() {
            return None;
        }
        let items: Vec<OrderLine> = cart.lines().iter().map(OrderLine::from).collect();
        let total = items.iter().map(OrderLine::subtotal).sum();
        Some(Self {
            checkout_key,
            member_id,
            customer_name: profile.name.clone(),
            shipping_address: profile.address.clone(),
            items,
            total,
            status: OrderStatus::Processing,
        })
    }
}

/// An order as stored, with its store-assigned id and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub draft: OrderDraft,
}

impl Order {
    #[must_use]
    pub const fn new(id: OrderId, created_at: DateTime<Utc>, draft: OrderDraft) -> Self {
        Self {
            id,
            created_at,
            draft,
        }
    }

    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.draft.status
    }

    #[must_use]
    pub const fn total(&self) -> Price {
        self.draft.total
    }

    #[must_use]
    pub const fn member_id(&self) -> &MemberId {
        &self.draft.member_id
    }

    #[must_use]
    pub fn items(&self) -> &[OrderLine] {
        &self.draft.items
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.draft.items.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Whether the stored total equals the sum of its lines.
    #[must_use]
    pub fn total_matches_lines(&self) -> bool {
        let sum: Price = self.draft.items.iter().map(OrderLine::subtotal).sum();
        sum == self.draft.total
    }
}

/// Sort orders newest first, breaking ties by id.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::catalog::Product;

    fn sample_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add_item(
            &Product::new("a", "小黃瓜", Price::from_whole(50), "條", "瓜果類", "🥒"),
            2,
        );
        cart.add_item(
            &Product::new("b", "空心菜", Price::from_whole(30), "把", "葉菜類", "🍃"),
            1,
        );
        cart
    }

    #[test]
    fn test_draft_snapshots_cart() {
        let mut cart = sample_cart();
        let profile = MemberProfile {
            address: "台南市".into(),
            ..MemberProfile::default()
        };
        let draft =
            OrderDraft::from_cart(CheckoutKey::generate(), MemberId::new("u1"), &profile, &cart)
                .unwrap();
        assert_eq!(draft.total, Price::from_whole(130));
        assert_eq!(draft.status, OrderStatus::Processing);
        assert_eq!(draft.shipping_address, "台南市");

        cart.clear();
        assert_eq!(draft.items.len(), 2);
    }

    #[test]
    fn test_empty_cart_has_no_draft() {
        let draft = OrderDraft::from_cart(
            CheckoutKey::generate(),
            MemberId::new("u1"),
            &MemberProfile::default(),
            &Cart::new(),
        );
        assert!(draft.is_none());
    }

    #[test]
    fn test_total_matches_lines() {
        let draft = OrderDraft::from_cart(
            CheckoutKey::generate(),
            MemberId::new("u1"),
            &MemberProfile::default(),
            &sample_cart(),
        )
        .unwrap();
        let mut order = Order::new(OrderId::new("o1"), Utc::now(), draft);
        assert!(order.total_matches_lines());
        assert_eq!(order.item_count(), 3);
        order.draft.total = Price::from_whole(1);
        assert!(!order.total_matches_lines());
    }

    #[test]
    fn test_stored_field_names() {
        let draft = OrderDraft::from_cart(
            CheckoutKey::generate(),
            MemberId::new("u1"),
            &MemberProfile::default(),
            &sample_cart(),
        )
        .unwrap();
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["customerUID"], "u1");
        assert_eq!(value["status"], "Processing");
        assert!(value["checkoutKey"].is_string());
        let back: OrderDraft = serde_json::from_value(value).unwrap();
        assert_eq!(back, draft);
    }

    #[test]
    fn test_sort_newest_first() {
        let draft = OrderDraft::from_cart(
            CheckoutKey::generate(),
            MemberId::new("u1"),
            &MemberProfile::default(),
            &sample_cart(),
        )
        .unwrap();
        let at = |h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap();
        let mut orders = vec![
            Order::new(OrderId::new("o1"), at(8), draft.clone()),
            Order::new(OrderId::new("o2"), at(10), draft.clone()),
            Order::new(OrderId::new("o3"), at(9), draft),
        ];
        sort_newest_first(&mut orders);
        let ids: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["o2", "o3", "o1"]);
    }
}
