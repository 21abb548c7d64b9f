//! Sales and catalog summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fresh_market_core::{Catalog, MemberId, OrderStatus, Price, Product};
use serde::Serialize;

use crate::orders::AdminOrderView;

/// Order totals for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRevenue {
    pub member_id: MemberId,
    pub member_name: String,
    pub order_count: usize,
    pub revenue: Price,
    pub completed_count: usize,
    pub last_order_at: Option<DateTime<Utc>>,
}

/// Per-member order summary, highest revenue first.
#[must_use]
pub fn revenue_by_member(orders: &[AdminOrderView]) -> Vec<MemberRevenue> {
    let mut by_member: BTreeMap<&MemberId, MemberRevenue> = BTreeMap::new();

    for view in orders {
        let entry = by_member
            .entry(&view.member_id)
            .or_insert_with(|| MemberRevenue {
                member_id: view.member_id.clone(),
                member_name: view.member_name().to_string(),
                order_count: 0,
                revenue: Price::ZERO,
                completed_count: 0,
                last_order_at: None,
            });
        entry.order_count += 1;
        entry.revenue = entry.revenue + view.order.total();
        if view.order.status() == OrderStatus::Completed {
            entry.completed_count += 1;
        }
        if entry.last_order_at.is_none_or(|last| view.order.created_at > last) {
            entry.last_order_at = Some(view.order.created_at);
        }
    }

    let mut summary: Vec<MemberRevenue> = by_member.into_values().collect();
    summary.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.member_id.cmp(&b.member_id))
    });
    summary
}

/// Number of visible products per category, in catalog order.
#[must_use]
pub fn category_counts(products: &[Product]) -> Vec<(String, usize)> {
    Catalog::new(products.to_vec()).category_counts()
}

/// Revenue across all orders.
#[must_use]
pub fn total_revenue(orders: &[AdminOrderView]) -> Price {
    orders.iter().map(|view| view.order.total()).sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use fresh_market_core::{Cart, CheckoutKey, MemberProfile, Order, OrderDraft, OrderId};

    use super::*;

    fn view(member: &str, id: &str, quantity: u32, status: OrderStatus, minutes: i64) -> AdminOrderView {
        let mut cart = Cart::new();
        cart.add_item(
            &Product::new("p007", "紅蘿蔔", Price::from_whole(40), "袋", "根莖類", "🥕"),
            quantity,
        );
        let mut draft = OrderDraft::from_cart(
            CheckoutKey::generate(),
            MemberId::new(member),
            &MemberProfile::default(),
            &cart,
        )
        .unwrap();
        draft.status = status;
        let created_at = DateTime::UNIX_EPOCH + TimeDelta::minutes(minutes);
        AdminOrderView {
            member_id: MemberId::new(member),
            order: Order::new(OrderId::new(id), created_at, draft),
            profile: None,
        }
    }

    #[test]
    fn test_revenue_by_member() {
        let orders = vec![
            view("u1", "o1", 1, OrderStatus::Completed, 1),
            view("u2", "o2", 5, OrderStatus::Processing, 2),
            view("u1", "o3", 2, OrderStatus::Processing, 3),
        ];
        let summary = revenue_by_member(&orders);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].member_id.as_str(), "u2");
        assert_eq!(summary[0].revenue, Price::from_whole(200));

        let u1 = &summary[1];
        assert_eq!(u1.order_count, 2);
        assert_eq!(u1.revenue, Price::from_whole(120));
        assert_eq!(u1.completed_count, 1);
        assert_eq!(u1.last_order_at, Some(DateTime::UNIX_EPOCH + TimeDelta::minutes(3)));

        assert_eq!(total_revenue(&orders), Price::from_whole(320));
    }

    #[test]
    fn test_category_counts_skip_disabled() {
        let mut products = Catalog::seed().all().to_vec();
        products[0].enabled = false;
        let counts = category_counts(&products);
        assert_eq!(
            counts,
            vec![
                ("葉菜類".to_string(), 2),
                ("瓜果類".to_string(), 3),
                ("根莖類".to_string(), 2),
            ]
        );
    }
}
