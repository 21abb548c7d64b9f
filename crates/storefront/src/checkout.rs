//! Order submission state machine.
//!
//! ```text
//! Idle ──begin──▶ Submitting(CreatingOrder) ──order stored──▶ Submitting(ClearingCart)
//!                        │                                          │
//!                        └──────────── store error ──▶ Failed ◀─────┤
//!                                                                   └──cart cleared──▶ Committed
//! ```
//!
//! The order is always written before the cart is cleared. A failure after
//! the order was stored leaves the cart intact, and the next attempt with an
//! unchanged cart reuses the same [`CheckoutKey`], so the store returns the
//! existing order instead of creating a second one.

use fresh_market_core::{Cart, CheckoutKey, Order, OrderId, Price};
use serde::Serialize;

use crate::error::SyncError;
use crate::sync::{WriteHandle, WriteState};

/// Progress within a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum CheckoutStage {
    /// Waiting for the order document to be stored.
    CreatingOrder,
    /// The order is stored; waiting for the cart to be cleared.
    ClearingCart { order_id: OrderId },
}

/// Where checkout stands.
///
/// `Committed` and `Failed` are resting states: a new checkout may begin
/// from either, as from `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    Submitting {
        key: CheckoutKey,
        stage: CheckoutStage,
    },
    Committed {
        order_id: OrderId,
        total: Price,
    },
    Failed {
        reason: String,
    },
}

impl CheckoutState {
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        matches!(self, Self::Submitting { .. })
    }
}

/// How a settled submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Committed(Order),
    Failed(String),
}

/// Drives [`CheckoutState`] from engine events.
#[derive(Debug, Default)]
pub struct Checkout {
    state: CheckoutState,
    /// Key and cart of the last attempt that did not commit.
    resumable: Option<(CheckoutKey, Cart)>,
    /// Cart snapshot of the running attempt.
    submitted: Option<Cart>,
    placed: Option<Order>,
    clear: Option<WriteHandle>,
}

impl Checkout {
    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// The order placed by the running or last committed submission.
    #[must_use]
    pub const fn placed(&self) -> Option<&Order> {
        self.placed.as_ref()
    }

    /// Start a submission for `cart`, returning the idempotency key to
    /// create the order with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadySubmitting`] while a submission is running
    /// and [`SyncError::EmptyCart`] for an empty cart.
    pub fn begin(&mut self, cart: &Cart) -> Result<CheckoutKey, SyncError> {
        if self.state.is_submitting() {
            return Err(SyncError::AlreadySubmitting);
        }
        if cart.is_empty() {
            return Err(SyncError::EmptyCart);
        }

        let key = match self.resumable.take() {
            Some((key, previous)) if &previous == cart => {
                tracing::info!(%key, "resuming checkout with previous key");
                key
            }
            _ => CheckoutKey::generate(),
        };
        self.state = CheckoutState::Submitting {
            key,
            stage: CheckoutStage::CreatingOrder,
        };
        self.submitted = Some(cart.clone());
        self.placed = None;
        self.clear = None;
        Ok(key)
    }

    /// The key of the running submission, if it is waiting for its order.
    #[must_use]
    pub const fn awaiting_order(&self) -> Option<CheckoutKey> {
        match &self.state {
            CheckoutState::Submitting {
                key,
                stage: CheckoutStage::CreatingOrder,
            } => Some(*key),
            _ => None,
        }
    }

    /// The order for submission `key` was stored. Returns whether the caller
    /// should now clear the cart.
    pub fn order_stored(&mut self, key: CheckoutKey, order: Order) -> bool {
        if self.awaiting_order() != Some(key) {
            tracing::debug!(%key, "ignoring order for another submission");
            return false;
        }
        self.state = CheckoutState::Submitting {
            key,
            stage: CheckoutStage::ClearingCart {
                order_id: order.id.clone(),
            },
        };
        self.placed = Some(order);
        true
    }

    /// Track the cart-clearing write of the running submission.
    pub fn clearing(&mut self, handle: WriteHandle) {
        self.clear = Some(handle);
    }

    /// Fail the running submission `key`.
    pub fn fail(&mut self, key: CheckoutKey, reason: impl Into<String>) -> Option<CheckoutOutcome> {
        match &self.state {
            CheckoutState::Submitting { key: running, .. } if *running == key => {}
            _ => return None,
        }
        let reason = reason.into();
        if let Some(cart) = self.submitted.take() {
            self.resumable = Some((key, cart));
        }
        self.clear = None;
        self.state = CheckoutState::Failed {
            reason: reason.clone(),
        };
        Some(CheckoutOutcome::Failed(reason))
    }

    /// Check the cart-clearing write and settle the submission once it has
    /// committed or failed.
    pub fn poll(&mut self) -> Option<CheckoutOutcome> {
        let CheckoutState::Submitting { key, .. } = &self.state else {
            return None;
        };
        let key = *key;
        match self.clear.as_ref()?.state() {
            WriteState::Pending => None,
            WriteState::Failed(reason) => self.fail(key, reason),
            WriteState::Committed(_) => {
                self.clear = None;
                self.submitted = None;
                self.resumable = None;
                let order = self.placed.clone()?;
                self.state = CheckoutState::Committed {
                    order_id: order.id.clone(),
                    total: order.total(),
                };
                Some(CheckoutOutcome::Committed(order))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use fresh_market_core::{MemberId, MemberProfile, OrderDraft, Product};

    use super::*;
    use crate::store::Revision;

    fn cart() -> Cart {
        let mut cart = Cart::new();
        cart.add_item(
            &Product::new("p004", "小黃瓜", Price::from_whole(50), "條", "瓜果類", "🥒"),
            2,
        );
        cart
    }

    fn order_for(key: CheckoutKey, cart: &Cart) -> Order {
        let draft =
            OrderDraft::from_cart(key, MemberId::new("u1"), &MemberProfile::default(), cart).unwrap();
        Order::new(OrderId::new("o1"), Utc::now(), draft)
    }

    #[test]
    fn test_guards() {
        let mut checkout = Checkout::default();
        assert!(matches!(checkout.begin(&Cart::new()), Err(SyncError::EmptyCart)));

        checkout.begin(&cart()).unwrap();
        assert!(checkout.state().is_submitting());
        assert!(matches!(checkout.begin(&cart()), Err(SyncError::AlreadySubmitting)));
    }

    #[test]
    fn test_commits_only_after_cart_clear() {
        let mut checkout = Checkout::default();
        let cart = cart();
        let key = checkout.begin(&cart).unwrap();

        assert!(checkout.order_stored(key, order_for(key, &cart)));
        assert!(checkout.poll().is_none());

        checkout.clearing(WriteHandle::settled(WriteState::Committed(Revision(2))));
        let outcome = checkout.poll().unwrap();
        assert!(matches!(outcome, CheckoutOutcome::Committed(ref o) if o.total() == Price::from_whole(100)));
        assert_eq!(
            checkout.state(),
            &CheckoutState::Committed {
                order_id: OrderId::new("o1"),
                total: Price::from_whole(100),
            }
        );
    }

    #[test]
    fn test_failed_clear_resumes_with_same_key() {
        let mut checkout = Checkout::default();
        let cart = cart();
        let key = checkout.begin(&cart).unwrap();
        checkout.order_stored(key, order_for(key, &cart));
        checkout.clearing(WriteHandle::settled(WriteState::Failed("unavailable".into())));

        assert_eq!(
            checkout.poll(),
            Some(CheckoutOutcome::Failed("unavailable".into()))
        );
        assert_eq!(checkout.begin(&cart).unwrap(), key);
    }

    #[test]
    fn test_changed_cart_gets_new_key() {
        let mut checkout = Checkout::default();
        let mut cart = cart();
        let key = checkout.begin(&cart).unwrap();
        checkout.fail(key, "unavailable");

        cart.adjust_quantity(&fresh_market_core::ProductId::new("p004"), 1);
        assert_ne!(checkout.begin(&cart).unwrap(), key);
    }

    #[test]
    fn test_stale_keys_are_ignored() {
        let mut checkout = Checkout::default();
        let cart = cart();
        let key = checkout.begin(&cart).unwrap();
        let other = CheckoutKey::generate();

        assert!(!checkout.order_stored(other, order_for(other, &cart)));
        assert!(checkout.fail(other, "x").is_none());
        assert_eq!(checkout.awaiting_order(), Some(key));
    }
}
