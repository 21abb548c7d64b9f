//! Store access policy.
//!
//! Evaluated by the store on every call:
//!
//! | Area | Member (owner) | Other member | Admin |
//! |---|---|---|---|
//! | `users/{id}/cart`, `users/{id}/profile` | read, write | - | read |
//! | `users/{id}/orders` | read, create | - | read, write, delete |
//! | `public/...` | read | read | read, write, create, delete |
//! | `admin/...` | - | - | read, write, create, delete |
//!
//! Guests (no signed-in identity) may only read `public/...`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Caller, DocPath, StoreError, StoreResult};

const ROOT: &str = "artifacts";
const ORDERS: &str = "orders";

/// The kind of store call being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Create,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Check `caller` may perform `op` on `path`.
///
/// # Errors
///
/// Returns [`StoreError::PermissionDenied`] when the policy forbids it.
pub fn authorize(caller: &Caller, op: Operation, path: &DocPath) -> StoreResult<()> {
    if allowed(caller, op, path) {
        Ok(())
    } else {
        tracing::warn!(
            op = %op,
            path = %path,
            member = ?caller.member,
            role = %caller.role,
            "store access denied"
        );
        Err(StoreError::PermissionDenied {
            op,
            path: path.to_string(),
        })
    }
}

/// Check `caller` may read a collection group (the same collection id under
/// every parent). Only administrators may.
///
/// # Errors
///
/// Returns [`StoreError::PermissionDenied`] for non-administrators.
pub fn authorize_group(caller: &Caller, collection_id: &str) -> StoreResult<()> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(StoreError::PermissionDenied {
            op: Operation::Read,
            path: format!("*/{collection_id}"),
        })
    }
}

fn allowed(caller: &Caller, op: Operation, path: &DocPath) -> bool {
    let segments: Vec<&str> = path.segments().collect();
    let (Some(&ROOT), Some(_app), Some(area)) = (segments.first(), segments.get(1), segments.get(2))
    else {
        return false;
    };

    match *area {
        "public" => op == Operation::Read || caller.is_admin(),
        "admin" => caller.is_admin(),
        "users" => {
            let owner = segments.get(3).copied();
            let subtree = segments.get(4).copied();
            let is_owner = owner.is_some() && caller.member.as_ref().map(|m| m.as_str()) == owner;

            if is_owner {
                return match subtree {
                    Some(ORDERS) => matches!(op, Operation::Read | Operation::Create),
                    _ => true,
                };
            }
            if caller.is_admin() {
                return match op {
                    Operation::Read => true,
                    Operation::Write | Operation::Delete => subtree == Some(ORDERS) && path.is_document(),
                    Operation::Create => false,
                };
            }
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use fresh_market_core::MemberId;

    use super::*;

    fn path(s: &str) -> DocPath {
        DocPath::parse(s)
    }

    #[test]
    fn test_member_owns_cart_and_profile() {
        let me = Caller::member(MemberId::new("u1"));
        let cart = path("artifacts/app/users/u1/cart/current");
        assert!(authorize(&me, Operation::Read, &cart).is_ok());
        assert!(authorize(&me, Operation::Write, &cart).is_ok());

        let other = Caller::member(MemberId::new("u2"));
        assert!(authorize(&other, Operation::Read, &cart).is_err());
        assert!(authorize(&other, Operation::Write, &cart).is_err());
    }

    #[test]
    fn test_orders_are_append_only_for_members() {
        let me = Caller::member(MemberId::new("u1"));
        let orders = path("artifacts/app/users/u1/orders");
        let order = orders.child("o1");
        assert!(authorize(&me, Operation::Create, &orders).is_ok());
        assert!(authorize(&me, Operation::Read, &orders).is_ok());
        assert!(authorize(&me, Operation::Write, &order).is_err());
        assert!(authorize(&me, Operation::Delete, &order).is_err());

        let admin = Caller::admin(None);
        assert!(authorize(&admin, Operation::Write, &order).is_ok());
        assert!(authorize(&admin, Operation::Delete, &order).is_ok());
        assert!(authorize(&admin, Operation::Create, &orders).is_err());
        assert!(
            authorize(&admin, Operation::Write, &path("artifacts/app/users/u1/cart/current"))
                .is_err()
        );
    }

    #[test]
    fn test_public_catalog_read_only_for_shoppers() {
        let products = path("artifacts/app/public/data/products");
        assert!(authorize(&Caller::guest(), Operation::Read, &products).is_ok());
        assert!(
            authorize(&Caller::member(MemberId::new("u1")), Operation::Write, &products.child("p1"))
                .is_err()
        );
        assert!(authorize(&Caller::admin(None), Operation::Write, &products.child("p1")).is_ok());
    }

    #[test]
    fn test_admin_area_and_groups() {
        let members = path("artifacts/app/admin/data/members");
        assert!(authorize(&Caller::member(MemberId::new("u1")), Operation::Read, &members).is_err());
        assert!(authorize(&Caller::admin(None), Operation::Create, &members).is_ok());
        assert!(authorize_group(&Caller::member(MemberId::new("u1")), "orders").is_err());
        assert!(authorize_group(&Caller::admin(None), "orders").is_ok());
    }

    #[test]
    fn test_unknown_roots_denied() {
        let admin = Caller::admin(None);
        assert!(authorize(&admin, Operation::Read, &path("elsewhere/app/public/x")).is_err());
        assert!(authorize(&admin, Operation::Read, &path("artifacts/app")).is_err());
    }
}
