//! Store path layout.
//!
//! ```text
//! artifacts/{app}/public/data/products/{product}
//! artifacts/{app}/users/{member}/cart/current
//! artifacts/{app}/users/{member}/profile/data
//! artifacts/{app}/users/{member}/orders/{order}
//! artifacts/{app}/admin/data/members/{member}
//! ```

use fresh_market_core::{MemberId, OrderId, ProductId};

use super::DocPath;

/// Builds every path the storefront reads or writes, scoped by app id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    app_id: String,
}

impl StorePaths {
    #[must_use]
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    fn root(&self) -> DocPath {
        DocPath::from_segments(["artifacts", self.app_id.as_str()])
    }

    fn member_root(&self, member: &MemberId) -> DocPath {
        self.root().child("users").child(member.as_str())
    }

    /// The shared product collection.
    #[must_use]
    pub fn products(&self) -> DocPath {
        self.root().child("public").child("data").child("products")
    }

    #[must_use]
    pub fn product(&self, id: &ProductId) -> DocPath {
        self.products().child(id.as_str())
    }

    #[must_use]
    pub fn cart(&self, member: &MemberId) -> DocPath {
        self.member_root(member).child("cart").child("current")
    }

    #[must_use]
    pub fn profile(&self, member: &MemberId) -> DocPath {
        self.member_root(member).child("profile").child("data")
    }

    #[must_use]
    pub fn orders(&self, member: &MemberId) -> DocPath {
        self.member_root(member).child("orders")
    }

    #[must_use]
    pub fn order(&self, member: &MemberId, order: &OrderId) -> DocPath {
        self.orders(member).child(order.as_str())
    }

    /// Administratively provisioned member accounts.
    #[must_use]
    pub fn members(&self) -> DocPath {
        self.root().child("admin").child("data").child("members")
    }

    #[must_use]
    pub fn member(&self, member: &MemberId) -> DocPath {
        self.members().child(member.as_str())
    }

    /// The owning member of a path under `users/{member}`, if any.
    #[must_use]
    pub fn owner_of(&self, path: &DocPath) -> Option<MemberId> {
        let mut segments = path.segments();
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some("artifacts"), Some(app), Some("users"), Some(member)) if app == self.app_id => {
                Some(MemberId::new(member))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = StorePaths::new("c_farm");
        let member = MemberId::new("u1");
        assert_eq!(paths.cart(&member).as_str(), "artifacts/c_farm/users/u1/cart/current");
        assert_eq!(paths.profile(&member).as_str(), "artifacts/c_farm/users/u1/profile/data");
        assert!(paths.orders(&member).is_collection());
        assert_eq!(paths.products().as_str(), "artifacts/c_farm/public/data/products");
        assert!(paths.member(&member).is_document());
    }

    #[test]
    fn test_owner_of() {
        let paths = StorePaths::new("c_farm");
        let order = paths.order(&MemberId::new("u9"), &OrderId::new("o1"));
        assert_eq!(paths.owner_of(&order), Some(MemberId::new("u9")));
        assert_eq!(paths.owner_of(&paths.products()), None);
        assert_eq!(StorePaths::new("other").owner_of(&order), None);
    }
}
