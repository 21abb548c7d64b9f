//! Fresh Market back office.
//!
//! Administrator tools over the same document store the storefront uses:
//! member accounts, every member's orders, the product catalog, and
//! summary reports.
//!
//! # Security
//!
//! Every desk acts with an administrator [`Caller`] obtained from
//! [`AdminGate`]. The store's access policy still applies, so a desk built
//! with a member caller is refused.
//!
//! [`Caller`]: fresh_market_storefront::store::Caller

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod gate;
pub mod members;
pub mod orders;
pub mod products;
pub mod reports;

pub use config::AdminConfig;
pub use error::{AdminError, Result};
pub use gate::AdminGate;
pub use members::{MemberDirectory, MemberListing, MemberUpdate, NewMember};
pub use orders::{AdminOrderView, OrderDesk};
pub use products::ProductDesk;
