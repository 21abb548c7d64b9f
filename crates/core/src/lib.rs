//! Fresh Market Core - Shared domain types.
//!
//! This crate provides the entities used across all Fresh Market components:
//! - `storefront` - The sync layer that mirrors remote documents for shoppers
//! - `admin` - Back office for members, orders, and the product catalog
//! - `cli` - Command-line tools for operators
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no store
//! access, no HTTP clients. Entities reference each other by string
//! identifier only, so the backing store can be swapped without changing
//! their shapes.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, statuses, and credentials
//! - [`catalog`] - Products, category filtering, and the seed catalog
//! - [`cart`] - The cart aggregate and its derived totals
//! - [`profile`] - Member profiles and favorites
//! - [`order`] - Order snapshots taken at checkout
//! - [`member`] - Administratively provisioned member records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod member;
pub mod order;
pub mod profile;
pub mod types;

pub use cart::{Cart, CartDocument, CartLine};
pub use catalog::{Catalog, CategoryFilter, Product};
pub use member::MemberRecord;
pub use order::{Order, OrderDraft, OrderLine};
pub use profile::{MemberProfile, ProfileError, ProfileUpdate};
pub use types::*;
