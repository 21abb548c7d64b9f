//! Fresh Market storefront sync layer.
//!
//! Keeps a shopper's cart, profile, and order history consistent between
//! local state and the shared document store. Local edits apply at once and
//! are written in the background; remote snapshots are reconciled without
//! losing edits that are still in flight.
//!
//! The entry point is [`sync::SyncEngine`], built over any
//! [`store::DocumentStore`]. [`store::MemoryStore`] is the in-process store
//! used by tests and offline mode.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cache;
pub mod checkout;
pub mod config;
pub mod error;
pub mod feed;
pub mod store;
pub mod sync;

pub use checkout::{CheckoutOutcome, CheckoutStage, CheckoutState};
pub use config::StorefrontConfig;
pub use error::{Entity, Notification, NotificationLevel, SyncError};
pub use sync::SyncEngine;
