//! Document store port.
//!
//! The storefront never talks to a concrete database. Everything goes through
//! [`DocumentStore`], a hierarchical document database with live snapshots:
//! paths alternate collection and document segments
//! (`artifacts/{app}/users/{member}/cart/current`), documents hold JSON, and
//! every successful write is stamped with a store-wide monotonic
//! [`Revision`] and server timestamps.
//!
//! Every call carries the [`Caller`] so the store can enforce the access
//! policy in [`access`] itself.

pub mod access;
pub mod memory;
pub mod paths;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fresh_market_core::{MemberId, MemberRole, Order, OrderDraft, OrderId, Product};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

pub use access::Operation;
pub use memory::MemoryStore;
pub use paths::StorePaths;

/// Errors returned by a [`DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller may not perform this operation on this path.
    #[error("permission denied: {op} on {path}")]
    PermissionDenied { op: Operation, path: String },

    /// The store could not be reached. Retrying may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No document at this path.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The path does not name a document (or collection) where one is needed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Stored data did not match the expected shape.
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    /// Snapshot file I/O failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot JSON was malformed.
    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the same call may succeed if repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ===== Paths =====

/// A slash-separated store path.
///
/// Paths with an even number of segments name documents; odd ones name
/// collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(String);

impl DocPath {
    /// Build a path from segments. Empty segments are dropped.
    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .filter(|s| !s.as_ref().is_empty())
            .map(|s| s.as_ref().trim_matches('/').to_owned())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Parse a path string.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self::from_segments(path.split('/'))
    }

    /// Append one segment.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        Self::from_segments([self.0.as_str(), segment])
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this path names a document.
    #[must_use]
    pub fn is_document(&self) -> bool {
        let len = self.len();
        len > 0 && len % 2 == 0
    }

    /// Whether this path names a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.len() % 2 == 1
    }

    /// The last segment (the document id for document paths).
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The path with its last segment removed.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('/').map(|(parent, _)| Self(parent.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ===== Documents =====

/// Store-wide write counter. Every successful write gets a larger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub path: DocPath,
    pub revision: Revision,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// The document id (last path segment).
    #[must_use]
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Decode the document body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        T::deserialize(&self.data).map_err(|e| StoreError::Decode {
            path: self.path.to_string(),
            message: e.to_string(),
        })
    }

    /// Decode a product document. The id comes from the path when the body
    /// does not carry one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the body is not a product.
    pub fn to_product(&self) -> StoreResult<Product> {
        let mut data = self.data.clone();
        if let Value::Object(fields) = &mut data {
            fields
                .entry("id")
                .or_insert_with(|| Value::String(self.id().to_owned()));
        }
        Product::deserialize(&data).map_err(|e| StoreError::Decode {
            path: self.path.to_string(),
            message: e.to_string(),
        })
    }

    /// Decode an order document, taking its id from the path and its
    /// creation time from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the body is not an order.
    pub fn to_order(&self) -> StoreResult<Order> {
        let draft = self.decode::<OrderDraft>()?;
        Ok(Order::new(OrderId::new(self.id()), self.created_at, draft))
    }
}

/// How a write combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole body.
    Replace,
    /// Merge object fields recursively; other values are overwritten.
    Merge,
}

// ===== Callers =====

/// The identity a store call is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub member: Option<MemberId>,
    pub role: MemberRole,
}

impl Caller {
    /// No signed-in identity.
    #[must_use]
    pub const fn guest() -> Self {
        Self {
            member: None,
            role: MemberRole::General,
        }
    }

    /// A signed-in shopper.
    #[must_use]
    pub const fn member(id: MemberId) -> Self {
        Self {
            member: Some(id),
            role: MemberRole::General,
        }
    }

    /// A back-office identity, optionally tied to a member account.
    #[must_use]
    pub const fn admin(id: Option<MemberId>) -> Self {
        Self {
            member: id,
            role: MemberRole::Admin,
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, MemberRole::Admin)
    }
}

// ===== Port =====

/// A hierarchical document database with live snapshots.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, caller: &Caller, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Read every document directly inside `collection`, ordered by path.
    async fn list(&self, caller: &Caller, collection: &DocPath) -> StoreResult<Vec<Document>>;

    /// Read every document in any collection whose last segment is
    /// `collection_id` (e.g. all members' `orders`).
    async fn list_group(&self, caller: &Caller, collection_id: &str) -> StoreResult<Vec<Document>>;

    /// Subscribe to one document. The receiver starts at the current value.
    async fn watch_document(
        &self,
        caller: &Caller,
        path: &DocPath,
    ) -> StoreResult<watch::Receiver<Option<Document>>>;

    /// Subscribe to a collection. The receiver starts at the current value.
    async fn watch_collection(
        &self,
        caller: &Caller,
        collection: &DocPath,
    ) -> StoreResult<watch::Receiver<Vec<Document>>>;

    /// Write a document, returning it as stored after the write.
    async fn write(
        &self,
        caller: &Caller,
        path: &DocPath,
        data: Value,
        mode: WriteMode,
    ) -> StoreResult<Document>;

    /// Add a document with a store-assigned id.
    ///
    /// Repeating a create with the same `idempotency_key` in the same
    /// collection returns the document created the first time.
    async fn create(
        &self,
        caller: &Caller,
        collection: &DocPath,
        data: Value,
        idempotency_key: Option<&str>,
    ) -> StoreResult<Document>;

    /// Delete a document.
    async fn delete(&self, caller: &Caller, path: &DocPath) -> StoreResult<()>;
}

/// Recursively merge `patch` into `target`.
pub(crate) fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                match existing.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => merge_json(slot, value),
                    _ => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_doc_path_shape() {
        let cart = DocPath::parse("artifacts/app/users/u1/cart/current");
        assert!(cart.is_document());
        assert_eq!(cart.id(), "current");
        assert_eq!(cart.parent().unwrap().as_str(), "artifacts/app/users/u1/cart");

        let orders = DocPath::from_segments(["artifacts", "app", "users", "u1", "orders"]);
        assert!(orders.is_collection());
        assert_eq!(orders.child("o1").id(), "o1");
        assert_eq!(DocPath::parse("/a//b/").as_str(), "a/b");
    }

    #[test]
    fn test_merge_json_is_recursive() {
        let mut doc = json!({"name": "阿明", "prefs": {"lang": "zh", "theme": "light"}, "favorites": ["p1"]});
        merge_json(
            &mut doc,
            json!({"prefs": {"theme": "dark"}, "favorites": ["p2"], "email": "a@b.c"}),
        );
        assert_eq!(
            doc,
            json!({"name": "阿明", "prefs": {"lang": "zh", "theme": "dark"}, "favorites": ["p2"], "email": "a@b.c"})
        );
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(
            !StoreError::PermissionDenied {
                op: Operation::Write,
                path: "x".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_document_decode_error_names_path() {
        let doc = Document {
            path: DocPath::parse("a/b"),
            revision: Revision(1),
            data: json!({"items": "oops"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = doc.decode::<fresh_market_core::Cart>().unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref path, .. } if path == "a/b"));
    }
}
