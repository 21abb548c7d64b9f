//! Sync layer errors, shopper notifications, and Sentry helpers.
//!
//! Every [`SyncError`] is converted into a [`Notification`] at the sync layer
//! boundary, so presentation code only ever sees notifications.

use std::fmt;

use fresh_market_core::{Price, ProductId, ProfileError};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// The mirrored entity an error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Cart,
    Profile,
    Order,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cart => "cart",
            Self::Profile => "profile",
            Self::Order => "order",
        })
    }
}

/// Errors raised by sync layer actions.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The action needs a bound member identity.
    #[error("not signed in")]
    NotAuthenticated,

    /// Checkout with no cart lines.
    #[error("cart is empty")]
    EmptyCart,

    /// A checkout is already being submitted.
    #[error("checkout already in progress")]
    AlreadySubmitting,

    /// A store write failed after retries were exhausted.
    #[error("failed to persist {entity}: {reason}")]
    PersistenceFailure { entity: Entity, reason: String },

    /// A remote echo arrived while a local write was in flight. Handled by
    /// deferral and never surfaced.
    #[error("stale {entity} snapshot deferred")]
    StaleRead { entity: Entity },

    /// A profile edit was missing a required field.
    #[error("invalid profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    /// The product is not in the current catalog.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    /// A store call failed outside of a mirrored write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored document could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result type alias for sync layer actions.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Report failures that indicate lost or rejected data to Sentry.
    pub fn report(&self) {
        if matches!(self, Self::PersistenceFailure { .. } | Self::Store(_) | Self::Decode(_)) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Sync error"
            );
        }
    }
}

// ===== Notifications =====

/// Severity of a shopper notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// A message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    /// `{name} 已加入購物車`
    #[must_use]
    pub fn added_to_cart(name: &str) -> Self {
        Self::success(format!("{name} 已加入購物車"))
    }

    #[must_use]
    pub fn favorite_toggled(now_favorite: bool) -> Self {
        Self::success(if now_favorite {
            "已加入我的最愛"
        } else {
            "已從我的最愛移除"
        })
    }

    #[must_use]
    pub fn checkout_succeeded(total: Price) -> Self {
        Self::success(format!("結帳成功！總金額 {}", total.display()))
    }

    #[must_use]
    pub fn signed_in() -> Self {
        Self::success("登入成功！")
    }

    #[must_use]
    pub fn profile_saved() -> Self {
        Self::success("資料更新成功！")
    }

    /// The notification for `err`, or `None` for errors that are handled
    /// silently.
    #[must_use]
    pub fn from_error(err: &SyncError) -> Option<Self> {
        let notification = match err {
            SyncError::StaleRead { .. } => return None,
            SyncError::NotAuthenticated => Self::error("請先登入"),
            SyncError::EmptyCart => Self::info("購物車是空的"),
            SyncError::AlreadySubmitting => Self::info("訂單送出中，請稍候"),
            SyncError::PersistenceFailure { entity, reason } => match entity {
                Entity::Cart => Self::error(format!("購物車更新失敗：{reason}")),
                Entity::Profile => Self::error(format!("資料更新失敗：{reason}")),
                Entity::Order => Self::error(format!("結帳失敗：{reason}")),
            },
            SyncError::InvalidProfile(ProfileError::MissingEmail) => {
                Self::error("請輸入姓名與電子郵件")
            }
            SyncError::InvalidProfile(_) => Self::error("姓名與地址不能為空！"),
            SyncError::UnknownProduct(id) => Self::error(format!("找不到商品：{id}")),
            SyncError::Store(e) => Self::error(format!("連線失敗：{e}")),
            SyncError::Decode(e) => Self::error(format!("資料格式錯誤：{e}")),
        };
        Some(notification)
    }
}

// ===== Sentry =====

/// Set the Sentry user context from a member ID.
///
/// Call this after binding an identity to associate errors with members.
pub fn set_sentry_user(member_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(member_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on unbind to stop associating errors with the member.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "p001")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
