//! Member profiles and favorites.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Display name given to a member who has not set one.
pub const DEFAULT_MEMBER_NAME: &str = "新用戶";

/// Reasons a profile edit is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("name is required")]
    MissingName,
    #[error("email is required")]
    MissingEmail,
    #[error("shipping address is required")]
    MissingAddress,
}

/// A member's own profile document (`users/{member}/profile/data`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    /// Stored as an array; duplicates written by other clients collapse on
    /// decode.
    #[serde(default)]
    pub favorites: BTreeSet<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_name() -> String {
    DEFAULT_MEMBER_NAME.to_owned()
}

impl Default for MemberProfile {
    fn default() -> Self {
        Self {
            name: default_name(),
            email: String::new(),
            address: String::new(),
            favorites: BTreeSet::new(),
            last_login: None,
        }
    }
}

impl MemberProfile {
    /// Add or remove `product_id` from favorites. Returns whether it is now a
    /// favorite.
    pub fn toggle_favorite(&mut self, product_id: &ProductId) -> bool {
        if self.favorites.remove(product_id) {
            false
        } else {
            self.favorites.insert(product_id.clone());
            true
        }
    }

    #[must_use]
    pub fn is_favorite(&self, product_id: &ProductId) -> bool {
        self.favorites.contains(product_id)
    }

    /// Apply a validated edit, keeping favorites and login time.
    pub fn apply(&mut self, update: ProfileUpdate) {
        self.name = update.name;
        self.email = update.email;
        self.address = update.address;
    }

    /// Record a sign-in from the login screen.
    pub fn record_sign_in(&mut self, name: &str, email: &str, at: DateTime<Utc>) {
        self.name = name.trim().to_owned();
        self.email = email.trim().to_owned();
        self.last_login = Some(at);
    }

    /// Whether the member has filled in a shipping address.
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

/// Check the login form: both name and email must be filled in.
///
/// # Errors
///
/// Returns [`ProfileError::MissingName`] or [`ProfileError::MissingEmail`].
pub fn validate_sign_in(name: &str, email: &str) -> Result<(), ProfileError> {
    if name.trim().is_empty() {
        return Err(ProfileError::MissingName);
    }
    if email.trim().is_empty() {
        return Err(ProfileError::MissingEmail);
    }
    Ok(())
}

/// A profile edit submitted by the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub address: String,
}

impl ProfileUpdate {
    /// Trim fields and check that name and address are present.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] for the first missing required field.
    pub fn validated(self) -> Result<Self, ProfileError> {
        let update = Self {
            name: self.name.trim().to_owned(),
            email: self.email.trim().to_owned(),
            address: self.address.trim().to_owned(),
        };
        if update.name.is_empty() {
            return Err(ProfileError::MissingName);
        }
        if update.address.is_empty() {
            return Err(ProfileError::MissingAddress);
        }
        Ok(update)
    }
}
