//! Administratively provisioned member accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Email, MemberId, MemberRole, MemberStatus, PasswordHash};

/// A member account as kept in `admin/data/members`.
///
/// The credential is a salted hash. Copies written to the local device
/// cache drop it entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub id: MemberId,
    pub name: String,
    pub email: Email,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default)]
    pub status: MemberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<PasswordHash>,
    pub created_at: DateTime<Utc>,
}

impl MemberRecord {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, MemberStatus::Active)
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, MemberRole::Admin)
    }

    /// A copy safe to store outside the document store.
    #[must_use]
    pub fn without_credential(&self) -> Self {
        Self {
            credential: None,
            ..self.clone()
        }
    }
}
