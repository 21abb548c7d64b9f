//! Back office sign-in.
//!
//! Operators get in either with the shared admin password (configured as an
//! Argon2 hash) or with their own member credential when their role is
//! admin. Both yield an administrator [`Caller`] for the store.

use fresh_market_core::PasswordHash;
use fresh_market_storefront::auth::{AuthError, verify_password};
use fresh_market_storefront::store::Caller;

use crate::config::AdminConfig;
use crate::error::{AdminError, Result, clear_sentry_user, set_sentry_user};
use crate::members::MemberDirectory;

/// Checks back office credentials.
#[derive(Debug, Clone)]
pub struct AdminGate {
    password_hash: Option<PasswordHash>,
}

impl AdminGate {
    #[must_use]
    pub const fn new(password_hash: Option<PasswordHash>) -> Self {
        Self { password_hash }
    }

    #[must_use]
    pub fn from_config(config: &AdminConfig) -> Self {
        Self::new(config.password_hash())
    }

    /// Sign in with the shared admin password.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` if no shared password is configured
    /// and `AuthError::InvalidCredentials` for a wrong password.
    pub fn sign_in(&self, password: &str) -> Result<Caller> {
        let hash = self.password_hash.as_ref().ok_or_else(|| {
            AdminError::Forbidden("shared admin password is not configured".to_string())
        })?;
        if let Err(e) = verify_password(password, hash) {
            tracing::warn!("admin sign-in with shared password failed");
            return Err(e.into());
        }
        tracing::info!("admin signed in with shared password");
        set_sentry_user("shared-admin", None);
        Ok(Caller::admin(None))
    }

    /// Sign in as a member whose role is admin.
    ///
    /// # Errors
    ///
    /// Returns the directory's authentication errors, or
    /// `AdminError::Forbidden` if the member is not an administrator.
    pub async fn sign_in_member(
        &self,
        directory: &MemberDirectory,
        email: &str,
        password: &str,
    ) -> Result<Caller> {
        let member = directory.authenticate(email, password).await?;
        if !member.is_admin() {
            tracing::warn!(member = %member.id, "non-admin member attempted back office sign-in");
            return Err(AdminError::Forbidden(format!(
                "{} is not an administrator",
                member.email
            )));
        }
        tracing::info!(member = %member.id, "admin member signed in");
        set_sentry_user(member.id.as_str(), Some(member.email.as_str()));
        Ok(Caller::admin(Some(member.id)))
    }

    /// Forget the signed-in operator.
    pub fn sign_out() {
        clear_sentry_user();
    }
}

/// Whether a failed sign-in should be shown as a credential problem rather
/// than an access problem.
#[must_use]
pub const fn is_credential_error(error: &AdminError) -> bool {
    matches!(
        error,
        AdminError::Auth(AuthError::InvalidCredentials | AuthError::AccountDisabled)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use fresh_market_core::MemberRole;
    use fresh_market_storefront::auth::hash_password;
    use fresh_market_storefront::cache::MemberCache;
    use fresh_market_storefront::store::{MemoryStore, StorePaths};

    use super::*;
    use crate::members::NewMember;

    #[test]
    fn test_shared_password() {
        let gate = AdminGate::new(Some(hash_password("back-office-pass").unwrap()));
        let caller = gate.sign_in("back-office-pass").unwrap();
        assert!(caller.is_admin());

        let err = gate.sign_in("guess").unwrap_err();
        assert!(is_credential_error(&err));
    }

    #[test]
    fn test_unconfigured_password() {
        let gate = AdminGate::new(None);
        assert!(matches!(gate.sign_in("anything"), Err(AdminError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_member_sign_in_requires_admin_role() {
        let dir = tempfile::tempdir().unwrap();
        let directory = MemberDirectory::new(
            Arc::new(MemoryStore::new()),
            StorePaths::new("c_test"),
            Caller::admin(None),
            MemberCache::in_dir(dir.path()),
        );
        for (email, role) in [("boss@example.com", MemberRole::Admin), ("shopper@example.com", MemberRole::General)] {
            directory
                .create(NewMember {
                    name: "operator".to_string(),
                    email: email.to_string(),
                    password: "market-day-42".to_string(),
                    role,
                })
                .await
                .unwrap();
        }
        let gate = AdminGate::new(None);

        let caller = gate
            .sign_in_member(&directory, "boss@example.com", "market-day-42")
            .await
            .unwrap();
        assert!(caller.is_admin());
        assert!(caller.member.is_some());

        let err = gate
            .sign_in_member(&directory, "shopper@example.com", "market-day-42")
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Forbidden(_)));
        assert!(!is_credential_error(&err));
    }
}
