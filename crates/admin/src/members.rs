//! Member account management.
//!
//! Members live in `admin/data/members`, readable only by administrators.
//! Every change rewrites the local [`MemberCache`] so the list can still be
//! shown when the store is unreachable.

use std::sync::Arc;

use chrono::Utc;
use fresh_market_core::{Email, MemberId, MemberRecord, MemberRole, MemberStatus};
use fresh_market_storefront::auth::{AuthError, hash_password, verify_password};
use fresh_market_storefront::cache::MemberCache;
use fresh_market_storefront::store::{
    Caller, DocumentStore, StoreError, StorePaths, StoreResult, WriteMode,
};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AdminError, Result};

/// Input for [`MemberDirectory::create`].
#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: MemberRole,
}

/// Fields to change on a member. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct MemberUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<MemberRole>,
}

/// A member list and where it came from.
#[derive(Debug, Clone)]
pub struct MemberListing {
    pub members: Vec<MemberRecord>,
    /// The store was unreachable and the list was read from the local cache.
    pub from_cache: bool,
}

/// Member CRUD against the store, with a local cache fallback.
pub struct MemberDirectory {
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    caller: Caller,
    cache: MemberCache,
}

impl MemberDirectory {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        paths: StorePaths,
        caller: Caller,
        cache: MemberCache,
    ) -> Self {
        Self {
            store,
            paths,
            caller,
            cache,
        }
    }

    /// List members, oldest first. Falls back to the local cache when the
    /// store is unreachable.
    ///
    /// # Errors
    ///
    /// Returns error if the store refuses the read, or if it is unreachable
    /// and the cache cannot be read either.
    pub async fn list(&self) -> Result<MemberListing> {
        match self.fetch_all().await {
            Ok(members) => Ok(MemberListing {
                members,
                from_cache: false,
            }),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "store unreachable, reading cached members");
                Ok(MemberListing {
                    members: self.cache.load().await?,
                    from_cache: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read one member.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if there is no such member.
    pub async fn get(&self, id: &MemberId) -> Result<MemberRecord> {
        let doc = self
            .store
            .get(&self.caller, &self.paths.member(id))
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("member {id}")))?;
        Ok(doc.decode()?)
    }

    /// Create a member with a hashed credential.
    ///
    /// # Errors
    ///
    /// Returns error if the name is blank, the email is invalid or already
    /// registered, the password is too weak, or the write fails.
    #[instrument(skip_all, fields(email = %new.email))]
    pub async fn create(&self, new: NewMember) -> Result<MemberRecord> {
        let name = required_name(&new.name)?;
        let email = Email::parse(&new.email).map_err(AuthError::from)?;
        self.ensure_email_free(&email, None).await?;

        let record = MemberRecord {
            id: MemberId::new(Uuid::new_v4().to_string()),
            name,
            email,
            role: new.role,
            status: MemberStatus::Active,
            credential: Some(hash_password(&new.password)?),
            created_at: Utc::now(),
        };
        self.put(&record).await?;
        tracing::info!(member = %record.id, role = %record.role, "member created");
        self.refresh_cache().await;
        Ok(record)
    }

    /// Change a member's name, email, or role.
    ///
    /// # Errors
    ///
    /// Returns error if the member does not exist, a new value is invalid,
    /// or the write fails.
    #[instrument(skip_all, fields(member = %id))]
    pub async fn update(&self, id: &MemberId, update: MemberUpdate) -> Result<MemberRecord> {
        let mut record = self.get(id).await?;
        if let Some(name) = update.name {
            record.name = required_name(&name)?;
        }
        if let Some(email) = update.email {
            let email = Email::parse(&email).map_err(AuthError::from)?;
            if email != record.email {
                self.ensure_email_free(&email, Some(id)).await?;
                record.email = email;
            }
        }
        if let Some(role) = update.role {
            record.role = role;
        }
        self.put(&record).await?;
        self.refresh_cache().await;
        Ok(record)
    }

    /// Replace a member's credential.
    ///
    /// # Errors
    ///
    /// Returns error if the member does not exist, the password is too weak,
    /// or the write fails.
    pub async fn set_password(&self, id: &MemberId, password: &str) -> Result<()> {
        let mut record = self.get(id).await?;
        record.credential = Some(hash_password(password)?);
        self.put(&record).await?;
        tracing::info!(member = %id, "member password changed");
        Ok(())
    }

    /// Enable or disable a member.
    ///
    /// # Errors
    ///
    /// Returns error if the member does not exist or the write fails.
    pub async fn set_status(&self, id: &MemberId, status: MemberStatus) -> Result<MemberRecord> {
        let path = self.paths.member(id);
        if self.store.get(&self.caller, &path).await?.is_none() {
            return Err(AdminError::NotFound(format!("member {id}")));
        }
        let doc = self
            .store
            .write(&self.caller, &path, json!({ "status": status }), WriteMode::Merge)
            .await?;
        tracing::info!(member = %id, ?status, "member status changed");
        self.refresh_cache().await;
        Ok(doc.decode()?)
    }

    /// Flip a member between active and disabled, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns error if the member does not exist or the write fails.
    pub async fn toggle_status(&self, id: &MemberId) -> Result<MemberStatus> {
        let next = self.get(id).await?.status.toggled();
        self.set_status(id, next).await?;
        Ok(next)
    }

    /// Delete a member.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if there is no such member.
    pub async fn delete(&self, id: &MemberId) -> Result<()> {
        match self.store.delete(&self.caller, &self.paths.member(id)).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                return Err(AdminError::NotFound(format!("member {id}")));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(member = %id, "member deleted");
        self.refresh_cache().await;
        Ok(())
    }

    /// Check a member's email and password.
    ///
    /// Disabled members are rejected even with the right password. Needs the
    /// store: cached members carry no credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email or wrong
    /// password and `AuthError::AccountDisabled` for a disabled member.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<MemberRecord> {
        let email = Email::parse(email).map_err(AuthError::from)?;
        let member = self
            .fetch_all()
            .await?
            .into_iter()
            .find(|m| m.email == email)
            .ok_or(AuthError::InvalidCredentials)?;

        let credential = member
            .credential
            .as_ref()
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, credential)?;

        if !member.is_active() {
            tracing::warn!(member = %member.id, "disabled member attempted sign-in");
            return Err(AuthError::AccountDisabled.into());
        }
        Ok(member)
    }

    // ===== Internals =====

    async fn fetch_all(&self) -> StoreResult<Vec<MemberRecord>> {
        let docs = self.store.list(&self.caller, &self.paths.members()).await?;
        let mut members: Vec<MemberRecord> = docs
            .iter()
            .filter_map(|doc| {
                doc.decode::<MemberRecord>()
                    .map_err(|e| tracing::warn!(error = %e, "skipping malformed member"))
                    .ok()
            })
            .collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(members)
    }

    async fn put(&self, record: &MemberRecord) -> Result<()> {
        let data = serde_json::to_value(record)
            .map_err(|e| AdminError::BadRequest(format!("member not serializable: {e}")))?;
        self.store
            .write(&self.caller, &self.paths.member(&record.id), data, WriteMode::Replace)
            .await?;
        Ok(())
    }

    async fn ensure_email_free(&self, email: &Email, except: Option<&MemberId>) -> Result<()> {
        let taken = self
            .fetch_all()
            .await?
            .iter()
            .any(|m| &m.email == email && Some(&m.id) != except);
        if taken {
            return Err(AdminError::BadRequest(format!("{email} is already registered")));
        }
        Ok(())
    }

    /// Rewrite the local cache from the store. The change that triggered it
    /// has already been stored, so failures are only logged.
    async fn refresh_cache(&self) {
        let members = match self.fetch_all().await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(error = %e, "could not reload members for cache");
                return;
            }
        };
        if let Err(e) = self.cache.save(&members).await {
            AdminError::from(e).report();
        }
    }
}

fn required_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::BadRequest("member name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fresh_market_storefront::store::MemoryStore;

    use super::*;

    struct Fixture {
        store: MemoryStore,
        directory: MemberDirectory,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let directory = MemberDirectory::new(
            Arc::new(store.clone()),
            StorePaths::new("c_test"),
            Caller::admin(None),
            MemberCache::in_dir(dir.path()),
        );
        Fixture {
            store,
            directory,
            dir,
        }
    }

    fn new_member(email: &str) -> NewMember {
        NewMember {
            name: "王小明".to_string(),
            email: email.to_string(),
            password: "market-day-42".to_string(),
            role: MemberRole::General,
        }
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let f = fixture();
        let created = f.directory.create(new_member("Ming@Example.com")).await.unwrap();
        assert_eq!(created.email.as_str(), "ming@example.com");

        let member = f
            .directory
            .authenticate("ming@example.com", "market-day-42")
            .await
            .unwrap();
        assert_eq!(member.id, created.id);

        let err = f
            .directory
            .authenticate("ming@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let f = fixture();
        f.directory.create(new_member("a@example.com")).await.unwrap();
        let err = f.directory.create(new_member("A@example.com")).await.unwrap_err();
        assert!(matches!(err, AdminError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_disabled_member_cannot_sign_in() {
        let f = fixture();
        let created = f.directory.create(new_member("a@example.com")).await.unwrap();

        assert_eq!(
            f.directory.toggle_status(&created.id).await.unwrap(),
            MemberStatus::Disabled
        );
        let err = f
            .directory
            .authenticate("a@example.com", "market-day-42")
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Auth(AuthError::AccountDisabled)));

        f.directory.set_status(&created.id, MemberStatus::Active).await.unwrap();
        assert!(f.directory.authenticate("a@example.com", "market-day-42").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let f = fixture();
        let created = f.directory.create(new_member("a@example.com")).await.unwrap();

        let updated = f
            .directory
            .update(
                &created.id,
                MemberUpdate {
                    name: Some("陳大文".to_string()),
                    role: Some(MemberRole::Admin),
                    ..MemberUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "陳大文");
        assert!(updated.is_admin());

        f.directory.delete(&created.id).await.unwrap();
        assert!(matches!(
            f.directory.delete(&created.id).await,
            Err(AdminError::NotFound(_))
        ));
        assert!(matches!(f.directory.get(&created.id).await, Err(AdminError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_offline_list_reads_cache_without_credentials() {
        let f = fixture();
        f.directory.create(new_member("a@example.com")).await.unwrap();
        f.directory.create(new_member("b@example.com")).await.unwrap();

        f.store.set_unavailable(true);
        let listing = f.directory.list().await.unwrap();
        assert!(listing.from_cache);
        assert_eq!(listing.members.len(), 2);
        assert!(listing.members.iter().all(|m| m.credential.is_none()));

        f.store.set_unavailable(false);
        let listing = f.directory.list().await.unwrap();
        assert!(!listing.from_cache);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_list() {
        let f = fixture();
        let directory = MemberDirectory::new(
            Arc::new(f.store.clone()),
            StorePaths::new("c_test"),
            Caller::member(MemberId::new("u1")),
            MemberCache::in_dir(f.dir.path()),
        );
        assert!(matches!(
            directory.list().await,
            Err(AdminError::Store(StoreError::PermissionDenied { .. }))
        ));
    }
}
