//! Local device cache of the member list.
//!
//! The back office keeps a copy of the member list on disk so it can still
//! show members when the store is unreachable. The file holds the whole list
//! under one fixed name and is replaced wholesale on every save. Credentials
//! are stripped before anything is written.

use std::path::{Path, PathBuf};

use fresh_market_core::MemberRecord;
use thiserror::Error;

/// File name of the member cache inside the cache directory.
pub const MEMBER_CACHE_FILE: &str = "fresh-market.members.v1.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The on-disk member cache.
#[derive(Debug, Clone)]
pub struct MemberCache {
    path: PathBuf,
}

impl MemberCache {
    /// A cache stored in `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(MEMBER_CACHE_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the cached list with `members`, minus their credentials.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the file cannot
    /// be written.
    pub async fn save(&self, members: &[MemberRecord]) -> Result<(), CacheError> {
        let stripped: Vec<MemberRecord> = members
            .iter()
            .map(MemberRecord::without_credential)
            .collect();
        let body = serde_json::to_vec_pretty(&stripped)?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::debug!(path = %self.path.display(), members = stripped.len(), "member cache saved");
        Ok(())
    }

    /// Load the cached list. A missing file is an empty list.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or does not hold a member
    /// list.
    pub async fn load(&self) -> Result<Vec<MemberRecord>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(body) => Ok(serde_json::from_slice(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use fresh_market_core::{Email, MemberId, MemberRole, MemberStatus, PasswordHash};

    use super::*;

    fn member(id: &str) -> MemberRecord {
        MemberRecord {
            id: MemberId::new(id),
            name: format!("member {id}"),
            email: Email::parse(&format!("{id}@example.com")).unwrap(),
            role: MemberRole::General,
            status: MemberStatus::Active,
            credential: PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MemberCache::in_dir(dir.path());
        assert!(cache.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_strips_credentials_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MemberCache::in_dir(dir.path().join("nested"));

        cache.save(&[member("a"), member("b")]).await.unwrap();
        let raw = std::fs::read_to_string(cache.path()).unwrap();
        assert!(!raw.contains("argon2"));

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|m| m.credential.is_none()));

        cache.save(&[member("c")]).await.unwrap();
        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_str(), "c");
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MemberCache::in_dir(dir.path());
        std::fs::write(cache.path(), "{not json").unwrap();
        assert!(matches!(cache.load().await, Err(CacheError::Corrupt(_))));
    }
}
