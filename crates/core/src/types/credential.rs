//! Stored member credentials.
//!
//! Members never have their password stored. Only a salted hash in PHC string
//! format (e.g. `$argon2id$v=19$...`) is persisted and compared.

use serde::{Deserialize, Serialize};

/// A salted password hash in PHC string format.
///
/// `Debug` is redacted so hashes never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap an already-computed PHC hash string.
    ///
    /// Returns `None` if the string does not look like a PHC hash, which
    /// guards against a plaintext password being stored by mistake.
    #[must_use]
    pub fn from_phc(phc: impl Into<String>) -> Option<Self> {
        let phc = phc.into();
        let is_phc = phc.starts_with('$') && phc.split('$').filter(|s| !s.is_empty()).count() >= 3;
        is_phc.then_some(Self(phc))
    }

    /// The PHC string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_rejected() {
        assert!(PasswordHash::from_phc("hunter22").is_none());
        assert!(PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA").is_some());
    }

    #[test]
    fn test_debug_redacted() {
        let hash = PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA");
        let rendered = format!("{hash:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("argon2id"));
    }
}
