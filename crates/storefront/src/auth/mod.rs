//! Authentication.
//!
//! The storefront signs in either anonymously or with a custom token handed
//! out by the hosting page. The resulting [`Identity`] id scopes every
//! per-member store path. Credentials for the back office are checked with
//! the Argon2 helpers in [`password`].

mod error;
pub mod password;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fresh_market_core::MemberId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

pub use error::AuthError;
pub use password::{hash_password, validate_password, verify_password};

/// How an identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProvider {
    Anonymous,
    Token,
}

/// A signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: MemberId,
    pub provider: IdentityProvider,
}

/// An authentication service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Sign in without credentials, creating a fresh identity.
    async fn sign_in_anonymous(&self) -> Result<Identity, AuthError>;

    /// Sign in with a custom token.
    async fn sign_in_with_token(&self, token: &SecretString) -> Result<Identity, AuthError>;

    /// Sign the current identity out.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The identity currently signed in, if any.
    fn current(&self) -> Option<Identity>;

    /// Identity changes, starting at the current identity.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}

/// In-process [`AuthProvider`] that issues its own custom tokens.
pub struct LocalAuthProvider {
    tokens: Mutex<HashMap<String, MemberId>>,
    current: watch::Sender<Option<Identity>>,
}

impl Default for LocalAuthProvider {
    fn default() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            current: watch::Sender::new(None),
        }
    }
}

impl std::fmt::Debug for LocalAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAuthProvider")
            .field("tokens", &"[REDACTED]")
            .field("current", &*self.current.borrow())
            .finish()
    }
}

impl LocalAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<String, MemberId>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a custom token that signs in as `member`.
    #[must_use]
    pub fn issue_token(&self, member: &MemberId) -> SecretString {
        let token = format!("fm-{}", Uuid::new_v4().simple());
        self.tokens().insert(token.clone(), member.clone());
        SecretString::from(token)
    }

    /// Revoke a previously issued token.
    pub fn revoke_token(&self, token: &SecretString) {
        self.tokens().remove(token.expose_secret());
    }

    fn set_current(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in_anonymous(&self) -> Result<Identity, AuthError> {
        let identity = Identity {
            id: MemberId::new(format!("anon-{}", Uuid::new_v4().simple())),
            provider: IdentityProvider::Anonymous,
        };
        tracing::info!(member = %identity.id, "signed in anonymously");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_token(&self, token: &SecretString) -> Result<Identity, AuthError> {
        let member = self
            .tokens()
            .get(token.expose_secret())
            .cloned()
            .ok_or(AuthError::InvalidToken)?;
        let identity = Identity {
            id: member,
            provider: IdentityProvider::Token,
        };
        tracing::info!(member = %identity.id, "signed in with token");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(identity) = self.current() {
            tracing::info!(member = %identity.id, "signed out");
        }
        self.set_current(None);
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

/// Sign in with `token` if present, otherwise anonymously.
///
/// # Errors
///
/// Returns the provider's error if sign-in fails.
pub async fn sign_in(
    provider: &dyn AuthProvider,
    token: Option<&SecretString>,
) -> Result<Identity, AuthError> {
    match token {
        Some(token) => provider.sign_in_with_token(token).await,
        None => provider.sign_in_anonymous().await,
    }
}
