//! Identity provider interface and the in-process reference implementation.
//!
//! The provider owns credentials and the ambient session; it knows nothing
//! about usernames, profiles documents, or the task graph. Guest and
//! credentialed sessions are distinct types, and a guest is upgraded in
//! place, keeping its account id, via [`IdentityProvider::link_credential`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;
use crate::store::Subscription;

/// Secrets shorter than this are rejected by the reference provider
pub const MIN_SECRET_LEN: usize = 6;

/// Anonymous session; carries no credential and no profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestSession {
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Session backed by an identifier/secret credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub account_id: Uuid,
    pub identifier: String,
    pub display_name: Option<String>,
}

/// The two session states. There is no "anonymous flag" on a common type;
/// call sites must handle both variants explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Guest(GuestSession),
    Authenticated(AuthenticatedSession),
}

impl Session {
    pub fn account_id(&self) -> Uuid {
        match self {
            Session::Guest(guest) => guest.account_id,
            Session::Authenticated(auth) => auth.account_id,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Session::Guest(_))
    }
}

/// Receives the new session state (or `None` after sign-out)
pub type SessionCallback = Box<dyn FnMut(Option<Session>) + Send>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("an account already exists for this identifier")]
    IdentifierTaken,
    #[error("secret is shorter than {MIN_SECRET_LEN} characters")]
    WeakSecret,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("no account for this identifier")]
    AccountNotFound,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::IdentifierTaken => CoreError::UsernameTaken,
            ProviderError::WeakSecret => {
                CoreError::Validation("Password should be at least 6 characters.".to_string())
            }
            ProviderError::InvalidCredential => CoreError::InvalidCredential,
            ProviderError::AccountNotFound => CoreError::AccountNotFound,
            ProviderError::Unavailable(message) => CoreError::ProviderUnavailable(message),
        }
    }
}

/// Credential and session operations offered by an identity backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a credentialed account and make it the current session
    async fn create_account(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedSession, ProviderError>;

    /// Exchange a credential for a session
    async fn sign_in(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedSession, ProviderError>;

    /// Start a fresh anonymous session
    async fn sign_in_anonymously(&self) -> Result<GuestSession, ProviderError>;

    /// Attach a credential to a guest session. The account id is preserved,
    /// so documents written by the guest stay owned by the same account.
    async fn link_credential(
        &self,
        session: &GuestSession,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedSession, ProviderError>;

    /// Set the display name on a credentialed account
    async fn update_profile(
        &self,
        account_id: Uuid,
        display_name: &str,
    ) -> Result<(), ProviderError>;

    /// End the current session
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// The ambient session, if any
    async fn current_session(&self) -> Option<Session>;

    /// Observe session changes. The callback fires immediately with the
    /// current state, then on every sign-in, upgrade, and sign-out.
    async fn on_session_change(&self, callback: SessionCallback) -> Subscription;
}

// ============================================================================
// In-memory reference provider
// ============================================================================

pub struct MemoryIdentityProvider {
    inner: Arc<Mutex<ProviderInner>>,
}

#[derive(Default)]
struct ProviderInner {
    /// identifier -> credential record
    accounts: HashMap<String, ProviderAccount>,
    current: Option<Session>,
    watchers: Vec<SessionWatcher>,
    next_watcher_id: u64,
}

struct ProviderAccount {
    account_id: Uuid,
    secret: String,
    display_name: Option<String>,
}

struct SessionWatcher {
    id: u64,
    callback: SessionCallback,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProviderInner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_session(inner: &mut ProviderInner, session: Option<Session>) {
        inner.current = session;
        let current = inner.current.clone();
        for watcher in inner.watchers.iter_mut() {
            (watcher.callback)(current.clone());
        }
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedSession, ProviderError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ProviderError::WeakSecret);
        }
        let mut inner = self.lock();
        if inner.accounts.contains_key(identifier) {
            return Err(ProviderError::IdentifierTaken);
        }
        let account_id = Uuid::new_v4();
        inner.accounts.insert(
            identifier.to_string(),
            ProviderAccount {
                account_id,
                secret: secret.to_string(),
                display_name: None,
            },
        );
        let session = AuthenticatedSession {
            account_id,
            identifier: identifier.to_string(),
            display_name: None,
        };
        Self::set_session(&mut inner, Some(Session::Authenticated(session.clone())));
        Ok(session)
    }

    async fn sign_in(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedSession, ProviderError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get(identifier)
            .ok_or(ProviderError::AccountNotFound)?;
        if account.secret != secret {
            return Err(ProviderError::InvalidCredential);
        }
        let session = AuthenticatedSession {
            account_id: account.account_id,
            identifier: identifier.to_string(),
            display_name: account.display_name.clone(),
        };
        Self::set_session(&mut inner, Some(Session::Authenticated(session.clone())));
        Ok(session)
    }

    async fn sign_in_anonymously(&self) -> Result<GuestSession, ProviderError> {
        let mut inner = self.lock();
        let guest = GuestSession {
            account_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        Self::set_session(&mut inner, Some(Session::Guest(guest.clone())));
        Ok(guest)
    }

    async fn link_credential(
        &self,
        session: &GuestSession,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedSession, ProviderError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ProviderError::WeakSecret);
        }
        let mut inner = self.lock();
        if inner.accounts.contains_key(identifier) {
            return Err(ProviderError::IdentifierTaken);
        }
        inner.accounts.insert(
            identifier.to_string(),
            ProviderAccount {
                account_id: session.account_id,
                secret: secret.to_string(),
                display_name: None,
            },
        );
        let upgraded = AuthenticatedSession {
            account_id: session.account_id,
            identifier: identifier.to_string(),
            display_name: None,
        };
        Self::set_session(&mut inner, Some(Session::Authenticated(upgraded.clone())));
        Ok(upgraded)
    }

    async fn update_profile(
        &self,
        account_id: Uuid,
        display_name: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .values_mut()
            .find(|account| account.account_id == account_id)
            .ok_or(ProviderError::AccountNotFound)?;
        account.display_name = Some(display_name.to_string());
        // Refresh the ambient session without firing watchers; a profile
        // edit is not a session change.
        if let Some(Session::Authenticated(auth)) = inner.current.as_mut() {
            if auth.account_id == account_id {
                auth.display_name = Some(display_name.to_string());
            }
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut inner = self.lock();
        Self::set_session(&mut inner, None);
        Ok(())
    }

    async fn current_session(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    async fn on_session_change(&self, mut callback: SessionCallback) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_watcher_id;
            inner.next_watcher_id += 1;
            callback(inner.current.clone());
            inner.watchers.push(SessionWatcher { id, callback });
            id
        };
        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.watchers.retain(|watcher| watcher.id != id);
        })
    }
}
