//! Session flows: registration, login, guest continuation, sign-out.
//!
//! Usernames are app-level; the identity provider only ever sees the
//! synthetic identifier `<username>@<domain>`. Registration is ordered so
//! the reservation is taken before the profile and user record are written,
//! and every failure after account creation is reported with the account id
//! so operators can find orphaned identities.

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use shared::api::{Credentials, RegisterRequest};
use shared::models::{now_ms, Account, Folder};

use crate::auth::provider::{IdentityProvider, ProviderError, Session, SessionCallback};
use crate::auth::registry::{normalize_username, UsernameRegistry, MIN_USERNAME_LEN};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::{collections, DocumentStore, Subscription};
use crate::tasks::FOLDER_PALETTE;

/// Folders seeded for every new guest account
pub const STARTER_FOLDERS: [(&str, &str); 3] = [
    ("Medicine", FOLDER_PALETTE[0]),
    ("Groceries", FOLDER_PALETTE[1]),
    ("To-Do", FOLDER_PALETTE[2]),
];

pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn IdentityProvider>,
    registry: UsernameRegistry,
    config: CoreConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
        config: CoreConfig,
    ) -> Self {
        let registry = UsernameRegistry::new(Arc::clone(&store));
        Self {
            store,
            provider,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &UsernameRegistry {
        &self.registry
    }

    /// Create a credentialed account for a new username.
    ///
    /// Order matters: validate locally, claim the username, then write the
    /// profile and user record. A guest session is upgraded in place so the
    /// guest's documents keep their owner.
    pub async fn register(&self, req: &RegisterRequest) -> CoreResult<Account> {
        req.validate()?;
        let username = normalize_username(&req.username);
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(CoreError::validation(
                "Pick a username with at least 3 characters.",
            ));
        }

        // Advisory pre-check; the reservation below is the real gate.
        if !self.store_call(self.registry.is_available(&username)).await? {
            return Err(CoreError::UsernameTaken);
        }

        let identifier = self.identifier_for(&username);
        let session = match self.current_session().await? {
            Some(Session::Guest(guest)) => {
                tracing::info!(
                    "Upgrading guest {} to username '{}'",
                    guest.account_id,
                    username
                );
                self.provider_call(self.provider.link_credential(
                    &guest,
                    &identifier,
                    &req.password,
                ))
                .await?
            }
            _ => {
                self.provider_call(self.provider.create_account(&identifier, &req.password))
                    .await?
            }
        };
        let account_id = session.account_id;

        match self
            .store_call(self.registry.reserve(&username, account_id))
            .await
        {
            Ok(()) => {}
            Err(CoreError::UsernameTaken) => {
                tracing::error!(
                    "Account {} lost the reservation race for '{}'; identity account is orphaned",
                    account_id,
                    username
                );
                return Err(CoreError::UsernameTaken);
            }
            Err(err) => {
                tracing::error!(
                    "Registration for account {} failed reserving '{}': {}",
                    account_id,
                    username,
                    err
                );
                return Err(CoreError::PartialRegistration {
                    account_id,
                    step: "reservation",
                    reason: err.to_string(),
                });
            }
        }

        if let Err(err) = self
            .provider_call(self.provider.update_profile(account_id, &req.display_name))
            .await
        {
            tracing::error!(
                "Registration for account {} failed setting the profile: {}",
                account_id,
                err
            );
            return Err(CoreError::PartialRegistration {
                account_id,
                step: "profile",
                reason: err.to_string(),
            });
        }

        let account = Account {
            id: account_id,
            username: username.clone(),
            display_name: req.display_name.clone(),
            email: identifier,
            created_at: now_ms(),
        };
        if let Err(err) = self.put_account(&account).await {
            tracing::error!(
                "Registration for account {} failed writing the user record: {}",
                account_id,
                err
            );
            return Err(CoreError::PartialRegistration {
                account_id,
                step: "user_record",
                reason: err.to_string(),
            });
        }

        tracing::info!("Registered '{}' as account {}", username, account_id);
        Ok(account)
    }

    /// Exchange username/password for the stored account profile.
    pub async fn login(&self, credentials: &Credentials) -> CoreResult<Account> {
        credentials.validate()?;
        let username = normalize_username(&credentials.username);
        let identifier = self.identifier_for(&username);
        let session = self
            .provider_call(self.provider.sign_in(&identifier, &credentials.password))
            .await?;
        let account_id = session.account_id;

        let doc = self
            .store_call(async {
                self.store
                    .get(collections::USERS, &account_id.to_string())
                    .await
                    .map_err(CoreError::store)
            })
            .await?;

        let account = match doc {
            Some(doc) => serde_json::from_value(doc)?,
            None => {
                // Residue of an interrupted registration; keep the login
                // usable instead of locking the account out.
                tracing::warn!(
                    "No user record for account {}; synthesizing one from the session",
                    account_id
                );
                Account {
                    id: account_id,
                    display_name: session
                        .display_name
                        .clone()
                        .unwrap_or_else(|| username.clone()),
                    username,
                    email: identifier,
                    created_at: now_ms(),
                }
            }
        };
        tracing::info!("Signed in account {}", account.id);
        Ok(account)
    }

    /// Reuse the ambient session, or start a fresh guest one.
    pub async fn continue_as_guest(&self) -> CoreResult<Session> {
        if let Some(session) = self.current_session().await? {
            tracing::debug!("Reusing existing session for account {}", session.account_id());
            return Ok(session);
        }
        let guest = self
            .provider_call(self.provider.sign_in_anonymously())
            .await?;
        tracing::info!("Started guest session {}", guest.account_id);
        if self.config.seed_starter_folders {
            if let Err(err) = self.seed_starter_folders(guest.account_id).await {
                // The session itself is fine without starters.
                tracing::warn!(
                    "Could not seed starter folders for {}: {}",
                    guest.account_id,
                    err
                );
            }
        }
        Ok(Session::Guest(guest))
    }

    pub async fn sign_out(&self) -> CoreResult<()> {
        self.provider_call(self.provider.sign_out()).await?;
        tracing::info!("Signed out");
        Ok(())
    }

    pub async fn current_session(&self) -> CoreResult<Option<Session>> {
        match tokio::time::timeout(self.config.call_timeout(), self.provider.current_session())
            .await
        {
            Ok(session) => Ok(session),
            Err(_) => Err(CoreError::ProviderUnavailable(self.timeout_message())),
        }
    }

    pub async fn on_session_change(&self, callback: SessionCallback) -> Subscription {
        self.provider.on_session_change(callback).await
    }

    /// Seed the starter folders. Ids are deterministic per account, so a
    /// repeated or interrupted seeding never duplicates a folder.
    async fn seed_starter_folders(&self, owner_id: Uuid) -> CoreResult<()> {
        for (name, color) in STARTER_FOLDERS {
            let id = starter_folder_id(owner_id, name);
            let key = id.to_string();
            let existing = self
                .store_call(async {
                    self.store
                        .get(collections::FOLDERS, &key)
                        .await
                        .map_err(CoreError::store)
                })
                .await?;
            if existing.is_some() {
                continue;
            }
            let folder = Folder {
                id,
                owner_id,
                name: name.to_string(),
                color: color.to_string(),
                created_at: now_ms(),
            };
            let doc = serde_json::to_value(&folder)?;
            self.store_call(async {
                self.store
                    .put(collections::FOLDERS, &key, doc)
                    .await
                    .map_err(CoreError::store)
            })
            .await?;
        }
        tracing::info!(
            "Seeded {} starter folders for account {}",
            STARTER_FOLDERS.len(),
            owner_id
        );
        Ok(())
    }

    async fn put_account(&self, account: &Account) -> CoreResult<()> {
        let doc = serde_json::to_value(account)?;
        self.store_call(async {
            self.store
                .put(collections::USERS, &account.id.to_string(), doc)
                .await
                .map_err(CoreError::store)
        })
        .await
    }

    fn identifier_for(&self, username: &str) -> String {
        format!("{}@{}", username, self.config.username_domain)
    }

    fn timeout_message(&self) -> String {
        format!("timed out after {}s", self.config.call_timeout_secs)
    }

    /// Bound a provider call and map its error
    async fn provider_call<T>(
        &self,
        fut: impl Future<Output = Result<T, ProviderError>> + Send,
    ) -> CoreResult<T> {
        match tokio::time::timeout(self.config.call_timeout(), fut).await {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => Err(CoreError::ProviderUnavailable(self.timeout_message())),
        }
    }

    /// Bound a store or registry call
    async fn store_call<T>(
        &self,
        fut: impl Future<Output = CoreResult<T>> + Send,
    ) -> CoreResult<T> {
        match tokio::time::timeout(self.config.call_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::StoreUnavailable(self.timeout_message())),
        }
    }
}

fn starter_folder_id(owner_id: Uuid, name: &str) -> Uuid {
    Uuid::new_v5(&owner_id, format!("starter-folder:{name}").as_bytes())
}
