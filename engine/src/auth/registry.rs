//! Username reservations over the `usernames` collection.
//!
//! One document per normalized username, keyed by the username itself, so
//! uniqueness rides on document-id uniqueness rather than on a query.

use std::sync::Arc;

use uuid::Uuid;

use shared::models::{now_ms, UsernameReservation};

use crate::error::{CoreError, CoreResult};
use crate::store::{collections, DocumentStore, TxDecision, TxOutcome};

/// Usernames shorter than this are rejected before any remote call
pub const MIN_USERNAME_LEN: usize = 3;

/// Canonical form used for reservation keys and identifier derivation
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub struct UsernameRegistry {
    store: Arc<dyn DocumentStore>,
}

impl UsernameRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Advisory availability check. Only [`reserve`](Self::reserve) is
    /// authoritative; a `true` here can still lose the race.
    pub async fn is_available(&self, username: &str) -> CoreResult<bool> {
        let key = validate_and_normalize(username)?;
        let doc = self
            .store
            .get(collections::USERNAMES, &key)
            .await
            .map_err(CoreError::store)?;
        Ok(doc.is_none())
    }

    /// Atomically claim a username for `owner_id`. Exactly one of any number
    /// of concurrent claims for the same name commits.
    pub async fn reserve(&self, username: &str, owner_id: Uuid) -> CoreResult<()> {
        let key = validate_and_normalize(username)?;
        let reservation = UsernameReservation {
            owner_id,
            created_at: now_ms(),
        };
        let doc = serde_json::to_value(&reservation)?;
        let outcome = self
            .store
            .transact(
                collections::USERNAMES,
                &key,
                Box::new(move |current| {
                    if current.is_some() {
                        TxDecision::Abort
                    } else {
                        TxDecision::Put(doc)
                    }
                }),
            )
            .await
            .map_err(CoreError::store)?;
        match outcome {
            TxOutcome::Committed => {
                tracing::info!("Reserved username '{}' for account {}", key, owner_id);
                Ok(())
            }
            TxOutcome::Aborted => Err(CoreError::UsernameTaken),
        }
    }

    /// Account currently holding a username, if any
    pub async fn owner_of(&self, username: &str) -> CoreResult<Option<Uuid>> {
        let key = validate_and_normalize(username)?;
        let doc = self
            .store
            .get(collections::USERNAMES, &key)
            .await
            .map_err(CoreError::store)?;
        match doc {
            Some(doc) => {
                let reservation: UsernameReservation = serde_json::from_value(doc)?;
                Ok(Some(reservation.owner_id))
            }
            None => Ok(None),
        }
    }
}

fn validate_and_normalize(username: &str) -> CoreResult<String> {
    let normalized = normalize_username(username);
    if normalized.chars().count() < MIN_USERNAME_LEN {
        return Err(CoreError::validation(
            "Pick a username with at least 3 characters.",
        ));
    }
    Ok(normalized)
}
