use thiserror::Error;
use uuid::Uuid;

/// Unified error type for identity and task-graph operations.
///
/// Display strings for user-facing variants are the exact messages shown by
/// the app, so callers can surface them directly.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input rejected locally, before any provider or store call
    #[error("{0}")]
    Validation(String),

    /// Username already claimed, or the claim was lost to a concurrent writer
    #[error("That username is already taken.")]
    UsernameTaken,

    /// The provider rejected the username/password pair
    #[error("Wrong password. Please try again.")]
    InvalidCredential,

    /// No identity account exists for the derived identifier
    #[error("No account found with that username.")]
    AccountNotFound,

    /// Entity lookup miss; an id owned by another account also lands here
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Identity provider unreachable or timed out
    #[error("Could not reach the sign-in service: {0}")]
    ProviderUnavailable(String),

    /// Document store unreachable or timed out
    #[error("Could not reach the data service: {0}")]
    StoreUnavailable(String),

    /// An identity account was created but a later registration step failed,
    /// leaving the account without a reservation or profile
    #[error("registration for account {account_id} stopped at {step}: {reason}")]
    PartialRegistration {
        account_id: Uuid,
        step: &'static str,
        reason: String,
    },

    /// A stored document did not match the expected shape
    #[error("invalid document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Wrap a raw store failure
    pub fn store(err: anyhow::Error) -> Self {
        CoreError::StoreUnavailable(err.to_string())
    }

    /// True for transient infrastructure failures worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ProviderUnavailable(_) | CoreError::StoreUnavailable(_)
        )
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|field| field.iter())
            .filter_map(|error| error.message.as_deref())
            .next()
            .unwrap_or("Invalid input.")
            .to_string();
        CoreError::Validation(message)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
