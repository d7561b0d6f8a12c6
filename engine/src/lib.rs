//! memoZ core engine: identity and task graph over a pluggable document store.
//!
//! This crate provides:
//! - the [`store::DocumentStore`] seam plus an in-memory reference backend
//! - username reservation and register/login/guest session flows ([`auth`])
//! - owner-scoped folder/list/task CRUD and live queries ([`tasks`])
//! - pure aggregation and a live, watchable view feed ([`views`])
//!
//! [`Engine`] wires the layers together around injected store and provider
//! handles; swapping either for a hosted backend changes no call sites.

pub mod auth;
pub mod config;
pub mod error;
pub mod store;
pub mod tasks;
pub mod views;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::{IdentityProvider, SessionManager, UsernameRegistry};
use crate::store::DocumentStore;
use crate::tasks::TaskGraphStore;
use crate::views::ViewFeed;
use shared::models::TaskFilter;

/// Top-level handle wiring sessions, registry, and task graphs together.
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    sessions: SessionManager,
    config: CoreConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
        config: CoreConfig,
    ) -> Self {
        let sessions = SessionManager::new(Arc::clone(&store), provider, config.clone());
        Self {
            store,
            sessions,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn registry(&self) -> &UsernameRegistry {
        self.sessions.registry()
    }

    /// Task-graph handle bound to one account
    pub fn graph(&self, owner: Uuid) -> TaskGraphStore {
        TaskGraphStore::new(Arc::clone(&self.store), owner, self.config.clone())
    }

    /// Start a live [`views::ViewState`] feed for one account
    pub async fn view_feed(&self, owner: Uuid, filter: TaskFilter) -> CoreResult<ViewFeed> {
        let graph = self.graph(owner);
        ViewFeed::start(&graph, filter).await
    }
}
