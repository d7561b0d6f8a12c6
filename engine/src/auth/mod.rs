//! Identity layer: provider seam, username registry, and session flows.
//!
//! This module provides:
//! - the [`IdentityProvider`] trait and its in-memory reference backend
//! - username normalization and transactional reservation
//! - the [`SessionManager`] driving register/login/guest flows

pub mod provider;
pub mod registry;
pub mod session;

pub use provider::{
    AuthenticatedSession, GuestSession, IdentityProvider, MemoryIdentityProvider, ProviderError,
    Session, SessionCallback,
};
pub use registry::{normalize_username, UsernameRegistry, MIN_USERNAME_LEN};
pub use session::{SessionManager, STARTER_FOLDERS};
