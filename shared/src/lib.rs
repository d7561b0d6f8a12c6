//! Shared domain model and request types for the memoZ core.
//!
//! Everything here is plain data: serde-serializable structs and enums used
//! by the engine crate and by any frontend that talks to it. Timestamps
//! serialize as epoch milliseconds so stored documents order numerically.

pub mod api;
pub mod models;

pub use api::{Credentials, NewTask, RegisterRequest, TaskPatch};
pub use models::{
    now_ms, truncate_to_ms, Account, Folder, List, Priority, Task, TaskFilter,
    UsernameReservation,
};
