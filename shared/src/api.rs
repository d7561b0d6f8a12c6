use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::Priority;

// ============================================================================
// Auth Request Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30, message = "Pick a username with at least 3 characters."))]
    pub username: String,

    #[validate(length(min = 6, message = "Use at least 6 characters."))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Please enter a name."))]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, message = "Enter your username and password."))]
    pub username: String,

    #[validate(length(min = 1, message = "Enter your username and password."))]
    pub password: String,
}

// ============================================================================
// Task Request Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTask {
    #[validate(length(min = 1, max = 500, message = "Please enter a task."))]
    pub title: String,

    pub priority: Priority,
    pub starts_at: DateTime<Utc>,
    pub folder_id: Option<Uuid>,
    pub list_id: Option<Uuid>,
}

/// Partial update for a task; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TaskPatch {
    #[validate(length(min = 1, max = 500, message = "Please enter a task."))]
    pub title: Option<String>,

    pub priority: Option<Priority>,
    pub starts_at: Option<DateTime<Utc>>,
    pub done: Option<bool>,
    pub folder_id: Option<Uuid>,
    pub list_id: Option<Uuid>,
}
