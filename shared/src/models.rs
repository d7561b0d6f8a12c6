use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority level for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Visibility filter applied to tasks before grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    /// Tasks not yet done
    #[default]
    Upcoming,
    /// Tasks already done
    Done,
    /// Everything
    All,
}

impl TaskFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFilter::Upcoming => "upcoming",
            TaskFilter::Done => "done",
            TaskFilter::All => "all",
        }
    }
}

/// Account profile stored in the `users` collection, keyed by account id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Normalized (trimmed, lowercased) username
    pub username: String,
    pub display_name: String,
    /// Synthetic identifier handed to the identity provider
    pub email: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Claim row in the `usernames` collection, keyed by normalized username
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameReservation {
    pub owner_id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Named, colored grouping bucket for tasks and lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Hex color like "#DB2777"
    pub color: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Checklist living inside a folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Task model. Folder and list references are independent of each other,
/// and neither is checked against live rows on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub priority: Priority,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub starts_at: DateTime<Utc>,
    pub done: bool,
    pub folder_id: Option<Uuid>,
    pub list_id: Option<Uuid>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Current instant at the store's millisecond resolution.
pub fn now_ms() -> DateTime<Utc> {
    truncate_to_ms(Utc::now())
}

/// Drop the sub-millisecond part of an instant. Timestamps are persisted as
/// epoch milliseconds, so anything finer would not survive a round trip.
pub fn truncate_to_ms(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant - Duration::nanoseconds(i64::from(instant.timestamp_subsec_nanos() % 1_000_000))
}
