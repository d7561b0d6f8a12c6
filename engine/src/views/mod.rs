//! Derived views over task-graph snapshots: pure aggregation plus the
//! live feed that keeps a [`ViewState`] current as snapshots arrive.

pub mod aggregate;
pub mod live;

pub use aggregate::{folder_label, AGENDA_HOURS, UNSORTED_LABEL};
pub use live::{ViewFeed, ViewState};
