//! Live derived views.
//!
//! A [`ViewFeed`] holds exactly one subscription per collection for one
//! owner and folds every incoming snapshot into a fresh [`ViewState`],
//! published through a `tokio::sync::watch` channel. Derivations always
//! recompute from the latest full snapshots; nothing is patched in place.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use uuid::Uuid;

use shared::models::{Folder, List, Task, TaskFilter};

use crate::error::CoreResult;
use crate::store::Subscription;
use crate::tasks::TaskGraphStore;
use crate::views::aggregate;

/// Snapshot-derived bundle for rendering
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub folders: Vec<Folder>,
    pub lists: Vec<List>,
    /// Every task for the owner, ordered by start time
    pub tasks: Vec<Task>,
    /// Lists per folder
    pub list_counts: HashMap<Uuid, usize>,
    /// Completion percentage per list; `None` keys tasks outside any list
    pub progress: HashMap<Option<Uuid>, f64>,
    /// Filtered tasks grouped by folder; `None` is the Unsorted group
    pub groups: BTreeMap<Option<Uuid>, Vec<Task>>,
}

#[derive(Default)]
struct RawSnapshots {
    folders: Vec<Folder>,
    lists: Vec<List>,
    tasks: Vec<Task>,
}

/// Folds folder, list, and task snapshots into a watchable [`ViewState`].
pub struct ViewFeed {
    state: watch::Receiver<ViewState>,
    subscriptions: Vec<Subscription>,
}

impl ViewFeed {
    /// Subscribe to the owner's three collections and keep the derived
    /// state current. `filter` shapes `groups` only; `progress` always
    /// sees every task, done or not.
    pub async fn start(graph: &TaskGraphStore, filter: TaskFilter) -> CoreResult<Self> {
        let (tx, rx) = watch::channel(ViewState::default());
        let tx = Arc::new(tx);
        let raw = Arc::new(Mutex::new(RawSnapshots::default()));

        let folders_sub = {
            let raw = Arc::clone(&raw);
            let tx = Arc::clone(&tx);
            graph
                .subscribe_folders(move |folders| {
                    let mut raw = raw.lock().unwrap_or_else(|e| e.into_inner());
                    raw.folders = folders;
                    let _ = tx.send(recompute(&raw, filter));
                })
                .await?
        };

        let lists_sub = {
            let raw = Arc::clone(&raw);
            let tx = Arc::clone(&tx);
            graph
                .subscribe_lists(move |lists| {
                    let mut raw = raw.lock().unwrap_or_else(|e| e.into_inner());
                    raw.lists = lists;
                    let _ = tx.send(recompute(&raw, filter));
                })
                .await?
        };

        let tasks_sub = {
            let raw = Arc::clone(&raw);
            let tx = Arc::clone(&tx);
            // Subscribe unfiltered; the group filter is applied on recompute.
            graph
                .subscribe_tasks(TaskFilter::All, move |tasks| {
                    let mut raw = raw.lock().unwrap_or_else(|e| e.into_inner());
                    raw.tasks = tasks;
                    let _ = tx.send(recompute(&raw, filter));
                })
                .await?
        };

        tracing::debug!(
            "View feed started for account {} ({} filter)",
            graph.owner(),
            filter.as_str()
        );
        Ok(Self {
            state: rx,
            subscriptions: vec![folders_sub, lists_sub, tasks_sub],
        })
    }

    /// Latest derived state
    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Watch endpoint for push-style consumers
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Cancel the underlying subscriptions. Dropping the feed does the same.
    pub fn stop(self) {
        drop(self.subscriptions);
    }
}

fn recompute(raw: &RawSnapshots, filter: TaskFilter) -> ViewState {
    ViewState {
        folders: raw.folders.clone(),
        lists: raw.lists.clone(),
        tasks: raw.tasks.clone(),
        list_counts: aggregate::list_counts_by_folder(&raw.lists),
        progress: aggregate::progress_by_list(&raw.tasks),
        groups: aggregate::group_tasks_by_folder(&raw.tasks, filter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::store::{DocumentStore, MemoryStore};
    use crate::tasks::FOLDER_PALETTE;
    use chrono::Utc;
    use shared::api::NewTask;
    use shared::models::Priority;

    fn graph() -> TaskGraphStore {
        let store = Arc::new(MemoryStore::new());
        TaskGraphStore::new(
            store as Arc<dyn DocumentStore>,
            Uuid::new_v4(),
            CoreConfig::default(),
        )
    }

    fn new_task(folder_id: Option<Uuid>, list_id: Option<Uuid>) -> NewTask {
        NewTask {
            title: "water plants".to_string(),
            priority: Priority::Low,
            starts_at: Utc::now(),
            folder_id,
            list_id,
        }
    }

    #[tokio::test]
    async fn test_feed_reflects_preexisting_data() {
        let graph = graph();
        let folder = graph.create_folder("Chores", FOLDER_PALETTE[0]).await.unwrap();
        let list = graph.create_list(folder.id, "Weekly").await.unwrap();
        let task = graph
            .create_task(&new_task(Some(folder.id), Some(list.id)))
            .await
            .unwrap();
        graph.create_task(&new_task(Some(folder.id), Some(list.id))).await.unwrap();
        graph.toggle_done(task.id).await.unwrap();

        let feed = ViewFeed::start(&graph, TaskFilter::All).await.unwrap();
        let state = feed.state();
        assert_eq!(state.folders.len(), 1);
        assert_eq!(state.lists.len(), 1);
        assert_eq!(state.tasks.len(), 2);
        assert_eq!(state.list_counts[&folder.id], 1);
        assert_eq!(state.progress[&Some(list.id)], 50.0);
        assert_eq!(state.groups[&Some(folder.id)].len(), 2);
    }

    #[tokio::test]
    async fn test_feed_recomputes_on_every_change() {
        let graph = graph();
        let feed = ViewFeed::start(&graph, TaskFilter::Upcoming).await.unwrap();
        assert!(feed.state().tasks.is_empty());

        let mut rx = feed.watch();
        rx.borrow_and_update();

        let task = graph.create_task(&new_task(None, None)).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let state = feed.state();
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.groups[&None].len(), 1);

        // Completing the task removes it from the filtered groups but it
        // still counts toward progress.
        graph.toggle_done(task.id).await.unwrap();
        let state = feed.state();
        assert_eq!(state.tasks.len(), 1);
        assert!(!state.groups.contains_key(&None));
        assert_eq!(state.progress[&None], 100.0);
    }

    #[tokio::test]
    async fn test_feed_tolerates_dangling_folder_reference() {
        let graph = graph();
        let feed = ViewFeed::start(&graph, TaskFilter::All).await.unwrap();

        let ghost = Uuid::new_v4();
        graph.create_task(&new_task(Some(ghost), None)).await.unwrap();

        let state = feed.state();
        assert!(state.folders.is_empty());
        // The group still renders, keyed by the unknown folder id.
        assert_eq!(state.groups[&Some(ghost)].len(), 1);
    }

    #[tokio::test]
    async fn test_stop_freezes_the_state() {
        let graph = graph();
        let feed = ViewFeed::start(&graph, TaskFilter::All).await.unwrap();
        graph.create_task(&new_task(None, None)).await.unwrap();

        let rx = feed.watch();
        assert_eq!(rx.borrow().tasks.len(), 1);
        feed.stop();

        graph.create_task(&new_task(None, None)).await.unwrap();
        assert_eq!(rx.borrow().tasks.len(), 1); // no further deliveries
    }
}
