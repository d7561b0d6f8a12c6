//! Owner-scoped CRUD and live queries for folders, lists, and tasks.
//!
//! A [`TaskGraphStore`] is bound to one account id at construction; every
//! query carries the owner predicate and every point read re-checks the
//! owner, so documents belonging to another account behave as if they do
//! not exist. Cross-document invariants (a list's folder, a task's
//! references) are maintained here, not by the store: deleting a folder
//! removes its lists and moves affected tasks to Unsorted rather than
//! leaving dangling references. Every store call is bounded by the
//! configured call timeout, so a stalled backend surfaces a retryable
//! error instead of hanging the caller.

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use shared::api::{NewTask, TaskPatch};
use shared::models::{now_ms, truncate_to_ms, Folder, List, Task, TaskFilter};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::{collections, Document, DocumentStore, OrderBy, Predicate, Subscription};

/// Colors offered when creating a folder
pub const FOLDER_PALETTE: [&str; 6] = [
    "#DB2777", "#16A34A", "#2563EB", "#F59E0B", "#7C3AED", "#059669",
];

pub struct TaskGraphStore {
    store: Arc<dyn DocumentStore>,
    owner: Uuid,
    config: CoreConfig,
}

impl TaskGraphStore {
    pub fn new(store: Arc<dyn DocumentStore>, owner: Uuid, config: CoreConfig) -> Self {
        Self {
            store,
            owner,
            config,
        }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    // ========================================================================
    // Folders
    // ========================================================================

    pub async fn create_folder(&self, name: &str, color: &str) -> CoreResult<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("Please enter a name."));
        }
        let folder = Folder {
            id: Uuid::new_v4(),
            owner_id: self.owner,
            name: name.to_string(),
            color: color.to_string(),
            created_at: now_ms(),
        };
        self.put_doc(collections::FOLDERS, folder.id, &folder).await?;
        tracing::debug!("Created folder '{}' ({})", folder.name, folder.id);
        Ok(folder)
    }

    pub async fn folder(&self, id: Uuid) -> CoreResult<Folder> {
        self.fetch_owned(collections::FOLDERS, "folder", id, |folder: &Folder| {
            folder.owner_id
        })
        .await
    }

    pub async fn folders(&self) -> CoreResult<Vec<Folder>> {
        let docs = self
            .store_call(self.store.query(collections::FOLDERS, &[self.owner_pred()], None))
            .await?;
        decode_all(docs)
    }

    /// Delete a folder and its lists. Tasks referencing either are moved to
    /// Unsorted instead of being deleted.
    pub async fn delete_folder(&self, id: Uuid) -> CoreResult<()> {
        let folder = self.folder(id).await?;
        let lists = self.lists_in_folder(id).await?;
        for list in &lists {
            self.detach_tasks_from_list(list.id).await?;
            self.store_call(self.store.delete(collections::LISTS, &list.id.to_string()))
                .await?;
        }
        let detached = self.detach_tasks_from_folder(id).await?;
        self.store_call(self.store.delete(collections::FOLDERS, &id.to_string()))
            .await?;
        tracing::info!(
            "Deleted folder '{}' and {} lists; {} tasks moved to Unsorted",
            folder.name,
            lists.len(),
            detached
        );
        Ok(())
    }

    // ========================================================================
    // Lists
    // ========================================================================

    pub async fn create_list(&self, folder_id: Uuid, name: &str) -> CoreResult<List> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("Please enter a name."));
        }
        // Lists may not be created under a missing or foreign folder.
        self.folder(folder_id).await?;
        let list = List {
            id: Uuid::new_v4(),
            owner_id: self.owner,
            folder_id,
            name: name.to_string(),
            created_at: now_ms(),
        };
        self.put_doc(collections::LISTS, list.id, &list).await?;
        tracing::debug!("Created list '{}' in folder {}", list.name, folder_id);
        Ok(list)
    }

    pub async fn list(&self, id: Uuid) -> CoreResult<List> {
        self.fetch_owned(collections::LISTS, "list", id, |list: &List| list.owner_id)
            .await
    }

    pub async fn lists(&self) -> CoreResult<Vec<List>> {
        let docs = self
            .store_call(self.store.query(collections::LISTS, &[self.owner_pred()], None))
            .await?;
        decode_all(docs)
    }

    pub async fn lists_in_folder(&self, folder_id: Uuid) -> CoreResult<Vec<List>> {
        let predicates = [
            self.owner_pred(),
            Predicate::eq("folder_id", folder_id.to_string()),
        ];
        let docs = self
            .store_call(self.store.query(collections::LISTS, &predicates, None))
            .await?;
        decode_all(docs)
    }

    /// Delete a list; its tasks lose the list reference but survive.
    pub async fn delete_list(&self, id: Uuid) -> CoreResult<()> {
        let list = self.list(id).await?;
        let detached = self.detach_tasks_from_list(id).await?;
        self.store_call(self.store.delete(collections::LISTS, &id.to_string()))
            .await?;
        tracing::info!("Deleted list '{}'; {} tasks detached", list.name, detached);
        Ok(())
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub async fn create_task(&self, new: &NewTask) -> CoreResult<Task> {
        new.validate()?;
        let title = new.title.trim();
        if title.is_empty() {
            return Err(CoreError::validation("Please enter a task."));
        }
        let now = now_ms();
        let task = Task {
            id: Uuid::new_v4(),
            owner_id: self.owner,
            title: title.to_string(),
            priority: new.priority,
            starts_at: truncate_to_ms(new.starts_at),
            done: false,
            folder_id: new.folder_id,
            list_id: new.list_id,
            created_at: now,
            updated_at: now,
        };
        self.put_doc(collections::TASKS, task.id, &task).await?;
        tracing::debug!(
            "Created task '{}' ({}, {} priority)",
            task.title,
            task.id,
            task.priority.as_str()
        );
        Ok(task)
    }

    pub async fn task(&self, id: Uuid) -> CoreResult<Task> {
        self.fetch_owned(collections::TASKS, "task", id, |task: &Task| task.owner_id)
            .await
    }

    /// All tasks for this owner, ordered by start time ascending
    pub async fn tasks(&self) -> CoreResult<Vec<Task>> {
        let docs = self
            .store_call(self.store.query(
                collections::TASKS,
                &[self.owner_pred()],
                Some(&OrderBy::asc("starts_at")),
            ))
            .await?;
        decode_all(docs)
    }

    pub async fn tasks_in_list(&self, list_id: Uuid) -> CoreResult<Vec<Task>> {
        let predicates = [
            self.owner_pred(),
            Predicate::eq("list_id", list_id.to_string()),
        ];
        let docs = self
            .store_call(self.store.query(
                collections::TASKS,
                &predicates,
                Some(&OrderBy::asc("starts_at")),
            ))
            .await?;
        decode_all(docs)
    }

    pub async fn tasks_in_folder(&self, folder_id: Uuid) -> CoreResult<Vec<Task>> {
        let predicates = [
            self.owner_pred(),
            Predicate::eq("folder_id", folder_id.to_string()),
        ];
        let docs = self
            .store_call(self.store.query(
                collections::TASKS,
                &predicates,
                Some(&OrderBy::asc("starts_at")),
            ))
            .await?;
        decode_all(docs)
    }

    /// Tasks whose start time falls inside the given UTC civil day,
    /// both endpoints inclusive, ordered by start time.
    pub async fn tasks_for_day(&self, day: NaiveDate) -> CoreResult<Vec<Task>> {
        let start = day.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1) - Duration::milliseconds(1);
        let predicates = [
            self.owner_pred(),
            Predicate::ge("starts_at", start.timestamp_millis()),
            Predicate::le("starts_at", end.timestamp_millis()),
        ];
        let docs = self
            .store_call(self.store.query(
                collections::TASKS,
                &predicates,
                Some(&OrderBy::asc("starts_at")),
            ))
            .await?;
        decode_all(docs)
    }

    /// Apply a partial update. `updated_at` is bumped on every call.
    pub async fn update_task(&self, id: Uuid, patch: &TaskPatch) -> CoreResult<Task> {
        patch.validate()?;
        let mut task = self.task(id).await?;
        if let Some(title) = &patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(CoreError::validation("Please enter a task."));
            }
            task.title = title.to_string();
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(starts_at) = patch.starts_at {
            task.starts_at = truncate_to_ms(starts_at);
        }
        if let Some(done) = patch.done {
            task.done = done;
        }
        if let Some(folder_id) = patch.folder_id {
            task.folder_id = Some(folder_id);
        }
        if let Some(list_id) = patch.list_id {
            task.list_id = Some(list_id);
        }
        task.updated_at = now_ms();
        self.put_doc(collections::TASKS, id, &task).await?;
        Ok(task)
    }

    pub async fn toggle_done(&self, id: Uuid) -> CoreResult<Task> {
        let mut task = self.task(id).await?;
        task.done = !task.done;
        task.updated_at = now_ms();
        self.put_doc(collections::TASKS, id, &task).await?;
        tracing::debug!(
            "Task {} marked {}",
            id,
            if task.done { "done" } else { "not done" }
        );
        Ok(task)
    }

    pub async fn delete_task(&self, id: Uuid) -> CoreResult<()> {
        // Owner check before the blind delete.
        self.task(id).await?;
        self.store_call(self.store.delete(collections::TASKS, &id.to_string()))
            .await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn subscribe_folders(
        &self,
        on_change: impl FnMut(Vec<Folder>) + Send + 'static,
    ) -> CoreResult<Subscription> {
        self.subscribe_decoded(collections::FOLDERS, vec![self.owner_pred()], None, on_change)
            .await
    }

    pub async fn subscribe_lists(
        &self,
        on_change: impl FnMut(Vec<List>) + Send + 'static,
    ) -> CoreResult<Subscription> {
        self.subscribe_decoded(collections::LISTS, vec![self.owner_pred()], None, on_change)
            .await
    }

    /// Live tasks matching `filter`, ordered by start time. Every delivery
    /// replaces the previous snapshot wholesale.
    pub async fn subscribe_tasks(
        &self,
        filter: TaskFilter,
        on_change: impl FnMut(Vec<Task>) + Send + 'static,
    ) -> CoreResult<Subscription> {
        let mut predicates = vec![self.owner_pred()];
        match filter {
            TaskFilter::Upcoming => predicates.push(Predicate::eq("done", false)),
            TaskFilter::Done => predicates.push(Predicate::eq("done", true)),
            TaskFilter::All => {}
        }
        self.subscribe_decoded(
            collections::TASKS,
            predicates,
            Some(OrderBy::asc("starts_at")),
            on_change,
        )
        .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn owner_pred(&self) -> Predicate {
        Predicate::eq("owner_id", self.owner.to_string())
    }

    async fn fetch_owned<T: DeserializeOwned>(
        &self,
        collection: &str,
        kind: &'static str,
        id: Uuid,
        owner_of: impl Fn(&T) -> Uuid,
    ) -> CoreResult<T> {
        let doc = self
            .store_call(self.store.get(collection, &id.to_string()))
            .await?
            .ok_or_else(|| CoreError::not_found(kind, id))?;
        let value: T = serde_json::from_value(doc)?;
        if owner_of(&value) != self.owner {
            // Foreign documents are indistinguishable from missing ones.
            return Err(CoreError::not_found(kind, id));
        }
        Ok(value)
    }

    async fn put_doc<T: Serialize>(&self, collection: &str, id: Uuid, value: &T) -> CoreResult<()> {
        let doc = serde_json::to_value(value)?;
        self.store_call(self.store.put(collection, &id.to_string(), doc))
            .await
    }

    async fn detach_tasks_from_folder(&self, folder_id: Uuid) -> CoreResult<usize> {
        let tasks = self.tasks_in_folder(folder_id).await?;
        let count = tasks.len();
        for mut task in tasks {
            task.folder_id = None;
            task.updated_at = now_ms();
            self.put_doc(collections::TASKS, task.id, &task).await?;
        }
        Ok(count)
    }

    async fn detach_tasks_from_list(&self, list_id: Uuid) -> CoreResult<usize> {
        let tasks = self.tasks_in_list(list_id).await?;
        let count = tasks.len();
        for mut task in tasks {
            task.list_id = None;
            task.updated_at = now_ms();
            self.put_doc(collections::TASKS, task.id, &task).await?;
        }
        Ok(count)
    }

    async fn subscribe_decoded<T: DeserializeOwned + 'static>(
        &self,
        collection: &'static str,
        predicates: Vec<Predicate>,
        order: Option<OrderBy>,
        mut on_change: impl FnMut(Vec<T>) + Send + 'static,
    ) -> CoreResult<Subscription> {
        let callback = Box::new(move |docs: Vec<Document>| match decode_all::<T>(docs) {
            Ok(values) => on_change(values),
            Err(err) => {
                tracing::warn!("Dropping undecodable {} snapshot: {}", collection, err);
            }
        });
        self.store_call(self.store.subscribe(collection, predicates, order, callback))
            .await
    }

    fn timeout_message(&self) -> String {
        format!("timed out after {}s", self.config.call_timeout_secs)
    }

    /// Bound a raw store call and map its error
    async fn store_call<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>> + Send,
    ) -> CoreResult<T> {
        match tokio::time::timeout(self.config.call_timeout(), fut).await {
            Ok(result) => result.map_err(CoreError::store),
            Err(_) => Err(CoreError::StoreUnavailable(self.timeout_message())),
        }
    }
}

fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> CoreResult<Vec<T>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(CoreError::from))
        .collect()
}
