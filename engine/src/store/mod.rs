//! Storage abstraction for the memoZ core.
//!
//! The engine talks to a hosted document database only through the
//! [`DocumentStore`] trait: JSON documents in named collections, with
//! point reads/writes, predicate queries, live snapshot subscriptions,
//! and a single-document transaction primitive. [`MemoryStore`] is the
//! in-process reference backend used by tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod memory;

pub use memory::MemoryStore;

/// A single JSON-object document
pub type Document = serde_json::Value;

/// Collection names used by the identity and task-graph layers
pub mod collections {
    pub const USERS: &str = "users";
    pub const USERNAMES: &str = "usernames";
    pub const FOLDERS: &str = "folders";
    pub const LISTS: &str = "lists";
    pub const TASKS: &str = "tasks";
}

/// Comparison operator for query predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ge,
    Le,
}

/// Field comparison applied by the store. `Ge`/`Le` compare numbers and
/// strings; fields of any other shape never match a range predicate.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub cmp: Cmp,
    pub value: Value,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            cmp: Cmp::Eq,
            value: value.into(),
        }
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            cmp: Cmp::Ge,
            value: value.into(),
        }
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            cmp: Cmp::Le,
            value: value.into(),
        }
    }
}

/// Sort order for query and subscription results
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Receives the full matching result set on every relevant change.
/// Callbacks must not call back into the store.
pub type SnapshotCallback = Box<dyn FnMut(Vec<Document>) + Send>;

/// Decision returned by a transaction closure
pub enum TxDecision {
    /// Write this document and commit
    Put(Document),
    /// Leave the document untouched
    Abort,
}

/// Result of a single-document transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    Aborted,
}

/// Cancels snapshot delivery when dropped or explicitly unsubscribed
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Get/put/query/subscribe/transact over named collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read; `Ok(None)` when the document does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or fully replace a document
    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Delete a document; deleting a missing document is not an error
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Return all documents matching every predicate, optionally ordered
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>>;

    /// Register a live query. The callback receives the full current result
    /// set immediately, then again after every mutation of the collection.
    async fn subscribe(
        &self,
        collection: &str,
        predicates: Vec<Predicate>,
        order: Option<OrderBy>,
        callback: SnapshotCallback,
    ) -> Result<Subscription>;

    /// Atomic read-decide-write on a single document. The closure sees the
    /// current document (if any) and either commits a replacement or aborts.
    /// The callback is higher-ranked so backends can hand it a borrow of
    /// their own locked state.
    async fn transact(
        &self,
        collection: &str,
        id: &str,
        decide: Box<dyn for<'a> FnOnce(Option<&'a Document>) -> TxDecision + Send>,
    ) -> Result<TxOutcome>;
}
