//! In-process [`DocumentStore`] backend.
//!
//! One mutex guards collections and watchers together, so every operation
//! (including the transaction closure and watcher notification) runs
//! atomically with respect to every other. Snapshot delivery is therefore
//! ordered per watcher: a later-delivered snapshot never reflects an older
//! state of the collection.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{ensure, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{
    Cmp, Document, DocumentStore, OrderBy, Predicate, SnapshotCallback, Subscription, TxDecision,
    TxOutcome,
};

pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    watchers: HashMap<String, Vec<Watcher>>,
    next_watcher_id: u64,
}

struct Watcher {
    id: u64,
    predicates: Vec<Predicate>,
    order: Option<OrderBy>,
    callback: SnapshotCallback,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock still holds consistent data; recover it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-run every watcher on `collection` against the current contents.
    /// Callbacks run under the store lock and must not re-enter the store.
    fn notify(inner: &mut Inner, collection: &str) {
        let Inner {
            collections,
            watchers,
            ..
        } = inner;
        let Some(watching) = watchers.get_mut(collection) else {
            return;
        };
        let docs = collections.get(collection);
        for watcher in watching.iter_mut() {
            let snapshot = snapshot_for(docs, &watcher.predicates, watcher.order.as_ref());
            (watcher.callback)(snapshot);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let inner = self.lock();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        ensure!(doc.is_object(), "document must be a JSON object");
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Self::notify(&mut inner, collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        let removed = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_some() {
            Self::notify(&mut inner, collection);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>> {
        let inner = self.lock();
        Ok(snapshot_for(
            inner.collections.get(collection),
            predicates,
            order,
        ))
    }

    async fn subscribe(
        &self,
        collection: &str,
        predicates: Vec<Predicate>,
        order: Option<OrderBy>,
        callback: SnapshotCallback,
    ) -> Result<Subscription> {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_watcher_id;
            inner.next_watcher_id += 1;
            let mut watcher = Watcher {
                id,
                predicates,
                order,
                callback,
            };
            // Initial snapshot is delivered before the first change.
            let snapshot = snapshot_for(
                inner.collections.get(collection),
                &watcher.predicates,
                watcher.order.as_ref(),
            );
            (watcher.callback)(snapshot);
            inner
                .watchers
                .entry(collection.to_string())
                .or_default()
                .push(watcher);
            id
        };

        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        Ok(Subscription::new(move || {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(watching) = inner.watchers.get_mut(&collection) {
                watching.retain(|watcher| watcher.id != id);
            }
        }))
    }

    async fn transact(
        &self,
        collection: &str,
        id: &str,
        decide: Box<dyn for<'a> FnOnce(Option<&'a Document>) -> TxDecision + Send>,
    ) -> Result<TxOutcome> {
        let mut inner = self.lock();
        let current = inner.collections.get(collection).and_then(|docs| docs.get(id));
        match decide(current) {
            TxDecision::Put(doc) => {
                ensure!(doc.is_object(), "document must be a JSON object");
                inner
                    .collections
                    .entry(collection.to_string())
                    .or_default()
                    .insert(id.to_string(), doc);
                Self::notify(&mut inner, collection);
                Ok(TxOutcome::Committed)
            }
            TxDecision::Abort => Ok(TxOutcome::Aborted),
        }
    }
}

/// Filter and order a collection's documents. Iteration starts in id order,
/// and the sort is stable, so results are deterministic for equal keys.
fn snapshot_for(
    docs: Option<&BTreeMap<String, Document>>,
    predicates: &[Predicate],
    order: Option<&OrderBy>,
) -> Vec<Document> {
    let mut matched: Vec<Document> = docs
        .map(|docs| {
            docs.values()
                .filter(|doc| matches(doc, predicates))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if let Some(order) = order {
        matched.sort_by(|a, b| {
            let left = a.get(&order.field).unwrap_or(&Value::Null);
            let right = b.get(&order.field).unwrap_or(&Value::Null);
            let ordering = value_cmp(left, right).unwrap_or(Ordering::Equal);
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
    matched
}

/// A document missing the predicate field matches nothing, including `Eq`
/// against an explicit null.
fn matches(doc: &Document, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|predicate| {
        let Some(actual) = doc.get(&predicate.field) else {
            return false;
        };
        match predicate.cmp {
            Cmp::Eq => actual == &predicate.value,
            Cmp::Ge => {
                value_cmp(actual, &predicate.value).map_or(false, |o| o != Ordering::Less)
            }
            Cmp::Le => {
                value_cmp(actual, &predicate.value).map_or(false, |o| o != Ordering::Greater)
            }
        }
    })
}

fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(left), Value::Number(right)) => {
            let left = left.as_f64()?;
            let right = right.as_f64()?;
            left.partial_cmp(&right)
        }
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collected() -> (SnapshotCallback, Arc<Mutex<Vec<Vec<Document>>>>) {
        let snapshots: Arc<Mutex<Vec<Vec<Document>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        let callback = Box::new(move |docs: Vec<Document>| {
            sink.lock().unwrap().push(docs);
        });
        (callback, snapshots)
    }

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        store
            .put("tasks", "t1", json!({"title": "water plants"}))
            .await
            .unwrap();
        let doc = store.get("tasks", "t1").await.unwrap();
        assert_eq!(doc, Some(json!({"title": "water plants"})));

        store.delete("tasks", "t1").await.unwrap();
        assert_eq!(store.get("tasks", "t1").await.unwrap(), None);
        // Deleting again is a no-op, not an error.
        store.delete("tasks", "t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_rejects_non_object() {
        let store = MemoryStore::new();
        assert!(store.put("tasks", "t1", json!(42)).await.is_err());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = MemoryStore::new();
        store
            .put("tasks", "b", json!({"owner": "u1", "starts_at": 200}))
            .await
            .unwrap();
        store
            .put("tasks", "a", json!({"owner": "u1", "starts_at": 100}))
            .await
            .unwrap();
        store
            .put("tasks", "c", json!({"owner": "u2", "starts_at": 50}))
            .await
            .unwrap();

        let docs = store
            .query(
                "tasks",
                &[Predicate::eq("owner", "u1")],
                Some(&OrderBy::asc("starts_at")),
            )
            .await
            .unwrap();
        let starts: Vec<i64> = docs
            .iter()
            .map(|d| d["starts_at"].as_i64().unwrap())
            .collect();
        assert_eq!(starts, vec![100, 200]);

        let docs = store
            .query(
                "tasks",
                &[Predicate::eq("owner", "u1")],
                Some(&OrderBy::desc("starts_at")),
            )
            .await
            .unwrap();
        let starts: Vec<i64> = docs
            .iter()
            .map(|d| d["starts_at"].as_i64().unwrap())
            .collect();
        assert_eq!(starts, vec![200, 100]);
    }

    #[tokio::test]
    async fn test_query_range_predicates_are_inclusive() {
        let store = MemoryStore::new();
        for (id, at) in [("a", 10), ("b", 20), ("c", 30)] {
            store
                .put("tasks", id, json!({"starts_at": at}))
                .await
                .unwrap();
        }
        let docs = store
            .query(
                "tasks",
                &[
                    Predicate::ge("starts_at", 10),
                    Predicate::le("starts_at", 20),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_field_matches_no_predicate() {
        let store = MemoryStore::new();
        store.put("tasks", "t1", json!({"title": "x"})).await.unwrap();
        let docs = store
            .query("tasks", &[Predicate::eq("owner", Value::Null)], None)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_updates() {
        let store = MemoryStore::new();
        store
            .put("folders", "f1", json!({"owner": "u1", "name": "Medicine"}))
            .await
            .unwrap();

        let (callback, snapshots) = collected();
        let sub = store
            .subscribe("folders", vec![Predicate::eq("owner", "u1")], None, callback)
            .await
            .unwrap();

        store
            .put("folders", "f2", json!({"owner": "u1", "name": "Groceries"}))
            .await
            .unwrap();
        store
            .put("folders", "f3", json!({"owner": "u2", "name": "Other"}))
            .await
            .unwrap();

        let seen = snapshots.lock().unwrap();
        // Initial snapshot, then one per mutation; the foreign-owner write
        // still triggers recomputation but the result set is unchanged.
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].len(), 1);
        assert_eq!(seen[1].len(), 2);
        assert_eq!(seen[2].len(), 2);
        drop(seen);
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        let (callback, snapshots) = collected();
        let sub = store.subscribe("tasks", vec![], None, callback).await.unwrap();
        sub.unsubscribe();
        store.put("tasks", "t1", json!({"title": "x"})).await.unwrap();
        assert_eq!(snapshots.lock().unwrap().len(), 1); // initial only
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let store = MemoryStore::new();
        let (callback, snapshots) = collected();
        {
            let _sub = store.subscribe("tasks", vec![], None, callback).await.unwrap();
        }
        store.put("tasks", "t1", json!({"title": "x"})).await.unwrap();
        assert_eq!(snapshots.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transact_commit_and_abort() {
        let store = MemoryStore::new();
        let outcome = store
            .transact(
                "usernames",
                "alice",
                Box::new(|current| {
                    assert!(current.is_none());
                    TxDecision::Put(json!({"owner": "u1"}))
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Committed);

        let outcome = store
            .transact(
                "usernames",
                "alice",
                Box::new(|current| {
                    assert!(current.is_some());
                    TxDecision::Abort
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Aborted);
        assert_eq!(
            store.get("usernames", "alice").await.unwrap(),
            Some(json!({"owner": "u1"}))
        );
    }

    #[tokio::test]
    async fn test_transact_derives_replacement_from_current() {
        let store = MemoryStore::new();
        store.put("counters", "c1", json!({"count": 1})).await.unwrap();

        // The decision closure borrows the stored document directly.
        let outcome = store
            .transact(
                "counters",
                "c1",
                Box::new(|current| {
                    let count = current.and_then(|doc| doc["count"].as_i64()).unwrap_or(0);
                    TxDecision::Put(json!({ "count": count + 1 }))
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Committed);
        assert_eq!(
            store.get("counters", "c1").await.unwrap(),
            Some(json!({"count": 2}))
        );
    }

    #[tokio::test]
    async fn test_concurrent_transact_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .transact(
                        "usernames",
                        "alice",
                        Box::new(move |current| {
                            if current.is_some() {
                                TxDecision::Abort
                            } else {
                                TxDecision::Put(json!({ "owner": format!("u{n}") }))
                            }
                        }),
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut committed = 0;
        for handle in handles {
            if handle.await.unwrap() == TxOutcome::Committed {
                committed += 1;
            }
        }
        assert_eq!(committed, 1);
    }
}
