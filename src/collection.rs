//! ==============================================================================
//! collection.rs - ordered record stores with upsert-by-id
//! ==============================================================================
//!
//! purpose:
//!     holds the records of one entity type in insertion order and keeps
//!     their identities unique. every mutation reports a `Change` so the app
//!     controller can keep its per-record controllers in step.
//!
//! relationships:
//!     - uses: model.rs (Record trait, patches)
//!     - used by: app.rs (one store per entity), controller.rs (optimistic writes)
//!
//! ==============================================================================

use serde::Serialize;

use crate::error::{DashboardError, Result};
use crate::model::{Notification, Patch, Record};

/// what a mutation did to a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<K> {
    Added(K),
    Updated(K),
    Removed(K),
}

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Collection<R: Record> {
    items: Vec<R>,
}

impl<R: Record> Default for Collection<R> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<R: Record> Collection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &R::Key) -> Option<usize> {
        self.items.iter().position(|r| &r.key() == key)
    }

    /// merge into the matching record, or append a new one
    pub fn upsert(&mut self, patch: &Patch) -> Result<Change<R::Key>> {
        let key = R::patch_key(patch)?;
        match self.position(&key) {
            Some(i) => {
                self.items[i].merge(patch)?;
                Ok(Change::Updated(key))
            }
            None => {
                self.items.push(R::from_patch(patch)?);
                Ok(Change::Added(key))
            }
        }
    }

    /// append while loading a snapshot; a duplicate key is merged instead
    pub fn push(&mut self, patch: &Patch) -> Result<Change<R::Key>> {
        self.upsert(patch)
    }

    /// update an existing record only
    pub fn set(&mut self, patch: &Patch) -> Result<Change<R::Key>> {
        let key = R::patch_key(patch)?;
        let i = self.position(&key).ok_or_else(|| DashboardError::UnknownRecord {
            kind: R::KIND,
            key: key.to_string(),
        })?;
        self.items[i].merge(patch)?;
        Ok(Change::Updated(key))
    }

    pub fn remove(&mut self, key: &R::Key) -> Option<R> {
        self.position(key).map(|i| self.items.remove(i))
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.items.iter().find(|r| &r.key() == key)
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.position(key).is_some()
    }

    /// records in insertion order
    pub fn all(&self) -> &[R] {
        &self.items
    }

    pub fn keys(&self) -> Vec<R::Key> {
        self.items.iter().map(|r| r.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&R, &R) -> std::cmp::Ordering,
    {
        self.items.sort_by(compare);
    }

    pub(crate) fn truncate_front(&mut self, max_length: usize) -> Vec<R> {
        let excess = self.items.len().saturating_sub(max_length);
        self.items.drain(..excess).collect()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, R> {
        self.items.iter_mut()
    }
}

// ==============================================================================
// notifications - bounded, ordered by creation time
// ==============================================================================

pub const DEFAULT_NOTIFICATION_LIMIT: usize = 6;

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct NotificationCollection {
    inner: Collection<Notification>,
    #[serde(skip)]
    max_length: usize,
}

impl Default for NotificationCollection {
    fn default() -> Self {
        Self::with_limit(DEFAULT_NOTIFICATION_LIMIT)
    }
}

impl NotificationCollection {
    pub fn with_limit(max_length: usize) -> Self {
        Self {
            inner: Collection::new(),
            max_length: max_length.max(1),
        }
    }

    /// insert or update, then re-sort, re-flag the newest and trim the oldest
    ///
    /// returns every change the push caused, including evictions.
    pub fn push(&mut self, patch: &Patch) -> Result<Vec<Change<i64>>> {
        let mut changes = vec![self.inner.upsert(patch)?];

        self.inner.sort_by(|a, b| a.created_ts.cmp(&b.created_ts));

        let newest = self.inner.all().last().map(|n| n.id);
        for n in self.inner.iter_mut() {
            n.is_first = Some(n.id) == newest;
        }

        for evicted in self.inner.truncate_front(self.max_length) {
            tracing::debug!("[NOTIFY] dropping notification {} from the list", evicted.id);
            changes.push(Change::Removed(evicted.id));
        }
        Ok(changes)
    }

    /// alias of `push`; the bounded list has a single insertion path
    pub fn upsert(&mut self, patch: &Patch) -> Result<Vec<Change<i64>>> {
        self.push(patch)
    }

    /// oldest first
    pub fn all(&self) -> &[Notification] {
        self.inner.all()
    }

    /// newest first, the order the list is shown in
    pub fn recent(&self) -> Vec<&Notification> {
        self.inner.all().iter().rev().collect()
    }

    pub fn get(&self, id: &i64) -> Option<&Notification> {
        self.inner.get(id)
    }

    pub fn contains(&self, id: &i64) -> bool {
        self.inner.contains(id)
    }

    pub fn keys(&self) -> Vec<i64> {
        self.inner.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{to_patch, Relay, RelayState, Sensor};
    use serde_json::{json, Value};

    fn p(v: Value) -> Patch {
        to_patch("test", v).unwrap()
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let mut c: Collection<Relay> = Collection::new();
        assert_eq!(c.upsert(&p(json!({"id": 1, "state": 0}))).unwrap(), Change::Added(1));
        assert_eq!(c.upsert(&p(json!({"id": 1, "state": 2}))).unwrap(), Change::Updated(1));
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(&1).unwrap().state, RelayState::On);
    }

    #[test]
    fn keeps_insertion_order() {
        let mut c: Collection<Sensor> = Collection::new();
        for code in ["ZGT", "SPT", "ZGH"] {
            c.push(&p(json!({"sensor_code": code}))).unwrap();
        }
        c.upsert(&p(json!({"sensor_code": "SPT", "value": 3.0}))).unwrap();
        assert_eq!(c.keys(), vec!["ZGT", "SPT", "ZGH"]);
    }

    #[test]
    fn set_requires_existing_record() {
        let mut c: Collection<Relay> = Collection::new();
        let err = c.set(&p(json!({"id": 9, "editing": true}))).unwrap_err();
        assert!(matches!(err, DashboardError::UnknownRecord { .. }));
    }

    #[test]
    fn remove_returns_record() {
        let mut c: Collection<Relay> = Collection::new();
        c.push(&p(json!({"id": 1}))).unwrap();
        c.push(&p(json!({"id": 2}))).unwrap();
        assert_eq!(c.remove(&1).map(|r| r.id), Some(1));
        assert!(c.remove(&1).is_none());
        assert_eq!(c.keys(), vec![2]);
    }

    #[test]
    fn notifications_sorted_and_newest_flagged() {
        let mut n = NotificationCollection::default();
        n.push(&p(json!({"id": 2, "created_ts": 200}))).unwrap();
        n.push(&p(json!({"id": 1, "created_ts": 100}))).unwrap();
        n.push(&p(json!({"id": 3, "created_ts": 150}))).unwrap();

        let ids: Vec<i64> = n.all().iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        let first: Vec<i64> = n.all().iter().filter(|x| x.is_first).map(|x| x.id).collect();
        assert_eq!(first, vec![2]);
        assert_eq!(n.recent()[0].id, 2);
    }

    #[test]
    fn notifications_trim_oldest_beyond_limit() {
        let mut n = NotificationCollection::with_limit(3);
        for i in 0..3 {
            n.push(&p(json!({"id": i, "created_ts": 10 * i}))).unwrap();
        }
        let changes = n.push(&p(json!({"id": 10, "created_ts": 1000}))).unwrap();
        assert_eq!(changes, vec![Change::Added(10), Change::Removed(0)]);
        assert_eq!(n.keys(), vec![1, 2, 10]);
        assert!(n.get(&10).unwrap().is_first);
        assert!(!n.get(&2).unwrap().is_first);
    }

    #[test]
    fn older_than_all_into_full_list_is_evicted_at_once() {
        let mut n = NotificationCollection::with_limit(2);
        n.push(&p(json!({"id": 1, "created_ts": 100}))).unwrap();
        n.push(&p(json!({"id": 2, "created_ts": 200}))).unwrap();

        let changes = n.push(&p(json!({"id": 9, "created_ts": 50}))).unwrap();
        assert_eq!(changes, vec![Change::Added(9), Change::Removed(9)]);
        assert_eq!(n.keys(), vec![1, 2]);
        assert!(n.get(&2).unwrap().is_first);
    }

    #[test]
    fn notification_update_keeps_single_copy() {
        let mut n = NotificationCollection::default();
        n.push(&p(json!({"id": 1, "text": "a", "created_ts": 5}))).unwrap();
        n.upsert(&p(json!({"id": 1, "text": "b"}))).unwrap();
        assert_eq!(n.len(), 1);
        assert_eq!(n.get(&1).unwrap().text, "b");
    }
}
