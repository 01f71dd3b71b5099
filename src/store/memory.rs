//! In-memory store: the reference implementation of the store contract.
//!
//! Keeps a committed row map per topic map plus a staged copy while a
//! transaction is open. Mutations outside a transaction are contract
//! violations and fail loudly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::error::StoreFailure;
use crate::hash::ContentHash;
use crate::locator::Locator;
use crate::model::{ConstructKind, ConstructRef, TopicId, TopicMapId};
use crate::scope::ScopeId;
use crate::store::{ConstructRow, RowKey, Store};

#[derive(Clone, Default)]
struct MapRows {
    rows: BTreeMap<RowKey, ConstructRow>,
}

#[derive(Default)]
struct Inner {
    committed: BTreeMap<TopicMapId, MapRows>,
    staged: BTreeMap<TopicMapId, MapRows>,
    open: BTreeSet<TopicMapId>,
}

impl Inner {
    /// Rows visible right now: staged within a transaction, committed
    /// otherwise (read-your-writes).
    fn visible(&self, map: TopicMapId) -> Option<&MapRows> {
        if self.open.contains(&map) {
            self.staged.get(&map)
        } else {
            self.committed.get(&map)
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, op: &'static str) -> Result<std::sync::MutexGuard<'_, Inner>, StoreFailure> {
        self.inner
            .lock()
            .map_err(|_| StoreFailure::new(op, "store mutex poisoned"))
    }

    /// Committed row count for a map (test observability).
    pub fn row_count(&self, map: TopicMapId) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .committed
                    .get(&map)
                    .map(|rows| rows.rows.len())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn begin(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        let mut inner = self.lock("begin")?;
        if !inner.open.insert(map) {
            return Err(StoreFailure::new("begin", "transaction already open"));
        }
        let base = inner.committed.get(&map).cloned().unwrap_or_default();
        inner.staged.insert(map, base);
        Ok(())
    }

    fn commit(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        let mut inner = self.lock("commit")?;
        if !inner.open.remove(&map) {
            return Err(StoreFailure::new("commit", "no open transaction"));
        }
        let staged = inner
            .staged
            .remove(&map)
            .ok_or_else(|| StoreFailure::new("commit", "staged rows missing"))?;
        inner.committed.insert(map, staged);
        Ok(())
    }

    fn rollback(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        let mut inner = self.lock("rollback")?;
        if !inner.open.remove(&map) {
            return Err(StoreFailure::new("rollback", "no open transaction"));
        }
        inner.staged.remove(&map);
        Ok(())
    }

    fn put(&self, map: TopicMapId, row: ConstructRow) -> Result<(), StoreFailure> {
        let mut inner = self.lock("put")?;
        if !inner.open.contains(&map) {
            return Err(StoreFailure::new("put", "no open transaction"));
        }
        let rows = inner.staged.entry(map).or_default();
        rows.rows.insert(row.key(), row);
        Ok(())
    }

    fn delete(&self, map: TopicMapId, key: RowKey) -> Result<(), StoreFailure> {
        let mut inner = self.lock("delete")?;
        if !inner.open.contains(&map) {
            return Err(StoreFailure::new("delete", "no open transaction"));
        }
        if let Some(rows) = inner.staged.get_mut(&map) {
            rows.rows.remove(&key);
        }
        Ok(())
    }

    fn drop_map(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        let mut inner = self.lock("drop_map")?;
        if inner.open.contains(&map) {
            return Err(StoreFailure::new("drop_map", "transaction still open"));
        }
        inner.committed.remove(&map);
        inner.staged.remove(&map);
        Ok(())
    }

    fn find_by_item_identifier(
        &self,
        map: TopicMapId,
        loc: &Locator,
    ) -> Result<Option<ConstructRef>, StoreFailure> {
        let inner = self.lock("find_by_item_identifier")?;
        let Some(rows) = inner.visible(map) else {
            return Ok(None);
        };
        for row in rows.rows.values() {
            let (owner, iids) = match row {
                ConstructRow::TopicMap(r) => {
                    (ConstructRef::TopicMap(r.id), &r.item_identifiers)
                }
                ConstructRow::Topic(d) => (ConstructRef::Topic(d.id), &d.iids),
                ConstructRow::Association(d) => (ConstructRef::Association(d.id), &d.iids),
                ConstructRow::Role(d) => (ConstructRef::Role(d.id), &d.iids),
                ConstructRow::Name(d) => (ConstructRef::Name(d.id), &d.iids),
                ConstructRow::Occurrence(d) => (ConstructRef::Occurrence(d.id), &d.iids),
                ConstructRow::Variant(d) => (ConstructRef::Variant(d.id), &d.iids),
                ConstructRow::Scope(_) => continue,
            };
            if iids.contains(loc) {
                return Ok(Some(owner));
            }
        }
        Ok(None)
    }

    fn find_by_subject_identifier(
        &self,
        map: TopicMapId,
        loc: &Locator,
    ) -> Result<Option<TopicId>, StoreFailure> {
        let inner = self.lock("find_by_subject_identifier")?;
        let Some(rows) = inner.visible(map) else {
            return Ok(None);
        };
        for row in rows.rows.values() {
            if let ConstructRow::Topic(d) = row {
                if d.sids.contains(loc) {
                    return Ok(Some(d.id));
                }
            }
        }
        Ok(None)
    }

    fn find_by_subject_locator(
        &self,
        map: TopicMapId,
        loc: &Locator,
    ) -> Result<Option<TopicId>, StoreFailure> {
        let inner = self.lock("find_by_subject_locator")?;
        let Some(rows) = inner.visible(map) else {
            return Ok(None);
        };
        for row in rows.rows.values() {
            if let ConstructRow::Topic(d) = row {
                if d.slos.contains(loc) {
                    return Ok(Some(d.id));
                }
            }
        }
        Ok(None)
    }

    fn find_by_hash(
        &self,
        map: TopicMapId,
        kind: ConstructKind,
        parent: ConstructRef,
        hash: ContentHash,
    ) -> Result<Option<ConstructRef>, StoreFailure> {
        let inner = self.lock("find_by_hash")?;
        let Some(rows) = inner.visible(map) else {
            return Ok(None);
        };
        for row in rows.rows.values() {
            let hit = match (kind, row) {
                (ConstructKind::Name, ConstructRow::Name(d)) => {
                    (ConstructRef::Topic(d.parent) == parent && d.hash == hash)
                        .then_some(ConstructRef::Name(d.id))
                }
                (ConstructKind::Occurrence, ConstructRow::Occurrence(d)) => {
                    (ConstructRef::Topic(d.parent) == parent && d.hash == hash)
                        .then_some(ConstructRef::Occurrence(d.id))
                }
                (ConstructKind::Variant, ConstructRow::Variant(d)) => {
                    (ConstructRef::Name(d.parent) == parent && d.hash == hash)
                        .then_some(ConstructRef::Variant(d.id))
                }
                (ConstructKind::Association, ConstructRow::Association(d)) => {
                    (d.hash == hash).then_some(ConstructRef::Association(d.id))
                }
                _ => None,
            };
            if hit.is_some() {
                return Ok(hit);
            }
        }
        Ok(None)
    }

    fn scope_users(
        &self,
        map: TopicMapId,
        scope: ScopeId,
    ) -> Result<Vec<ConstructRef>, StoreFailure> {
        let inner = self.lock("scope_users")?;
        let Some(rows) = inner.visible(map) else {
            return Ok(Vec::new());
        };
        let mut users = Vec::new();
        for row in rows.rows.values() {
            let user = match row {
                ConstructRow::Association(d) if d.scope == scope => {
                    Some(ConstructRef::Association(d.id))
                }
                ConstructRow::Name(d) if d.scope == scope => Some(ConstructRef::Name(d.id)),
                ConstructRow::Occurrence(d) if d.scope == scope => {
                    Some(ConstructRef::Occurrence(d.id))
                }
                ConstructRow::Variant(d) if d.scope == scope => Some(ConstructRef::Variant(d.id)),
                _ => None,
            };
            users.extend(user);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopicData;

    fn topic_row(map: TopicMapId, n: u64) -> ConstructRow {
        ConstructRow::Topic(TopicData::new(TopicId::new(map, n)))
    }

    #[test]
    fn mutations_require_an_open_transaction() {
        let store = MemoryStore::new();
        let map = TopicMapId::random();
        let err = store.put(map, topic_row(map, 1)).unwrap_err();
        assert_eq!(err.op, "put");
    }

    #[test]
    fn rollback_discards_staged_rows() {
        let store = MemoryStore::new();
        let map = TopicMapId::random();

        store.begin(map).unwrap();
        store.put(map, topic_row(map, 1)).unwrap();
        store.rollback(map).unwrap();

        assert_eq!(store.row_count(map), 0);
    }

    #[test]
    fn commit_publishes_staged_rows() {
        let store = MemoryStore::new();
        let map = TopicMapId::random();

        store.begin(map).unwrap();
        store.put(map, topic_row(map, 1)).unwrap();
        store.put(map, topic_row(map, 2)).unwrap();
        store.delete(map, topic_row(map, 2).key()).unwrap();
        store.commit(map).unwrap();

        assert_eq!(store.row_count(map), 1);
    }

    #[test]
    fn finds_are_read_your_writes_inside_a_transaction() {
        let store = MemoryStore::new();
        let map = TopicMapId::random();
        let loc = Locator::new("sid:inside-txn").unwrap();

        let mut topic = TopicData::new(TopicId::new(map, 3));
        topic.sids.insert(loc.clone());

        store.begin(map).unwrap();
        store.put(map, ConstructRow::Topic(topic.clone())).unwrap();
        let found = store.find_by_subject_identifier(map, &loc).unwrap();
        assert_eq!(found, Some(topic.id));
        store.rollback(map).unwrap();

        assert_eq!(store.find_by_subject_identifier(map, &loc).unwrap(), None);
    }

    #[test]
    fn nested_begin_is_rejected() {
        let store = MemoryStore::new();
        let map = TopicMapId::random();
        store.begin(map).unwrap();
        assert!(store.begin(map).is_err());
        store.rollback(map).unwrap();
    }
}
