//! Session surface and store-failure atomicity.

mod fixtures;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fixtures::loc;
use mappa::{
    ConstructRow, ContentHash, Locator, ModelError, NameDraft, RowKey, Store, StoreFailure,
    SystemBuilder, TopicMapId,
};

#[test]
fn system_tracks_topic_maps_by_locator() {
    let mut system = SystemBuilder::new().build();
    let l1 = loc("http://example.org/maps/a");
    let l2 = loc("http://example.org/maps/b");

    system.create_topic_map(l1.clone()).unwrap();
    system.create_topic_map(l2.clone()).unwrap();
    assert_eq!(system.locators(), vec![&l1, &l2]);

    assert!(system.remove_topic_map(&l1).unwrap());
    assert!(!system.remove_topic_map(&l1).unwrap());
    assert!(system.topic_map(&l1).is_none());
    assert!(system.topic_map(&l2).is_some());

    system.close();
}

#[test]
fn builder_rejects_unknown_features() {
    let err = SystemBuilder::new()
        .feature("no-such-feature", true)
        .unwrap_err();
    assert!(matches!(err, ModelError::Feature(_)));
}

/// Store that can be armed to fail every commit.
struct FlakyStore {
    inner: mappa::MemoryStore,
    fail_commit: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: mappa::MemoryStore::new(),
            fail_commit: AtomicBool::new(false),
        }
    }
}

impl Store for FlakyStore {
    fn begin(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        self.inner.begin(map)
    }

    fn commit(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        if self.fail_commit.load(Ordering::SeqCst) {
            self.inner.rollback(map)?;
            return Err(StoreFailure::new("commit", "injected failure"));
        }
        self.inner.commit(map)
    }

    fn rollback(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        self.inner.rollback(map)
    }

    fn put(&self, map: TopicMapId, row: ConstructRow) -> Result<(), StoreFailure> {
        self.inner.put(map, row)
    }

    fn delete(&self, map: TopicMapId, key: RowKey) -> Result<(), StoreFailure> {
        self.inner.delete(map, key)
    }

    fn drop_map(&self, map: TopicMapId) -> Result<(), StoreFailure> {
        self.inner.drop_map(map)
    }

    fn find_by_item_identifier(
        &self,
        map: TopicMapId,
        locator: &Locator,
    ) -> Result<Option<mappa::ConstructRef>, StoreFailure> {
        self.inner.find_by_item_identifier(map, locator)
    }

    fn find_by_subject_identifier(
        &self,
        map: TopicMapId,
        locator: &Locator,
    ) -> Result<Option<mappa::TopicId>, StoreFailure> {
        self.inner.find_by_subject_identifier(map, locator)
    }

    fn find_by_subject_locator(
        &self,
        map: TopicMapId,
        locator: &Locator,
    ) -> Result<Option<mappa::TopicId>, StoreFailure> {
        self.inner.find_by_subject_locator(map, locator)
    }

    fn find_by_hash(
        &self,
        map: TopicMapId,
        kind: mappa::ConstructKind,
        parent: mappa::ConstructRef,
        hash: ContentHash,
    ) -> Result<Option<mappa::ConstructRef>, StoreFailure> {
        self.inner.find_by_hash(map, kind, parent, hash)
    }

    fn scope_users(
        &self,
        map: TopicMapId,
        scope: mappa::ScopeId,
    ) -> Result<Vec<mappa::ConstructRef>, StoreFailure> {
        self.inner.scope_users(map, scope)
    }
}

#[test]
fn store_commit_failure_rolls_the_mutation_back() {
    let store = Arc::new(FlakyStore::new());
    let mut system = SystemBuilder::new().store(store.clone()).build();
    let map = system
        .create_topic_map(loc("http://example.org/maps/flaky"))
        .unwrap();
    let topic = map.create_topic().unwrap();
    map.create_name(topic, NameDraft::new("kept")).unwrap();

    store.fail_commit.store(true, Ordering::SeqCst);
    let err = map.create_name(topic, NameDraft::new("lost")).unwrap_err();
    assert!(matches!(err, ModelError::Store(_)), "{err}");

    // In-memory state rolled back with the store transaction.
    assert_eq!(map.topic(topic).unwrap().names().len(), 1);

    store.fail_commit.store(false, Ordering::SeqCst);
    map.create_name(topic, NameDraft::new("after")).unwrap();
    assert_eq!(map.topic(topic).unwrap().names().len(), 2);
}
