//! Layer 8: Persistent store contract
//!
//! The engine consumes this contract and nothing more: transactional
//! boundaries, CRUD on per-kind row records, and the query primitives a
//! relational or key-value backend can answer directly. Rows mirror the
//! construct records one-to-one; the engine issues no query language.
//!
//! Within a transaction the store must be read-your-writes; any failure
//! aborts the engine's whole atomic boundary.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::StoreFailure;
use crate::hash::ContentHash;
use crate::locator::Locator;
use crate::model::{
    AssociationData, ConstructKind, ConstructRef, NameData, OccurrenceData, RoleData, TopicData,
    TopicId, TopicMapId, VariantData,
};
use crate::scope::ScopeId;

pub mod memory;

pub use memory::MemoryStore;

/// Row for the topic map construct itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicMapRow {
    pub id: TopicMapId,
    pub locator: Locator,
    pub item_identifiers: BTreeSet<Locator>,
    pub reifier: Option<TopicId>,
}

/// Row for an interned scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScopeRow {
    pub id: ScopeId,
    pub themes: BTreeSet<TopicId>,
}

/// One persisted record. Construct rows embed the full construct record,
/// identities and content hash included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructRow {
    TopicMap(TopicMapRow),
    Topic(TopicData),
    Association(AssociationData),
    Role(RoleData),
    Name(NameData),
    Occurrence(OccurrenceData),
    Variant(VariantData),
    Scope(ScopeRow),
}

impl ConstructRow {
    pub fn key(&self) -> RowKey {
        match self {
            ConstructRow::TopicMap(row) => RowKey::Construct(ConstructRef::TopicMap(row.id)),
            ConstructRow::Topic(data) => RowKey::Construct(ConstructRef::Topic(data.id)),
            ConstructRow::Association(data) => {
                RowKey::Construct(ConstructRef::Association(data.id))
            }
            ConstructRow::Role(data) => RowKey::Construct(ConstructRef::Role(data.id)),
            ConstructRow::Name(data) => RowKey::Construct(ConstructRef::Name(data.id)),
            ConstructRow::Occurrence(data) => RowKey::Construct(ConstructRef::Occurrence(data.id)),
            ConstructRow::Variant(data) => RowKey::Construct(ConstructRef::Variant(data.id)),
            ConstructRow::Scope(row) => RowKey::Scope(row.id),
        }
    }
}

/// Primary key of a persisted record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKey {
    Construct(ConstructRef),
    Scope(ScopeId),
}

/// The persistence collaborator.
///
/// One transaction at a time per topic map; the engine collapses nested
/// atomic boundaries before calling in.
pub trait Store: Send + Sync {
    fn begin(&self, map: TopicMapId) -> Result<(), StoreFailure>;
    fn commit(&self, map: TopicMapId) -> Result<(), StoreFailure>;
    fn rollback(&self, map: TopicMapId) -> Result<(), StoreFailure>;

    fn put(&self, map: TopicMapId, row: ConstructRow) -> Result<(), StoreFailure>;
    fn delete(&self, map: TopicMapId, key: RowKey) -> Result<(), StoreFailure>;
    /// Drop every record of a topic map.
    fn drop_map(&self, map: TopicMapId) -> Result<(), StoreFailure>;

    fn find_by_item_identifier(
        &self,
        map: TopicMapId,
        loc: &Locator,
    ) -> Result<Option<ConstructRef>, StoreFailure>;
    fn find_by_subject_identifier(
        &self,
        map: TopicMapId,
        loc: &Locator,
    ) -> Result<Option<TopicId>, StoreFailure>;
    fn find_by_subject_locator(
        &self,
        map: TopicMapId,
        loc: &Locator,
    ) -> Result<Option<TopicId>, StoreFailure>;
    /// Content-hash lookup within a parent, for duplicate detection.
    fn find_by_hash(
        &self,
        map: TopicMapId,
        kind: ConstructKind,
        parent: ConstructRef,
        hash: ContentHash,
    ) -> Result<Option<ConstructRef>, StoreFailure>;
    /// Constructs whose scope (for variants: own scope) is `scope`.
    fn scope_users(
        &self,
        map: TopicMapId,
        scope: ScopeId,
    ) -> Result<Vec<ConstructRef>, StoreFailure>;
}
