//! Layer 6: The construct store.
//!
//! [`TopicMap`] owns the full in-memory graph of one topic map plus its
//! identity index, scope registry, reverse-usage indexes and sibling hash
//! indexes. Every mutation runs inside an atomic boundary: on entry the
//! state is snapshotted and the store transaction opened; on failure the
//! snapshot is restored and the store rolled back. Nested boundaries
//! collapse into the outermost one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{
    ConstraintReason, ConstraintViolation, IdentityConflict, ModelError, TopicInUse,
    UnknownConstruct,
};
use crate::features::Features;
use crate::hash::{association_hash, name_hash, occurrence_hash, variant_hash, ContentHash};
use crate::identity::{IdentityDecision, IdentityIndex, IdentityKind};
use crate::locator::Locator;
use crate::model::{
    AssociationData, AssociationId, ConstructKind, ConstructRef, NameData, NameId, OccurrenceData,
    OccurrenceId, RoleData, RoleId, TopicData, TopicId, TopicMapId, VariantData, VariantId,
};
use crate::scope::{ScopeId, ScopeRegistry};
use crate::store::{ConstructRow, RowKey, ScopeRow, Store, TopicMapRow};

#[derive(Clone, Debug)]
pub(crate) struct MapState {
    next_id: u64,
    /// The map's own item identifiers.
    pub(crate) iids: BTreeSet<Locator>,
    /// The map's reifier, if any.
    pub(crate) reifier: Option<TopicId>,
    pub(crate) topics: BTreeMap<TopicId, TopicData>,
    pub(crate) associations: BTreeMap<AssociationId, AssociationData>,
    pub(crate) roles: BTreeMap<RoleId, RoleData>,
    pub(crate) names: BTreeMap<NameId, NameData>,
    pub(crate) occurrences: BTreeMap<OccurrenceId, OccurrenceData>,
    pub(crate) variants: BTreeMap<VariantId, VariantData>,
    pub(crate) scopes: ScopeRegistry,
    pub(crate) identity: IdentityIndex,
    /// Constructs typed by a given topic (topics-with-type included).
    pub(crate) typed: BTreeMap<TopicId, BTreeSet<ConstructRef>>,
    /// Roles played by a given topic.
    pub(crate) played: BTreeMap<TopicId, BTreeSet<RoleId>>,
    pub(crate) name_hashes: BTreeMap<(TopicId, ContentHash), BTreeSet<NameId>>,
    pub(crate) occurrence_hashes: BTreeMap<(TopicId, ContentHash), BTreeSet<OccurrenceId>>,
    pub(crate) association_hashes: BTreeMap<ContentHash, BTreeSet<AssociationId>>,
    pub(crate) variant_hashes: BTreeMap<(NameId, ContentHash), BTreeSet<VariantId>>,
}

impl MapState {
    fn new() -> Self {
        Self {
            next_id: 0,
            iids: BTreeSet::new(),
            reifier: None,
            topics: BTreeMap::new(),
            associations: BTreeMap::new(),
            roles: BTreeMap::new(),
            names: BTreeMap::new(),
            occurrences: BTreeMap::new(),
            variants: BTreeMap::new(),
            scopes: ScopeRegistry::new(),
            identity: IdentityIndex::new(),
            typed: BTreeMap::new(),
            played: BTreeMap::new(),
            name_hashes: BTreeMap::new(),
            occurrence_hashes: BTreeMap::new(),
            association_hashes: BTreeMap::new(),
            variant_hashes: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct TxnState {
    depth: u32,
    snapshot: Option<Box<MapState>>,
}

/// One topic map: root construct and construct store.
pub struct TopicMap {
    pub(crate) id: TopicMapId,
    locator: Locator,
    features: Features,
    store: Arc<dyn Store>,
    pub(crate) state: MapState,
    txn_state: TxnState,
}

impl fmt::Debug for TopicMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicMap")
            .field("id", &self.id)
            .field("locator", &self.locator)
            .field("topics", &self.state.topics.len())
            .field("associations", &self.state.associations.len())
            .finish()
    }
}

impl TopicMap {
    pub(crate) fn create(
        locator: Locator,
        features: Features,
        store: Arc<dyn Store>,
    ) -> Result<Self, ModelError> {
        let mut map = Self {
            id: TopicMapId::random(),
            locator,
            features,
            store,
            state: MapState::new(),
            txn_state: TxnState::default(),
        };
        map.txn(|m| {
            m.persist(ConstructRef::TopicMap(m.id))?;
            m.persist_scope(ScopeId::UNCONSTRAINED)
        })?;
        Ok(map)
    }

    pub fn id(&self) -> TopicMapId {
        self.id
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The map's own item identifiers.
    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.state.iids
    }

    /// The map's reifier, if any.
    pub fn reifier(&self) -> Option<TopicId> {
        self.state.reifier
    }

    // ------------------------------------------------------------------
    // Atomic boundary

    pub(crate) fn txn<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ModelError>,
    ) -> Result<T, ModelError> {
        self.txn_begin()?;
        match f(self) {
            Ok(value) => {
                self.txn_commit()?;
                Ok(value)
            }
            Err(err) => {
                self.txn_abort();
                Err(err)
            }
        }
    }

    fn txn_begin(&mut self) -> Result<(), ModelError> {
        if self.txn_state.depth == 0 {
            self.store.begin(self.id)?;
            self.txn_state.snapshot = Some(Box::new(self.state.clone()));
        }
        self.txn_state.depth += 1;
        Ok(())
    }

    fn txn_commit(&mut self) -> Result<(), ModelError> {
        self.txn_state.depth -= 1;
        if self.txn_state.depth > 0 {
            return Ok(());
        }
        match self.store.commit(self.id) {
            Ok(()) => {
                self.txn_state.snapshot = None;
                Ok(())
            }
            Err(err) => {
                if let Some(snapshot) = self.txn_state.snapshot.take() {
                    self.state = *snapshot;
                }
                Err(err.into())
            }
        }
    }

    fn txn_abort(&mut self) {
        self.txn_state.depth -= 1;
        if self.txn_state.depth > 0 {
            return;
        }
        if let Some(snapshot) = self.txn_state.snapshot.take() {
            self.state = *snapshot;
        }
        if let Err(err) = self.store.rollback(self.id) {
            tracing::error!(map = %self.id, error = %err, "store rollback failed");
        }
    }

    // ------------------------------------------------------------------
    // Persistence mirroring

    pub(crate) fn persist(&self, construct: ConstructRef) -> Result<(), ModelError> {
        let row = match construct {
            ConstructRef::TopicMap(_) => ConstructRow::TopicMap(TopicMapRow {
                id: self.id,
                locator: self.locator.clone(),
                item_identifiers: self.state.iids.clone(),
                reifier: self.state.reifier,
            }),
            ConstructRef::Topic(id) => match self.state.topics.get(&id) {
                Some(data) => ConstructRow::Topic(data.clone()),
                None => return Ok(()),
            },
            ConstructRef::Association(id) => match self.state.associations.get(&id) {
                Some(data) => ConstructRow::Association(data.clone()),
                None => return Ok(()),
            },
            ConstructRef::Role(id) => match self.state.roles.get(&id) {
                Some(data) => ConstructRow::Role(data.clone()),
                None => return Ok(()),
            },
            ConstructRef::Name(id) => match self.state.names.get(&id) {
                Some(data) => ConstructRow::Name(data.clone()),
                None => return Ok(()),
            },
            ConstructRef::Occurrence(id) => match self.state.occurrences.get(&id) {
                Some(data) => ConstructRow::Occurrence(data.clone()),
                None => return Ok(()),
            },
            ConstructRef::Variant(id) => match self.state.variants.get(&id) {
                Some(data) => ConstructRow::Variant(data.clone()),
                None => return Ok(()),
            },
        };
        self.store.put(self.id, row)?;
        Ok(())
    }

    pub(crate) fn persist_scope(&self, scope: ScopeId) -> Result<(), ModelError> {
        let themes = match self.state.scopes.get(scope) {
            Some(data) => data.themes().clone(),
            None => return Ok(()),
        };
        self.store
            .put(self.id, ConstructRow::Scope(ScopeRow { id: scope, themes }))?;
        Ok(())
    }

    pub(crate) fn erase(&self, construct: ConstructRef) -> Result<(), ModelError> {
        self.store.delete(self.id, RowKey::Construct(construct))?;
        Ok(())
    }

    pub(crate) fn erase_scope(&self, scope: ScopeId) -> Result<(), ModelError> {
        self.store.delete(self.id, RowKey::Scope(scope))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution

    pub(crate) fn alloc(&mut self) -> u64 {
        self.state.next_id += 1;
        self.state.next_id
    }

    pub fn topic(&self, id: TopicId) -> Result<&TopicData, ModelError> {
        self.state.topics.get(&id).ok_or_else(|| {
            UnknownConstruct {
                construct: ConstructRef::Topic(id),
            }
            .into()
        })
    }

    pub fn association(&self, id: AssociationId) -> Result<&AssociationData, ModelError> {
        self.state.associations.get(&id).ok_or_else(|| {
            UnknownConstruct {
                construct: ConstructRef::Association(id),
            }
            .into()
        })
    }

    pub fn role(&self, id: RoleId) -> Result<&RoleData, ModelError> {
        self.state.roles.get(&id).ok_or_else(|| {
            UnknownConstruct {
                construct: ConstructRef::Role(id),
            }
            .into()
        })
    }

    pub fn name(&self, id: NameId) -> Result<&NameData, ModelError> {
        self.state.names.get(&id).ok_or_else(|| {
            UnknownConstruct {
                construct: ConstructRef::Name(id),
            }
            .into()
        })
    }

    pub fn occurrence(&self, id: OccurrenceId) -> Result<&OccurrenceData, ModelError> {
        self.state.occurrences.get(&id).ok_or_else(|| {
            UnknownConstruct {
                construct: ConstructRef::Occurrence(id),
            }
            .into()
        })
    }

    pub fn variant(&self, id: VariantId) -> Result<&VariantData, ModelError> {
        self.state.variants.get(&id).ok_or_else(|| {
            UnknownConstruct {
                construct: ConstructRef::Variant(id),
            }
            .into()
        })
    }

    pub fn topics(&self) -> impl Iterator<Item = &TopicData> {
        self.state.topics.values()
    }

    pub fn associations(&self) -> impl Iterator<Item = &AssociationData> {
        self.state.associations.values()
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleData> {
        self.state.roles.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &NameData> {
        self.state.names.values()
    }

    pub fn occurrences(&self) -> impl Iterator<Item = &OccurrenceData> {
        self.state.occurrences.values()
    }

    pub fn variants(&self) -> impl Iterator<Item = &VariantData> {
        self.state.variants.values()
    }

    /// Theme set of an interned scope (empty for stale handles).
    pub fn scope_themes(&self, scope: ScopeId) -> BTreeSet<TopicId> {
        self.state.scopes.themes(scope)
    }

    /// The construct reified by `topic`, if any.
    pub fn reified_by(&self, topic: TopicId) -> Option<ConstructRef> {
        self.state.identity.reified(topic)
    }

    pub fn topic_by_subject_identifier(&self, loc: &Locator) -> Option<TopicId> {
        self.state.identity.subject(loc)
    }

    pub fn topic_by_subject_locator(&self, loc: &Locator) -> Option<TopicId> {
        self.state.identity.subject_locator(loc)
    }

    pub fn construct_by_item_identifier(&self, loc: &Locator) -> Option<ConstructRef> {
        self.state.identity.item(loc)
    }

    // ------------------------------------------------------------------
    // Topic lifecycle

    pub fn create_topic(&mut self) -> Result<TopicId, ModelError> {
        self.txn(|map| map.create_topic_internal())
    }

    pub(crate) fn create_topic_internal(&mut self) -> Result<TopicId, ModelError> {
        let id = TopicId::new(self.id, self.alloc());
        self.state.topics.insert(id, TopicData::new(id));
        self.persist(ConstructRef::Topic(id))?;
        Ok(id)
    }

    /// Find-or-create a topic by subject identifier.
    pub fn create_topic_by_subject_identifier(
        &mut self,
        loc: Locator,
    ) -> Result<TopicId, ModelError> {
        self.txn(|map| {
            if let Some(existing) = map.state.identity.subject(&loc) {
                return Ok(existing);
            }
            let topic = match map.state.identity.item(&loc) {
                Some(ConstructRef::Topic(existing)) => existing,
                _ => map.create_topic_internal()?,
            };
            map.add_topic_identity(topic, loc, IdentityKind::Subject)?;
            Ok(topic)
        })
    }

    /// Find-or-create a topic by item identifier.
    pub fn create_topic_by_item_identifier(&mut self, loc: Locator) -> Result<TopicId, ModelError> {
        self.txn(|map| {
            let topic = match map.state.identity.item(&loc) {
                Some(ConstructRef::Topic(existing)) => return Ok(existing),
                Some(owner) => {
                    return Err(IdentityConflict {
                        existing: owner,
                        acting: ConstructRef::TopicMap(map.id),
                        locator: loc,
                    }
                    .into())
                }
                None => match map.state.identity.subject(&loc) {
                    Some(existing) => existing,
                    None => map.create_topic_internal()?,
                },
            };
            map.add_topic_identity(topic, loc, IdentityKind::Item)?;
            Ok(topic)
        })
    }

    /// Find-or-create a topic by subject locator.
    pub fn create_topic_by_subject_locator(&mut self, loc: Locator) -> Result<TopicId, ModelError> {
        self.txn(|map| {
            if let Some(existing) = map.state.identity.subject_locator(&loc) {
                return Ok(existing);
            }
            let topic = map.create_topic_internal()?;
            map.add_topic_identity(topic, loc, IdentityKind::SubjectLocator)?;
            Ok(topic)
        })
    }

    pub fn add_subject_identifier(&mut self, topic: TopicId, loc: Locator) -> Result<(), ModelError> {
        self.txn(|map| {
            map.check_topic_arg(ConstructRef::Topic(topic), topic)?;
            map.add_topic_identity(topic, loc, IdentityKind::Subject)
        })
    }

    pub fn add_subject_locator(&mut self, topic: TopicId, loc: Locator) -> Result<(), ModelError> {
        self.txn(|map| {
            map.check_topic_arg(ConstructRef::Topic(topic), topic)?;
            map.add_topic_identity(topic, loc, IdentityKind::SubjectLocator)
        })
    }

    /// Bind an item identifier to any construct, the topic map included.
    ///
    /// For topics this routes through the identity chokepoint and may merge;
    /// for every other construct kind an existing owner is a hard conflict.
    pub fn add_item_identifier(
        &mut self,
        construct: ConstructRef,
        loc: Locator,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.check_ref(construct)?;
            match construct {
                ConstructRef::Topic(topic) => {
                    map.add_topic_identity(topic, loc, IdentityKind::Item)
                }
                _ => {
                    map.state.identity.check_item_free(construct, &loc)?;
                    if let Some(iids) = map.iids_mut(construct) {
                        if !iids.insert(loc.clone()) {
                            return Ok(());
                        }
                    }
                    map.state.identity.bind_item(loc, construct);
                    map.persist(construct)
                }
            }
        })
    }

    /// The single chokepoint for topic identity binds.
    pub(crate) fn add_topic_identity(
        &mut self,
        topic: TopicId,
        loc: Locator,
        kind: IdentityKind,
    ) -> Result<(), ModelError> {
        match self.state.identity.decide(topic, &loc, kind)? {
            IdentityDecision::AlreadyBound => Ok(()),
            IdentityDecision::Bind => self.bind_topic_identity(topic, loc, kind),
            IdentityDecision::MergeWith(other) => {
                if self.features.automerge {
                    tracing::debug!(
                        map = %self.id,
                        %topic,
                        %other,
                        locator = %loc,
                        "identity collision, merging topics"
                    );
                    self.merge_topics(topic, other)?;
                    self.bind_topic_identity(topic, loc, kind)
                } else {
                    Err(IdentityConflict {
                        existing: ConstructRef::Topic(other),
                        acting: ConstructRef::Topic(topic),
                        locator: loc,
                    }
                    .into())
                }
            }
        }
    }

    pub(crate) fn bind_topic_identity(
        &mut self,
        topic: TopicId,
        loc: Locator,
        kind: IdentityKind,
    ) -> Result<(), ModelError> {
        match kind {
            IdentityKind::Item => {
                self.state
                    .identity
                    .bind_item(loc.clone(), ConstructRef::Topic(topic));
                if let Some(data) = self.state.topics.get_mut(&topic) {
                    data.iids.insert(loc);
                }
            }
            IdentityKind::Subject => {
                self.state.identity.bind_subject(loc.clone(), topic);
                if let Some(data) = self.state.topics.get_mut(&topic) {
                    data.sids.insert(loc);
                }
            }
            IdentityKind::SubjectLocator => {
                self.state.identity.bind_subject_locator(loc.clone(), topic);
                if let Some(data) = self.state.topics.get_mut(&topic) {
                    data.slos.insert(loc);
                }
            }
        }
        self.persist(ConstructRef::Topic(topic))
    }

    pub fn remove_subject_identifier(
        &mut self,
        topic: TopicId,
        loc: &Locator,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.topic(topic)?;
            let removed = match map.state.topics.get_mut(&topic) {
                Some(data) => data.sids.remove(loc),
                None => false,
            };
            if removed {
                map.state.identity.unbind_subject(loc);
                map.persist(ConstructRef::Topic(topic))?;
            }
            Ok(())
        })
    }

    pub fn remove_subject_locator(
        &mut self,
        topic: TopicId,
        loc: &Locator,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.topic(topic)?;
            let removed = match map.state.topics.get_mut(&topic) {
                Some(data) => data.slos.remove(loc),
                None => false,
            };
            if removed {
                map.state.identity.unbind_subject_locator(loc);
                map.persist(ConstructRef::Topic(topic))?;
            }
            Ok(())
        })
    }

    pub fn remove_item_identifier(
        &mut self,
        construct: ConstructRef,
        loc: &Locator,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.check_ref(construct)?;
            let removed = match map.iids_mut(construct) {
                Some(iids) => iids.remove(loc),
                None => false,
            };
            if removed {
                map.state.identity.unbind_item(loc);
                map.persist(construct)?;
            }
            Ok(())
        })
    }

    pub(crate) fn iids_mut(&mut self, construct: ConstructRef) -> Option<&mut BTreeSet<Locator>> {
        match construct {
            ConstructRef::TopicMap(_) => Some(&mut self.state.iids),
            ConstructRef::Topic(id) => self.state.topics.get_mut(&id).map(|d| &mut d.iids),
            ConstructRef::Association(id) => {
                self.state.associations.get_mut(&id).map(|d| &mut d.iids)
            }
            ConstructRef::Role(id) => self.state.roles.get_mut(&id).map(|d| &mut d.iids),
            ConstructRef::Name(id) => self.state.names.get_mut(&id).map(|d| &mut d.iids),
            ConstructRef::Occurrence(id) => {
                self.state.occurrences.get_mut(&id).map(|d| &mut d.iids)
            }
            ConstructRef::Variant(id) => self.state.variants.get_mut(&id).map(|d| &mut d.iids),
        }
    }

    pub(crate) fn item_identifiers_of(&self, construct: ConstructRef) -> BTreeSet<Locator> {
        match construct {
            ConstructRef::TopicMap(_) => self.state.iids.clone(),
            ConstructRef::Topic(id) => self
                .state
                .topics
                .get(&id)
                .map(|d| d.iids.clone())
                .unwrap_or_default(),
            ConstructRef::Association(id) => self
                .state
                .associations
                .get(&id)
                .map(|d| d.iids.clone())
                .unwrap_or_default(),
            ConstructRef::Role(id) => self
                .state
                .roles
                .get(&id)
                .map(|d| d.iids.clone())
                .unwrap_or_default(),
            ConstructRef::Name(id) => self
                .state
                .names
                .get(&id)
                .map(|d| d.iids.clone())
                .unwrap_or_default(),
            ConstructRef::Occurrence(id) => self
                .state
                .occurrences
                .get(&id)
                .map(|d| d.iids.clone())
                .unwrap_or_default(),
            ConstructRef::Variant(id) => self
                .state
                .variants
                .get(&id)
                .map(|d| d.iids.clone())
                .unwrap_or_default(),
        }
    }

    // ------------------------------------------------------------------
    // Typing

    pub fn add_topic_type(&mut self, topic: TopicId, ty: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let subject = ConstructRef::Topic(topic);
            map.check_topic_arg(subject, topic)?;
            map.check_topic_arg(subject, ty)?;
            let inserted = match map.state.topics.get_mut(&topic) {
                Some(data) => data.types.insert(ty),
                None => false,
            };
            if inserted {
                map.index_typed(ty, subject);
                map.persist(subject)?;
            }
            Ok(())
        })
    }

    pub fn remove_topic_type(&mut self, topic: TopicId, ty: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            map.topic(topic)?;
            let removed = match map.state.topics.get_mut(&topic) {
                Some(data) => data.types.remove(&ty),
                None => false,
            };
            if removed {
                map.unindex_typed(ty, ConstructRef::Topic(topic));
                map.persist(ConstructRef::Topic(topic))?;
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Reification

    /// Set or clear the reifier of a reifiable construct.
    pub fn set_reifier(
        &mut self,
        target: ConstructRef,
        reifier: Option<TopicId>,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.check_ref(target)?;
            if target.kind() == ConstructKind::Topic {
                return Err(ConstraintViolation {
                    construct: target,
                    reason: ConstraintReason::NotReifiable,
                }
                .into());
            }
            if let Some(r) = reifier {
                map.check_topic_arg(target, r)?;
                if let Some(reified) = map.state.identity.reified(r) {
                    if reified == target {
                        return Ok(());
                    }
                    return Err(ConstraintViolation {
                        construct: target,
                        reason: ConstraintReason::ReifierInUse { reifier: r, reified },
                    }
                    .into());
                }
            }
            let current = map.reifier_of(target);
            if current == reifier {
                return Ok(());
            }
            if let Some(old) = current {
                map.state.identity.unbind_reified(old);
            }
            map.set_reifier_slot(target, reifier);
            if let Some(r) = reifier {
                map.state.identity.bind_reified(r, target);
            }
            map.persist(target)
        })
    }

    pub(crate) fn reifier_of(&self, target: ConstructRef) -> Option<TopicId> {
        match target {
            ConstructRef::TopicMap(_) => self.state.reifier,
            ConstructRef::Topic(_) => None,
            ConstructRef::Association(id) => {
                self.state.associations.get(&id).and_then(|d| d.reifier)
            }
            ConstructRef::Role(id) => self.state.roles.get(&id).and_then(|d| d.reifier),
            ConstructRef::Name(id) => self.state.names.get(&id).and_then(|d| d.reifier),
            ConstructRef::Occurrence(id) => self.state.occurrences.get(&id).and_then(|d| d.reifier),
            ConstructRef::Variant(id) => self.state.variants.get(&id).and_then(|d| d.reifier),
        }
    }

    pub(crate) fn set_reifier_slot(&mut self, target: ConstructRef, reifier: Option<TopicId>) {
        match target {
            ConstructRef::TopicMap(_) => self.state.reifier = reifier,
            ConstructRef::Topic(_) => {}
            ConstructRef::Association(id) => {
                if let Some(d) = self.state.associations.get_mut(&id) {
                    d.reifier = reifier;
                }
            }
            ConstructRef::Role(id) => {
                if let Some(d) = self.state.roles.get_mut(&id) {
                    d.reifier = reifier;
                }
            }
            ConstructRef::Name(id) => {
                if let Some(d) = self.state.names.get_mut(&id) {
                    d.reifier = reifier;
                }
            }
            ConstructRef::Occurrence(id) => {
                if let Some(d) = self.state.occurrences.get_mut(&id) {
                    d.reifier = reifier;
                }
            }
            ConstructRef::Variant(id) => {
                if let Some(d) = self.state.variants.get_mut(&id) {
                    d.reifier = reifier;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Topic removal

    /// Remove a topic. Refused while the topic is used as a type, role
    /// player, scope theme or reifier anywhere in the map.
    pub fn remove_topic(&mut self, topic: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            map.topic(topic)?;
            if let Some(usage) = map.topic_usage(topic) {
                return Err(TopicInUse { topic, usage }.into());
            }
            map.remove_topic_internal(topic)
        })
    }

    pub(crate) fn remove_topic_internal(&mut self, topic: TopicId) -> Result<(), ModelError> {
        let (names, occurrences): (Vec<NameId>, Vec<OccurrenceId>) =
            match self.state.topics.get(&topic) {
                Some(data) => (
                    data.names.iter().copied().collect(),
                    data.occurrences.iter().copied().collect(),
                ),
                None => return Ok(()),
            };
        for name in names {
            self.remove_name_internal(name)?;
        }
        for occurrence in occurrences {
            self.remove_occurrence_internal(occurrence)?;
        }

        let Some(data) = self.state.topics.remove(&topic) else {
            return Ok(());
        };
        for loc in &data.iids {
            self.state.identity.unbind_item(loc);
        }
        for loc in &data.sids {
            self.state.identity.unbind_subject(loc);
        }
        for loc in &data.slos {
            self.state.identity.unbind_subject_locator(loc);
        }
        for ty in &data.types {
            self.unindex_typed(*ty, ConstructRef::Topic(topic));
        }
        self.erase(ConstructRef::Topic(topic))
    }

    // ------------------------------------------------------------------
    // Sibling hash indexes

    pub(crate) fn index_name_hash(&mut self, parent: TopicId, hash: ContentHash, id: NameId) {
        self.state
            .name_hashes
            .entry((parent, hash))
            .or_default()
            .insert(id);
    }

    pub(crate) fn unindex_name_hash(&mut self, parent: TopicId, hash: ContentHash, id: NameId) {
        if let Some(set) = self.state.name_hashes.get_mut(&(parent, hash)) {
            set.remove(&id);
            if set.is_empty() {
                self.state.name_hashes.remove(&(parent, hash));
            }
        }
    }

    pub(crate) fn sibling_name(
        &self,
        parent: TopicId,
        hash: ContentHash,
        exclude: Option<NameId>,
    ) -> Option<NameId> {
        self.state
            .name_hashes
            .get(&(parent, hash))?
            .iter()
            .copied()
            .find(|id| Some(*id) != exclude)
    }

    pub(crate) fn index_occurrence_hash(
        &mut self,
        parent: TopicId,
        hash: ContentHash,
        id: OccurrenceId,
    ) {
        self.state
            .occurrence_hashes
            .entry((parent, hash))
            .or_default()
            .insert(id);
    }

    pub(crate) fn unindex_occurrence_hash(
        &mut self,
        parent: TopicId,
        hash: ContentHash,
        id: OccurrenceId,
    ) {
        if let Some(set) = self.state.occurrence_hashes.get_mut(&(parent, hash)) {
            set.remove(&id);
            if set.is_empty() {
                self.state.occurrence_hashes.remove(&(parent, hash));
            }
        }
    }

    pub(crate) fn sibling_occurrence(
        &self,
        parent: TopicId,
        hash: ContentHash,
        exclude: Option<OccurrenceId>,
    ) -> Option<OccurrenceId> {
        self.state
            .occurrence_hashes
            .get(&(parent, hash))?
            .iter()
            .copied()
            .find(|id| Some(*id) != exclude)
    }

    pub(crate) fn index_association_hash(&mut self, hash: ContentHash, id: AssociationId) {
        self.state
            .association_hashes
            .entry(hash)
            .or_default()
            .insert(id);
    }

    pub(crate) fn unindex_association_hash(&mut self, hash: ContentHash, id: AssociationId) {
        if let Some(set) = self.state.association_hashes.get_mut(&hash) {
            set.remove(&id);
            if set.is_empty() {
                self.state.association_hashes.remove(&hash);
            }
        }
    }

    pub(crate) fn sibling_association(
        &self,
        hash: ContentHash,
        exclude: Option<AssociationId>,
    ) -> Option<AssociationId> {
        self.state
            .association_hashes
            .get(&hash)?
            .iter()
            .copied()
            .find(|id| Some(*id) != exclude)
    }

    pub(crate) fn index_variant_hash(&mut self, parent: NameId, hash: ContentHash, id: VariantId) {
        self.state
            .variant_hashes
            .entry((parent, hash))
            .or_default()
            .insert(id);
    }

    pub(crate) fn unindex_variant_hash(
        &mut self,
        parent: NameId,
        hash: ContentHash,
        id: VariantId,
    ) {
        if let Some(set) = self.state.variant_hashes.get_mut(&(parent, hash)) {
            set.remove(&id);
            if set.is_empty() {
                self.state.variant_hashes.remove(&(parent, hash));
            }
        }
    }

    pub(crate) fn sibling_variant(
        &self,
        parent: NameId,
        hash: ContentHash,
        exclude: Option<VariantId>,
    ) -> Option<VariantId> {
        self.state
            .variant_hashes
            .get(&(parent, hash))?
            .iter()
            .copied()
            .find(|id| Some(*id) != exclude)
    }

    // ------------------------------------------------------------------
    // Reverse usage indexes

    pub(crate) fn index_typed(&mut self, ty: TopicId, user: ConstructRef) {
        self.state.typed.entry(ty).or_default().insert(user);
    }

    pub(crate) fn unindex_typed(&mut self, ty: TopicId, user: ConstructRef) {
        if let Some(set) = self.state.typed.get_mut(&ty) {
            set.remove(&user);
            if set.is_empty() {
                self.state.typed.remove(&ty);
            }
        }
    }

    pub(crate) fn typed_users(&self, ty: TopicId) -> Vec<ConstructRef> {
        self.state
            .typed
            .get(&ty)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn index_played(&mut self, player: TopicId, role: RoleId) {
        self.state.played.entry(player).or_default().insert(role);
    }

    pub(crate) fn unindex_played(&mut self, player: TopicId, role: RoleId) {
        if let Some(set) = self.state.played.get_mut(&player) {
            set.remove(&role);
            if set.is_empty() {
                self.state.played.remove(&player);
            }
        }
    }

    pub(crate) fn played_roles(&self, player: TopicId) -> Vec<RoleId> {
        self.state
            .played
            .get(&player)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Re-hashing and re-scoping

    pub(crate) fn rehash_name(&mut self, id: NameId) -> Result<(), ModelError> {
        let (parent, old, new) = match self.state.names.get(&id) {
            Some(data) => {
                let themes = self.state.scopes.themes(data.scope);
                (data.parent, data.hash, name_hash(data.ty, &data.value, &themes))
            }
            None => return Ok(()),
        };
        if old == new {
            return Ok(());
        }
        self.unindex_name_hash(parent, old, id);
        if let Some(data) = self.state.names.get_mut(&id) {
            data.hash = new;
        }
        self.index_name_hash(parent, new, id);
        self.persist(ConstructRef::Name(id))
    }

    pub(crate) fn rehash_occurrence(&mut self, id: OccurrenceId) -> Result<(), ModelError> {
        let (parent, old, new) = match self.state.occurrences.get(&id) {
            Some(data) => {
                let themes = self.state.scopes.themes(data.scope);
                (
                    data.parent,
                    data.hash,
                    occurrence_hash(data.ty, &data.literal, &themes),
                )
            }
            None => return Ok(()),
        };
        if old == new {
            return Ok(());
        }
        self.unindex_occurrence_hash(parent, old, id);
        if let Some(data) = self.state.occurrences.get_mut(&id) {
            data.hash = new;
        }
        self.index_occurrence_hash(parent, new, id);
        self.persist(ConstructRef::Occurrence(id))
    }

    pub(crate) fn rehash_association(&mut self, id: AssociationId) -> Result<(), ModelError> {
        let (old, new) = match self.state.associations.get(&id) {
            Some(data) => {
                let themes = self.state.scopes.themes(data.scope);
                let pairs: Vec<(TopicId, TopicId)> = data
                    .roles
                    .iter()
                    .filter_map(|role| self.state.roles.get(role))
                    .map(|role| (role.ty, role.player))
                    .collect();
                (data.hash, association_hash(data.ty, &themes, &pairs))
            }
            None => return Ok(()),
        };
        if old == new {
            return Ok(());
        }
        self.unindex_association_hash(old, id);
        if let Some(data) = self.state.associations.get_mut(&id) {
            data.hash = new;
        }
        self.index_association_hash(new, id);
        self.persist(ConstructRef::Association(id))
    }

    pub(crate) fn rehash_variant(&mut self, id: VariantId) -> Result<(), ModelError> {
        let (parent, old, new) = match self.state.variants.get(&id) {
            Some(data) => {
                let own = self.state.scopes.themes(data.scope);
                let name_themes = match self.state.names.get(&data.parent) {
                    Some(name) => self.state.scopes.themes(name.scope),
                    None => BTreeSet::new(),
                };
                let effective: BTreeSet<TopicId> = own.union(&name_themes).copied().collect();
                (data.parent, data.hash, variant_hash(&data.literal, &effective))
            }
            None => return Ok(()),
        };
        if old == new {
            return Ok(());
        }
        self.unindex_variant_hash(parent, old, id);
        if let Some(data) = self.state.variants.get_mut(&id) {
            data.hash = new;
        }
        self.index_variant_hash(parent, new, id);
        self.persist(ConstructRef::Variant(id))
    }

    /// Move `user` from `old` to the canonical scope for `themes`.
    /// Releases the old scope (collecting it when unreferenced) and returns
    /// the new scope id. The caller updates the construct's scope field.
    pub(crate) fn rescope(
        &mut self,
        user: ConstructRef,
        old: ScopeId,
        themes: &BTreeSet<TopicId>,
    ) -> Result<ScopeId, ModelError> {
        let new = self.state.scopes.resolve(themes);
        if new == old {
            return Ok(old);
        }
        self.state.scopes.attach(new, user);
        self.persist_scope(new)?;
        self.release_scope(old, user)?;
        Ok(new)
    }

    pub(crate) fn release_scope(
        &mut self,
        scope: ScopeId,
        user: ConstructRef,
    ) -> Result<(), ModelError> {
        if self.state.scopes.release(scope, user) {
            self.erase_scope(scope)?;
        }
        Ok(())
    }
}
