//! Occurrence records and operations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::hash::{occurrence_hash, ContentHash};
use crate::locator::Locator;
use crate::model::map::TopicMap;
use crate::model::{ConstructRef, Literal, OccurrenceDraft, OccurrenceId, TopicId};
use crate::scope::ScopeId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceData {
    pub(crate) id: OccurrenceId,
    pub(crate) parent: TopicId,
    pub(crate) ty: TopicId,
    pub(crate) literal: Literal,
    pub(crate) scope: ScopeId,
    pub(crate) iids: BTreeSet<Locator>,
    pub(crate) reifier: Option<TopicId>,
    pub(crate) hash: ContentHash,
}

impl OccurrenceData {
    pub fn id(&self) -> OccurrenceId {
        self.id
    }

    pub fn parent(&self) -> TopicId {
        self.parent
    }

    pub fn occurrence_type(&self) -> TopicId {
        self.ty
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    pub fn value(&self) -> &str {
        self.literal.value()
    }

    pub fn datatype(&self) -> &Locator {
        self.literal.datatype()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.iids
    }

    pub fn reifier(&self) -> Option<TopicId> {
        self.reifier
    }
}

impl TopicMap {
    /// Create-or-get an occurrence on `parent`. Idempotent: an existing
    /// sibling with the same content hash is returned instead.
    pub fn create_occurrence(
        &mut self,
        parent: TopicId,
        draft: OccurrenceDraft,
    ) -> Result<OccurrenceId, ModelError> {
        self.txn(|map| {
            let subject = ConstructRef::Topic(parent);
            map.check_topic_arg(subject, parent)?;
            map.check_topic_arg(subject, draft.ty)?;
            map.check_theme_args(subject, &draft.themes)?;

            let themes: BTreeSet<TopicId> = draft.themes.iter().copied().collect();
            let hash = occurrence_hash(draft.ty, &draft.literal, &themes);
            if let Some(existing) = map.sibling_occurrence(parent, hash, None) {
                return Ok(existing);
            }

            let id = OccurrenceId::new(map.id, map.alloc());
            let user = ConstructRef::Occurrence(id);
            let scope = map.state.scopes.resolve(&themes);
            map.state.scopes.attach(scope, user);
            map.persist_scope(scope)?;

            map.state.occurrences.insert(
                id,
                OccurrenceData {
                    id,
                    parent,
                    ty: draft.ty,
                    literal: draft.literal,
                    scope,
                    iids: BTreeSet::new(),
                    reifier: None,
                    hash,
                },
            );
            map.index_occurrence_hash(parent, hash, id);
            map.index_typed(draft.ty, user);
            if let Some(topic) = map.state.topics.get_mut(&parent) {
                topic.occurrences.insert(id);
            }
            map.persist(user)?;
            map.persist(subject)?;
            Ok(id)
        })
    }

    /// Replace the occurrence's literal value and datatype.
    pub fn set_occurrence_value(
        &mut self,
        occurrence: OccurrenceId,
        literal: Literal,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.occurrence(occurrence)?;
            if let Some(data) = map.state.occurrences.get_mut(&occurrence) {
                data.literal = literal;
            }
            map.rehash_occurrence(occurrence)?;
            map.finalize_auto(ConstructRef::Occurrence(occurrence))
        })
    }

    pub fn set_occurrence_type(
        &mut self,
        occurrence: OccurrenceId,
        ty: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let old = map.occurrence(occurrence)?.ty;
            map.check_topic_arg(ConstructRef::Occurrence(occurrence), ty)?;
            if old == ty {
                return Ok(());
            }
            let user = ConstructRef::Occurrence(occurrence);
            map.unindex_typed(old, user);
            map.index_typed(ty, user);
            if let Some(data) = map.state.occurrences.get_mut(&occurrence) {
                data.ty = ty;
            }
            map.rehash_occurrence(occurrence)?;
            map.finalize_auto(user)
        })
    }

    pub fn add_occurrence_theme(
        &mut self,
        occurrence: OccurrenceId,
        theme: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Occurrence(occurrence);
            let scope = map.occurrence(occurrence)?.scope;
            map.check_topic_arg(user, theme)?;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.insert(theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.occurrences.get_mut(&occurrence) {
                data.scope = new_scope;
            }
            map.rehash_occurrence(occurrence)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_occurrence_theme(
        &mut self,
        occurrence: OccurrenceId,
        theme: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Occurrence(occurrence);
            let scope = map.occurrence(occurrence)?.scope;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.remove(&theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.occurrences.get_mut(&occurrence) {
                data.scope = new_scope;
            }
            map.rehash_occurrence(occurrence)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_occurrence(&mut self, occurrence: OccurrenceId) -> Result<(), ModelError> {
        self.txn(|map| {
            map.occurrence(occurrence)?;
            map.remove_occurrence_internal(occurrence)
        })
    }

    pub(crate) fn remove_occurrence_internal(
        &mut self,
        occurrence: OccurrenceId,
    ) -> Result<(), ModelError> {
        let Some(data) = self.state.occurrences.remove(&occurrence) else {
            return Ok(());
        };
        let user = ConstructRef::Occurrence(occurrence);
        self.unindex_occurrence_hash(data.parent, data.hash, occurrence);
        self.unindex_typed(data.ty, user);
        for loc in &data.iids {
            self.state.identity.unbind_item(loc);
        }
        if let Some(reifier) = data.reifier {
            self.state.identity.unbind_reified(reifier);
        }
        self.release_scope(data.scope, user)?;
        if let Some(topic) = self.state.topics.get_mut(&data.parent) {
            topic.occurrences.remove(&occurrence);
        }
        self.erase(user)?;
        if self.state.topics.contains_key(&data.parent) {
            self.persist(ConstructRef::Topic(data.parent))?;
        }
        Ok(())
    }
}
