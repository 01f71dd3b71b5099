//! Type-instance read-model.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AssociationId, NameId, OccurrenceId, RoleId, TopicId, TopicMap};

#[derive(Clone, Debug, Default)]
pub struct TypeInstanceIndex {
    topics: BTreeMap<TopicId, BTreeSet<TopicId>>,
    associations: BTreeMap<TopicId, BTreeSet<AssociationId>>,
    roles: BTreeMap<TopicId, BTreeSet<RoleId>>,
    names: BTreeMap<TopicId, BTreeSet<NameId>>,
    occurrences: BTreeMap<TopicId, BTreeSet<OccurrenceId>>,
    untyped_topics: BTreeSet<TopicId>,
}

impl TypeInstanceIndex {
    pub(crate) fn build(map: &TopicMap) -> Self {
        let mut index = Self::default();
        for topic in map.topics() {
            if topic.types().is_empty() {
                index.untyped_topics.insert(topic.id());
            }
            for ty in topic.types() {
                index.topics.entry(*ty).or_default().insert(topic.id());
            }
        }
        for association in map.associations() {
            index
                .associations
                .entry(association.association_type())
                .or_default()
                .insert(association.id());
        }
        for role in map.roles() {
            index.roles.entry(role.role_type()).or_default().insert(role.id());
        }
        for name in map.names() {
            index.names.entry(name.name_type()).or_default().insert(name.id());
        }
        for occurrence in map.occurrences() {
            index
                .occurrences
                .entry(occurrence.occurrence_type())
                .or_default()
                .insert(occurrence.id());
        }
        index
    }

    pub fn topics_of(&self, ty: TopicId) -> impl Iterator<Item = TopicId> + '_ {
        self.topics.get(&ty).into_iter().flatten().copied()
    }

    pub fn untyped_topics(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.untyped_topics.iter().copied()
    }

    pub fn associations_of(&self, ty: TopicId) -> impl Iterator<Item = AssociationId> + '_ {
        self.associations.get(&ty).into_iter().flatten().copied()
    }

    pub fn roles_of(&self, ty: TopicId) -> impl Iterator<Item = RoleId> + '_ {
        self.roles.get(&ty).into_iter().flatten().copied()
    }

    pub fn names_of(&self, ty: TopicId) -> impl Iterator<Item = NameId> + '_ {
        self.names.get(&ty).into_iter().flatten().copied()
    }

    pub fn occurrences_of(&self, ty: TopicId) -> impl Iterator<Item = OccurrenceId> + '_ {
        self.occurrences.get(&ty).into_iter().flatten().copied()
    }

    /// Distinct topic types in use.
    pub fn topic_types(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.topics.keys().copied()
    }

    pub fn association_types(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.associations.keys().copied()
    }

    pub fn role_types(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.roles.keys().copied()
    }

    pub fn name_types(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.names.keys().copied()
    }

    pub fn occurrence_types(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.occurrences.keys().copied()
    }
}
