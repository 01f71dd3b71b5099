//! Scoped read-model: theme and exact-scope lookups.
//!
//! Variants are indexed by effective scope (own themes plus the parent
//! name's).

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AssociationId, NameId, OccurrenceId, TopicId, TopicMap, VariantId};

#[derive(Clone, Debug, Default)]
pub struct ScopedIndex {
    associations_by_theme: BTreeMap<TopicId, BTreeSet<AssociationId>>,
    names_by_theme: BTreeMap<TopicId, BTreeSet<NameId>>,
    occurrences_by_theme: BTreeMap<TopicId, BTreeSet<OccurrenceId>>,
    variants_by_theme: BTreeMap<TopicId, BTreeSet<VariantId>>,
    associations_by_scope: BTreeMap<Vec<TopicId>, BTreeSet<AssociationId>>,
    names_by_scope: BTreeMap<Vec<TopicId>, BTreeSet<NameId>>,
    occurrences_by_scope: BTreeMap<Vec<TopicId>, BTreeSet<OccurrenceId>>,
    variants_by_scope: BTreeMap<Vec<TopicId>, BTreeSet<VariantId>>,
}

fn scope_key(themes: &BTreeSet<TopicId>) -> Vec<TopicId> {
    themes.iter().copied().collect()
}

impl ScopedIndex {
    pub(crate) fn build(map: &TopicMap) -> Self {
        let mut index = Self::default();
        for association in map.associations() {
            let themes = map.scope_themes(association.scope());
            for theme in &themes {
                index
                    .associations_by_theme
                    .entry(*theme)
                    .or_default()
                    .insert(association.id());
            }
            index
                .associations_by_scope
                .entry(scope_key(&themes))
                .or_default()
                .insert(association.id());
        }
        for name in map.names() {
            let themes = map.scope_themes(name.scope());
            for theme in &themes {
                index
                    .names_by_theme
                    .entry(*theme)
                    .or_default()
                    .insert(name.id());
            }
            index
                .names_by_scope
                .entry(scope_key(&themes))
                .or_default()
                .insert(name.id());
        }
        for occurrence in map.occurrences() {
            let themes = map.scope_themes(occurrence.scope());
            for theme in &themes {
                index
                    .occurrences_by_theme
                    .entry(*theme)
                    .or_default()
                    .insert(occurrence.id());
            }
            index
                .occurrences_by_scope
                .entry(scope_key(&themes))
                .or_default()
                .insert(occurrence.id());
        }
        for variant in map.variants() {
            let effective = map
                .variant_effective_scope(variant.id())
                .unwrap_or_default();
            for theme in &effective {
                index
                    .variants_by_theme
                    .entry(*theme)
                    .or_default()
                    .insert(variant.id());
            }
            index
                .variants_by_scope
                .entry(scope_key(&effective))
                .or_default()
                .insert(variant.id());
        }
        index
    }

    pub fn associations_by_theme(&self, theme: TopicId) -> impl Iterator<Item = AssociationId> + '_ {
        self.associations_by_theme
            .get(&theme)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn names_by_theme(&self, theme: TopicId) -> impl Iterator<Item = NameId> + '_ {
        self.names_by_theme.get(&theme).into_iter().flatten().copied()
    }

    pub fn occurrences_by_theme(&self, theme: TopicId) -> impl Iterator<Item = OccurrenceId> + '_ {
        self.occurrences_by_theme
            .get(&theme)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn variants_by_theme(&self, theme: TopicId) -> impl Iterator<Item = VariantId> + '_ {
        self.variants_by_theme
            .get(&theme)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn associations_by_scope(
        &self,
        themes: &BTreeSet<TopicId>,
    ) -> impl Iterator<Item = AssociationId> + '_ {
        self.associations_by_scope
            .get(&scope_key(themes))
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn names_by_scope(&self, themes: &BTreeSet<TopicId>) -> impl Iterator<Item = NameId> + '_ {
        self.names_by_scope
            .get(&scope_key(themes))
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn occurrences_by_scope(
        &self,
        themes: &BTreeSet<TopicId>,
    ) -> impl Iterator<Item = OccurrenceId> + '_ {
        self.occurrences_by_scope
            .get(&scope_key(themes))
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn variants_by_scope(
        &self,
        themes: &BTreeSet<TopicId>,
    ) -> impl Iterator<Item = VariantId> + '_ {
        self.variants_by_scope
            .get(&scope_key(themes))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Distinct themes in use by association scopes.
    pub fn association_themes(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.associations_by_theme.keys().copied()
    }

    pub fn name_themes(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.names_by_theme.keys().copied()
    }

    pub fn occurrence_themes(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.occurrences_by_theme.keys().copied()
    }

    pub fn variant_themes(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.variants_by_theme.keys().copied()
    }
}
