//! Literal read-model: exact-value lookups.

use std::collections::{BTreeMap, BTreeSet};

use crate::locator::Locator;
use crate::model::{NameId, OccurrenceId, TopicMap, VariantId};

#[derive(Clone, Debug, Default)]
pub struct LiteralIndex {
    names: BTreeMap<String, BTreeSet<NameId>>,
    occurrences: BTreeMap<(String, Locator), BTreeSet<OccurrenceId>>,
    variants: BTreeMap<(String, Locator), BTreeSet<VariantId>>,
}

impl LiteralIndex {
    pub(crate) fn build(map: &TopicMap) -> Self {
        let mut index = Self::default();
        for name in map.names() {
            index
                .names
                .entry(name.value().to_string())
                .or_default()
                .insert(name.id());
        }
        for occurrence in map.occurrences() {
            let key = (
                occurrence.value().to_string(),
                occurrence.datatype().clone(),
            );
            index.occurrences.entry(key).or_default().insert(occurrence.id());
        }
        for variant in map.variants() {
            let key = (variant.value().to_string(), variant.datatype().clone());
            index.variants.entry(key).or_default().insert(variant.id());
        }
        index
    }

    pub fn names_by_value(&self, value: &str) -> impl Iterator<Item = NameId> + '_ {
        self.names.get(value).into_iter().flatten().copied()
    }

    pub fn occurrences_by_literal(
        &self,
        value: &str,
        datatype: &Locator,
    ) -> impl Iterator<Item = OccurrenceId> + '_ {
        self.occurrences
            .get(&(value.to_string(), datatype.clone()))
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn variants_by_literal(
        &self,
        value: &str,
        datatype: &Locator,
    ) -> impl Iterator<Item = VariantId> + '_ {
        self.variants
            .get(&(value.to_string(), datatype.clone()))
            .into_iter()
            .flatten()
            .copied()
    }
}
