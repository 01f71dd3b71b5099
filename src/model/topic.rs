//! Topic records.
//!
//! A topic's identity is the union of its item identifiers, subject
//! identifiers and subject locators. Names and occurrences are owned
//! children; `types` is a non-owning set of topic ids.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::locator::Locator;
use crate::model::{NameId, OccurrenceId, TopicId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicData {
    pub(crate) id: TopicId,
    pub(crate) iids: BTreeSet<Locator>,
    pub(crate) sids: BTreeSet<Locator>,
    pub(crate) slos: BTreeSet<Locator>,
    pub(crate) types: BTreeSet<TopicId>,
    pub(crate) names: BTreeSet<NameId>,
    pub(crate) occurrences: BTreeSet<OccurrenceId>,
}

impl TopicData {
    pub(crate) fn new(id: TopicId) -> Self {
        Self {
            id,
            iids: BTreeSet::new(),
            sids: BTreeSet::new(),
            slos: BTreeSet::new(),
            types: BTreeSet::new(),
            names: BTreeSet::new(),
            occurrences: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.iids
    }

    pub fn subject_identifiers(&self) -> &BTreeSet<Locator> {
        &self.sids
    }

    pub fn subject_locators(&self) -> &BTreeSet<Locator> {
        &self.slos
    }

    pub fn types(&self) -> &BTreeSet<TopicId> {
        &self.types
    }

    pub fn names(&self) -> &BTreeSet<NameId> {
        &self.names
    }

    pub fn occurrences(&self) -> &BTreeSet<OccurrenceId> {
        &self.occurrences
    }

    /// All identity locators, across the three identity kinds.
    pub fn identity_locators(&self) -> impl Iterator<Item = &Locator> {
        self.iids.iter().chain(self.sids.iter()).chain(self.slos.iter())
    }
}
