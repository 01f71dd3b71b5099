//! Layer 4: Identity index
//!
//! Per-map registry of item identifiers, subject identifiers, subject
//! locators and reification links. This is the authority for "do these two
//! locators denote the same topic/construct". All writes go through the
//! construct store and the merge engine; [`IdentityIndex::decide`] is the
//! single chokepoint for collision handling.

use std::collections::BTreeMap;

use crate::error::IdentityConflict;
use crate::locator::Locator;
use crate::model::{ConstructRef, TopicId};

/// The three identity locator kinds a topic can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IdentityKind {
    Item,
    Subject,
    SubjectLocator,
}

/// Outcome of the collision decision for a topic identity bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IdentityDecision {
    /// No owner: bind the locator.
    Bind,
    /// The same topic already owns this binding; nothing to do.
    AlreadyBound,
    /// A different topic owns the locator (directly or via the item/subject
    /// cross rule): the two denote the same subject and must merge.
    MergeWith(TopicId),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct IdentityIndex {
    items: BTreeMap<Locator, ConstructRef>,
    subjects: BTreeMap<Locator, TopicId>,
    locators: BTreeMap<Locator, TopicId>,
    reified: BTreeMap<TopicId, ConstructRef>,
}

impl IdentityIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn item(&self, loc: &Locator) -> Option<ConstructRef> {
        self.items.get(loc).copied()
    }

    pub(crate) fn subject(&self, loc: &Locator) -> Option<TopicId> {
        self.subjects.get(loc).copied()
    }

    pub(crate) fn subject_locator(&self, loc: &Locator) -> Option<TopicId> {
        self.locators.get(loc).copied()
    }

    pub(crate) fn reified(&self, reifier: TopicId) -> Option<ConstructRef> {
        self.reified.get(&reifier).copied()
    }

    /// Collision handling for binding `loc` as a topic identity.
    ///
    /// Non-topic owners are a hard conflict; topic owners signal a merge
    /// request. Whether that request becomes a merge or an
    /// [`IdentityConflict`] is the caller's call (the `automerge` feature).
    pub(crate) fn decide(
        &self,
        topic: TopicId,
        loc: &Locator,
        kind: IdentityKind,
    ) -> Result<IdentityDecision, IdentityConflict> {
        match kind {
            IdentityKind::Item => {
                if let Some(owner) = self.items.get(loc) {
                    return match owner {
                        ConstructRef::Topic(other) if *other == topic => {
                            Ok(IdentityDecision::AlreadyBound)
                        }
                        ConstructRef::Topic(other) => Ok(IdentityDecision::MergeWith(*other)),
                        _ => Err(IdentityConflict {
                            existing: *owner,
                            acting: ConstructRef::Topic(topic),
                            locator: loc.clone(),
                        }),
                    };
                }
                // Cross rule: an item identifier matching another topic's
                // subject identifier denotes the same subject.
                match self.subjects.get(loc) {
                    Some(other) if *other == topic => Ok(IdentityDecision::Bind),
                    Some(other) => Ok(IdentityDecision::MergeWith(*other)),
                    None => Ok(IdentityDecision::Bind),
                }
            }
            IdentityKind::Subject => {
                if let Some(other) = self.subjects.get(loc) {
                    return if *other == topic {
                        Ok(IdentityDecision::AlreadyBound)
                    } else {
                        Ok(IdentityDecision::MergeWith(*other))
                    };
                }
                // Cross rule applies only against topic item identifiers; a
                // non-topic construct sharing the locator is unrelated.
                match self.items.get(loc) {
                    Some(ConstructRef::Topic(other)) if *other == topic => {
                        Ok(IdentityDecision::Bind)
                    }
                    Some(ConstructRef::Topic(other)) => Ok(IdentityDecision::MergeWith(*other)),
                    _ => Ok(IdentityDecision::Bind),
                }
            }
            IdentityKind::SubjectLocator => match self.locators.get(loc) {
                Some(other) if *other == topic => Ok(IdentityDecision::AlreadyBound),
                Some(other) => Ok(IdentityDecision::MergeWith(*other)),
                None => Ok(IdentityDecision::Bind),
            },
        }
    }

    /// Item-identifier bind for non-topic constructs: same-locator owners
    /// can never merge, so any existing owner is a conflict.
    pub(crate) fn check_item_free(
        &self,
        acting: ConstructRef,
        loc: &Locator,
    ) -> Result<(), IdentityConflict> {
        match self.items.get(loc) {
            None => Ok(()),
            Some(owner) if *owner == acting => Ok(()),
            Some(owner) => Err(IdentityConflict {
                existing: *owner,
                acting,
                locator: loc.clone(),
            }),
        }
    }

    pub(crate) fn bind_item(&mut self, loc: Locator, owner: ConstructRef) {
        self.items.insert(loc, owner);
    }

    pub(crate) fn unbind_item(&mut self, loc: &Locator) {
        self.items.remove(loc);
    }

    pub(crate) fn bind_subject(&mut self, loc: Locator, topic: TopicId) {
        self.subjects.insert(loc, topic);
    }

    pub(crate) fn unbind_subject(&mut self, loc: &Locator) {
        self.subjects.remove(loc);
    }

    pub(crate) fn bind_subject_locator(&mut self, loc: Locator, topic: TopicId) {
        self.locators.insert(loc, topic);
    }

    pub(crate) fn unbind_subject_locator(&mut self, loc: &Locator) {
        self.locators.remove(loc);
    }

    pub(crate) fn bind_reified(&mut self, reifier: TopicId, target: ConstructRef) {
        self.reified.insert(reifier, target);
    }

    pub(crate) fn unbind_reified(&mut self, reifier: TopicId) {
        self.reified.remove(&reifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NameId, TopicMapId};

    fn topic(n: u64) -> TopicId {
        TopicId::new(TopicMapId::nil(), n)
    }

    fn loc(s: &str) -> Locator {
        Locator::new(s).unwrap()
    }

    #[test]
    fn fresh_locator_binds() {
        let index = IdentityIndex::new();
        let decision = index
            .decide(topic(1), &loc("sid:A"), IdentityKind::Subject)
            .unwrap();
        assert_eq!(decision, IdentityDecision::Bind);
    }

    #[test]
    fn same_topic_rebind_is_noop() {
        let mut index = IdentityIndex::new();
        index.bind_subject(loc("sid:A"), topic(1));
        let decision = index
            .decide(topic(1), &loc("sid:A"), IdentityKind::Subject)
            .unwrap();
        assert_eq!(decision, IdentityDecision::AlreadyBound);
    }

    #[test]
    fn cross_rule_signals_merge_for_item_vs_subject() {
        let mut index = IdentityIndex::new();
        index.bind_subject(loc("sid:A"), topic(1));
        let decision = index
            .decide(topic(2), &loc("sid:A"), IdentityKind::Item)
            .unwrap();
        assert_eq!(decision, IdentityDecision::MergeWith(topic(1)));
    }

    #[test]
    fn non_topic_owner_is_a_hard_conflict() {
        let mut index = IdentityIndex::new();
        let name = ConstructRef::Name(NameId::new(TopicMapId::nil(), 9));
        index.bind_item(loc("iid:X"), name);

        let err = index
            .decide(topic(1), &loc("iid:X"), IdentityKind::Item)
            .unwrap_err();
        assert_eq!(err.existing, name);
        assert_eq!(err.locator, loc("iid:X"));
    }

    #[test]
    fn subject_locators_only_collide_with_subject_locators() {
        let mut index = IdentityIndex::new();
        index.bind_subject(loc("x:1"), topic(1));
        let decision = index
            .decide(topic(2), &loc("x:1"), IdentityKind::SubjectLocator)
            .unwrap();
        assert_eq!(decision, IdentityDecision::Bind);
    }
}
