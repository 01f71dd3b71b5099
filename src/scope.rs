//! Layer 2: Scope registry
//!
//! Canonicalizes theme sets into interned scopes. The empty set is the
//! single unconstrained scope (UCS) per topic map; it is never collected.
//! Every other scope lives only while at least one construct references it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ConstructRef, TopicId};

/// Interned scope handle, meaningful only within its topic map.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub(crate) u64);

impl ScopeId {
    /// The unconstrained scope (empty theme set).
    pub const UNCONSTRAINED: ScopeId = ScopeId(0);

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::UNCONSTRAINED
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            f.write_str("ucs")
        } else {
            write!(f, "scope#{}", self.0)
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ScopeData {
    themes: BTreeSet<TopicId>,
    users: BTreeSet<ConstructRef>,
}

impl ScopeData {
    pub(crate) fn themes(&self) -> &BTreeSet<TopicId> {
        &self.themes
    }

    pub(crate) fn users(&self) -> &BTreeSet<ConstructRef> {
        &self.users
    }
}

/// Per-map scope interner with user tracking and garbage collection.
#[derive(Clone, Debug)]
pub(crate) struct ScopeRegistry {
    next: u64,
    by_id: BTreeMap<ScopeId, ScopeData>,
    by_themes: BTreeMap<Vec<TopicId>, ScopeId>,
}

impl ScopeRegistry {
    pub(crate) fn new() -> Self {
        let mut by_id = BTreeMap::new();
        by_id.insert(
            ScopeId::UNCONSTRAINED,
            ScopeData {
                themes: BTreeSet::new(),
                users: BTreeSet::new(),
            },
        );
        let mut by_themes = BTreeMap::new();
        by_themes.insert(Vec::new(), ScopeId::UNCONSTRAINED);
        Self {
            next: 1,
            by_id,
            by_themes,
        }
    }

    /// Canonical scope for a theme set; interns a new one if absent.
    pub(crate) fn resolve(&mut self, themes: &BTreeSet<TopicId>) -> ScopeId {
        let key: Vec<TopicId> = themes.iter().copied().collect();
        if let Some(id) = self.by_themes.get(&key) {
            return *id;
        }
        let id = ScopeId(self.next);
        self.next += 1;
        self.by_id.insert(
            id,
            ScopeData {
                themes: themes.clone(),
                users: BTreeSet::new(),
            },
        );
        self.by_themes.insert(key, id);
        id
    }

    pub(crate) fn attach(&mut self, scope: ScopeId, user: ConstructRef) {
        if let Some(data) = self.by_id.get_mut(&scope) {
            data.users.insert(user);
        }
    }

    /// Detaches `user`; collects the scope when it was the last user and the
    /// scope is not the UCS. Returns whether the scope was deleted.
    pub(crate) fn release(&mut self, scope: ScopeId, user: ConstructRef) -> bool {
        let empty = match self.by_id.get_mut(&scope) {
            Some(data) => {
                data.users.remove(&user);
                data.users.is_empty()
            }
            None => return false,
        };
        if empty && !scope.is_unconstrained() {
            if let Some(data) = self.by_id.remove(&scope) {
                let key: Vec<TopicId> = data.themes.iter().copied().collect();
                self.by_themes.remove(&key);
            }
            return true;
        }
        false
    }

    pub(crate) fn get(&self, scope: ScopeId) -> Option<&ScopeData> {
        self.by_id.get(&scope)
    }

    pub(crate) fn themes(&self, scope: ScopeId) -> BTreeSet<TopicId> {
        self.by_id
            .get(&scope)
            .map(|data| data.themes.clone())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, scope: ScopeId) -> bool {
        self.by_id.contains_key(&scope)
    }

    pub(crate) fn scopes_with_theme(&self, theme: TopicId) -> Vec<ScopeId> {
        self.by_id
            .iter()
            .filter(|(_, data)| data.themes.contains(&theme))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether any live scope uses `theme` (topic-removal guard).
    pub(crate) fn uses_theme(&self, theme: TopicId) -> bool {
        self.by_id.values().any(|data| data.themes.contains(&theme))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ScopeId, &ScopeData)> {
        self.by_id.iter().map(|(id, data)| (*id, data))
    }

    /// Strict superset: every base theme present, plus at least one more.
    pub(crate) fn is_strict_superset(
        candidate: &BTreeSet<TopicId>,
        base: &BTreeSet<TopicId>,
    ) -> bool {
        candidate.len() > base.len() && base.is_subset(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TopicMapId, VariantId};

    fn topic(n: u64) -> TopicId {
        TopicId::new(TopicMapId::nil(), n)
    }

    fn user(n: u64) -> ConstructRef {
        ConstructRef::Variant(VariantId::new(TopicMapId::nil(), n))
    }

    #[test]
    fn resolve_is_order_independent_and_interned() {
        let mut reg = ScopeRegistry::new();
        let a: BTreeSet<_> = [topic(1), topic(2)].into_iter().collect();
        let b: BTreeSet<_> = [topic(2), topic(1)].into_iter().collect();
        assert_eq!(reg.resolve(&a), reg.resolve(&b));
    }

    #[test]
    fn empty_set_resolves_to_ucs() {
        let mut reg = ScopeRegistry::new();
        assert_eq!(reg.resolve(&BTreeSet::new()), ScopeId::UNCONSTRAINED);
    }

    #[test]
    fn last_release_collects_non_ucs_scope() {
        let mut reg = ScopeRegistry::new();
        let themes: BTreeSet<_> = [topic(1)].into_iter().collect();
        let scope = reg.resolve(&themes);
        reg.attach(scope, user(1));
        reg.attach(scope, user(2));

        assert!(!reg.release(scope, user(1)));
        assert!(reg.contains(scope));
        assert!(reg.release(scope, user(2)));
        assert!(!reg.contains(scope));
        // A fresh resolve re-interns under a new id.
        let again = reg.resolve(&themes);
        assert_ne!(again, scope);
    }

    #[test]
    fn ucs_survives_release() {
        let mut reg = ScopeRegistry::new();
        reg.attach(ScopeId::UNCONSTRAINED, user(1));
        assert!(!reg.release(ScopeId::UNCONSTRAINED, user(1)));
        assert!(reg.contains(ScopeId::UNCONSTRAINED));
    }

    #[test]
    fn strict_superset_requires_extra_theme() {
        let base: BTreeSet<_> = [topic(1)].into_iter().collect();
        let equal = base.clone();
        let bigger: BTreeSet<_> = [topic(1), topic(2)].into_iter().collect();
        let disjoint: BTreeSet<_> = [topic(2), topic(3)].into_iter().collect();
        assert!(ScopeRegistry::is_strict_superset(&bigger, &base));
        assert!(!ScopeRegistry::is_strict_superset(&equal, &base));
        assert!(!ScopeRegistry::is_strict_superset(&disjoint, &base));
    }
}
