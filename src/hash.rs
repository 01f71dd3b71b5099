//! Layer 1: Content hashing
//!
//! Deterministic fingerprints over the semantically significant fields of a
//! construct, used to avoid creating duplicates and to detect duplicates
//! created by mutation. Theme and role identifiers are sorted before
//! encoding, so a hash is independent of insertion order. Fields are
//! length-prefixed and every construct kind gets its own domain tag, so
//! hashes of different kinds never collide structurally. Collisions across
//! distinct semantic tuples are treated as impossible (SHA-256).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{Literal, TopicId};

/// 256-bit content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContentHash({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Field-by-field hasher with domain separation and length prefixing.
struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    fn new(domain: &'static str) -> Self {
        let mut inner = Sha256::new();
        inner.update(b"mappa:");
        inner.update(domain.as_bytes());
        inner.update(b":v1");
        Self { inner }
    }

    fn str(&mut self, s: &str) {
        self.inner.update((s.len() as u64).to_le_bytes());
        self.inner.update(s.as_bytes());
    }

    fn literal(&mut self, literal: &Literal) {
        self.str(literal.value());
        self.str(literal.datatype().as_str());
    }

    fn topic(&mut self, id: TopicId) {
        // Fixed width: map uuid then per-map sequence number.
        self.inner.update(id.map.as_bytes());
        self.inner.update(id.n.to_le_bytes());
    }

    fn themes(&mut self, themes: &BTreeSet<TopicId>) {
        self.inner.update((themes.len() as u64).to_le_bytes());
        for theme in themes {
            self.topic(*theme);
        }
    }

    fn finish(self) -> ContentHash {
        ContentHash(self.inner.finalize().into())
    }
}

pub(crate) fn name_hash(ty: TopicId, value: &str, themes: &BTreeSet<TopicId>) -> ContentHash {
    let mut hasher = FieldHasher::new("name");
    hasher.topic(ty);
    hasher.str(value);
    hasher.themes(themes);
    hasher.finish()
}

pub(crate) fn occurrence_hash(
    ty: TopicId,
    literal: &Literal,
    themes: &BTreeSet<TopicId>,
) -> ContentHash {
    let mut hasher = FieldHasher::new("occurrence");
    hasher.topic(ty);
    hasher.literal(literal);
    hasher.themes(themes);
    hasher.finish()
}

pub(crate) fn association_hash(
    ty: TopicId,
    themes: &BTreeSet<TopicId>,
    roles: &[(TopicId, TopicId)],
) -> ContentHash {
    let mut sorted: Vec<(TopicId, TopicId)> = roles.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut hasher = FieldHasher::new("association");
    hasher.topic(ty);
    hasher.themes(themes);
    hasher.inner.update((sorted.len() as u64).to_le_bytes());
    for (role_type, player) in &sorted {
        hasher.topic(*role_type);
        hasher.topic(*player);
    }
    hasher.finish()
}

pub(crate) fn variant_hash(literal: &Literal, effective_scope: &BTreeSet<TopicId>) -> ContentHash {
    let mut hasher = FieldHasher::new("variant");
    hasher.literal(literal);
    hasher.themes(effective_scope);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopicMapId;

    fn topic(n: u64) -> TopicId {
        TopicId::new(TopicMapId::nil(), n)
    }

    #[test]
    fn name_hash_is_theme_order_independent() {
        let themes_a: BTreeSet<_> = [topic(3), topic(1), topic(2)].into_iter().collect();
        let themes_b: BTreeSet<_> = [topic(1), topic(2), topic(3)].into_iter().collect();
        assert_eq!(
            name_hash(topic(9), "Norway", &themes_a),
            name_hash(topic(9), "Norway", &themes_b)
        );
    }

    #[test]
    fn association_hash_is_role_order_independent() {
        let themes = BTreeSet::new();
        let roles_a = [(topic(1), topic(10)), (topic(2), topic(20))];
        let roles_b = [(topic(2), topic(20)), (topic(1), topic(10))];
        assert_eq!(
            association_hash(topic(5), &themes, &roles_a),
            association_hash(topic(5), &themes, &roles_b)
        );
    }

    #[test]
    fn distinct_tuples_hash_differently() {
        let themes = BTreeSet::new();
        let a = name_hash(topic(1), "x", &themes);
        let b = name_hash(topic(1), "y", &themes);
        let c = name_hash(topic(2), "x", &themes);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn kinds_are_domain_separated() {
        let themes = BTreeSet::new();
        let literal = Literal::string("x");
        let occ = occurrence_hash(topic(1), &literal, &themes);
        let var = variant_hash(&literal, &themes);
        assert_ne!(occ.as_bytes(), var.as_bytes());
    }

    #[test]
    fn value_boundaries_do_not_alias() {
        // Length prefixing keeps ("ab", "c") distinct from ("a", "bc").
        let themes = BTreeSet::new();
        let a = occurrence_hash(
            topic(1),
            &Literal::new("ab", crate::locator::Locator::new("dt:c").unwrap()),
            &themes,
        );
        let b = occurrence_hash(
            topic(1),
            &Literal::new("a", crate::locator::Locator::new("dt:bc").unwrap()),
            &themes,
        );
        assert_ne!(a, b);
    }
}
