//! Layer 3: Construct identity atoms and shared model types
//!
//! Module hierarchy follows type dependency order:
//! - ids and refs (this module)
//! - topic: TopicData
//! - name: NameData, VariantData
//! - occurrence: OccurrenceData
//! - association: AssociationData, RoleData
//! - map: TopicMap, the construct store

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::locator::Locator;

pub mod association;
pub mod map;
pub mod name;
pub mod occurrence;
pub mod topic;

pub use association::{AssociationData, RoleData};
pub use map::TopicMap;
pub use name::{NameData, VariantData};
pub use occurrence::OccurrenceData;
pub use topic::TopicData;

/// System-wide topic map identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicMapId(Uuid);

impl TopicMapId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for TopicMapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicMapId({})", self.0)
    }
}

impl fmt::Display for TopicMapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Construct ids are opaque, unique within a topic map, and stable until
/// removal. Each id carries its owning map so cross-map arguments are
/// detectable instead of silently resolving to an unrelated construct.
macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name {
            pub(crate) map: TopicMapId,
            pub(crate) n: u64,
        }

        impl $name {
            pub(crate) fn new(map: TopicMapId, n: u64) -> Self {
                Self { map, n }
            }

            /// The topic map this id belongs to.
            pub fn topic_map(&self) -> TopicMapId {
                self.map
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({}@{})"), self.n, self.map)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "#{}"), self.n)
            }
        }
    };
}

define_id!(
    /// Topic identifier.
    TopicId,
    "topic"
);
define_id!(
    /// Association identifier.
    AssociationId,
    "association"
);
define_id!(
    /// Association role identifier.
    RoleId,
    "role"
);
define_id!(
    /// Topic name identifier.
    NameId,
    "name"
);
define_id!(
    /// Occurrence identifier.
    OccurrenceId,
    "occurrence"
);
define_id!(
    /// Name variant identifier.
    VariantId,
    "variant"
);

/// Closed set of construct kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    TopicMap,
    Topic,
    Association,
    Role,
    Name,
    Occurrence,
    Variant,
}

impl ConstructKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstructKind::TopicMap => "topic map",
            ConstructKind::Topic => "topic",
            ConstructKind::Association => "association",
            ConstructKind::Role => "role",
            ConstructKind::Name => "name",
            ConstructKind::Occurrence => "occurrence",
            ConstructKind::Variant => "variant",
        }
    }
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-owning handle to any construct.
///
/// Refs are plain ids into the construct store; resolution through
/// [`TopicMap`] returns an error for stale handles rather than dangling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructRef {
    TopicMap(TopicMapId),
    Topic(TopicId),
    Association(AssociationId),
    Role(RoleId),
    Name(NameId),
    Occurrence(OccurrenceId),
    Variant(VariantId),
}

impl ConstructRef {
    pub fn kind(&self) -> ConstructKind {
        match self {
            ConstructRef::TopicMap(_) => ConstructKind::TopicMap,
            ConstructRef::Topic(_) => ConstructKind::Topic,
            ConstructRef::Association(_) => ConstructKind::Association,
            ConstructRef::Role(_) => ConstructKind::Role,
            ConstructRef::Name(_) => ConstructKind::Name,
            ConstructRef::Occurrence(_) => ConstructKind::Occurrence,
            ConstructRef::Variant(_) => ConstructKind::Variant,
        }
    }

    pub fn topic_map(&self) -> TopicMapId {
        match self {
            ConstructRef::TopicMap(map) => *map,
            ConstructRef::Topic(id) => id.map,
            ConstructRef::Association(id) => id.map,
            ConstructRef::Role(id) => id.map,
            ConstructRef::Name(id) => id.map,
            ConstructRef::Occurrence(id) => id.map,
            ConstructRef::Variant(id) => id.map,
        }
    }
}

impl fmt::Display for ConstructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructRef::TopicMap(map) => write!(f, "topic map {map}"),
            ConstructRef::Topic(id) => write!(f, "{id}"),
            ConstructRef::Association(id) => write!(f, "{id}"),
            ConstructRef::Role(id) => write!(f, "{id}"),
            ConstructRef::Name(id) => write!(f, "{id}"),
            ConstructRef::Occurrence(id) => write!(f, "{id}"),
            ConstructRef::Variant(id) => write!(f, "{id}"),
        }
    }
}

impl From<TopicId> for ConstructRef {
    fn from(id: TopicId) -> Self {
        ConstructRef::Topic(id)
    }
}

impl From<AssociationId> for ConstructRef {
    fn from(id: AssociationId) -> Self {
        ConstructRef::Association(id)
    }
}

impl From<RoleId> for ConstructRef {
    fn from(id: RoleId) -> Self {
        ConstructRef::Role(id)
    }
}

impl From<NameId> for ConstructRef {
    fn from(id: NameId) -> Self {
        ConstructRef::Name(id)
    }
}

impl From<OccurrenceId> for ConstructRef {
    fn from(id: OccurrenceId) -> Self {
        ConstructRef::Occurrence(id)
    }
}

impl From<VariantId> for ConstructRef {
    fn from(id: VariantId) -> Self {
        ConstructRef::Variant(id)
    }
}

/// Typed literal value for occurrences and variants.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub(crate) value: String,
    pub(crate) datatype: Locator,
}

impl Literal {
    pub fn new(value: impl Into<String>, datatype: Locator) -> Self {
        Self {
            value: value.into(),
            datatype,
        }
    }

    /// An `xsd:string` literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value, Locator::xsd_string())
    }

    /// An `xsd:anyURI` literal holding a locator.
    pub fn iri(value: Locator) -> Self {
        Self {
            value: value.as_str().to_string(),
            datatype: Locator::xsd_any_uri(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn datatype(&self) -> &Locator {
        &self.datatype
    }
}

/// Request payload for creating a name.
///
/// Drafts replace the loosely-typed pending-property staging of older
/// engines: everything a child construct needs travels in the create call.
#[derive(Clone, Debug)]
pub struct NameDraft {
    pub(crate) value: String,
    pub(crate) ty: Option<TopicId>,
    pub(crate) themes: Vec<TopicId>,
}

impl NameDraft {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ty: None,
            themes: Vec::new(),
        }
    }

    /// Name type; defaults to the TMDM `topic-name` subject when absent.
    pub fn with_type(mut self, ty: TopicId) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_theme(mut self, theme: TopicId) -> Self {
        self.themes.push(theme);
        self
    }

    pub fn with_themes(mut self, themes: impl IntoIterator<Item = TopicId>) -> Self {
        self.themes.extend(themes);
        self
    }
}

/// Request payload for creating an occurrence.
#[derive(Clone, Debug)]
pub struct OccurrenceDraft {
    pub(crate) ty: TopicId,
    pub(crate) literal: Literal,
    pub(crate) themes: Vec<TopicId>,
}

impl OccurrenceDraft {
    pub fn new(ty: TopicId, literal: Literal) -> Self {
        Self {
            ty,
            literal,
            themes: Vec::new(),
        }
    }

    pub fn with_theme(mut self, theme: TopicId) -> Self {
        self.themes.push(theme);
        self
    }

    pub fn with_themes(mut self, themes: impl IntoIterator<Item = TopicId>) -> Self {
        self.themes.extend(themes);
        self
    }
}

/// Request payload for creating a variant. `themes` are the variant's own
/// themes; the effective scope additionally inherits the parent name's.
#[derive(Clone, Debug)]
pub struct VariantDraft {
    pub(crate) literal: Literal,
    pub(crate) themes: Vec<TopicId>,
}

impl VariantDraft {
    pub fn new(literal: Literal) -> Self {
        Self {
            literal,
            themes: Vec::new(),
        }
    }

    pub fn with_theme(mut self, theme: TopicId) -> Self {
        self.themes.push(theme);
        self
    }

    pub fn with_themes(mut self, themes: impl IntoIterator<Item = TopicId>) -> Self {
        self.themes.extend(themes);
        self
    }
}

/// Request payload for creating an association with its roles.
#[derive(Clone, Debug)]
pub struct AssociationDraft {
    pub(crate) ty: TopicId,
    pub(crate) themes: Vec<TopicId>,
    pub(crate) roles: Vec<RoleDraft>,
}

#[derive(Clone, Debug)]
pub struct RoleDraft {
    pub(crate) ty: TopicId,
    pub(crate) player: TopicId,
}

impl AssociationDraft {
    pub fn new(ty: TopicId) -> Self {
        Self {
            ty,
            themes: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_theme(mut self, theme: TopicId) -> Self {
        self.themes.push(theme);
        self
    }

    pub fn with_themes(mut self, themes: impl IntoIterator<Item = TopicId>) -> Self {
        self.themes.extend(themes);
        self
    }

    pub fn with_role(mut self, ty: TopicId, player: TopicId) -> Self {
        self.roles.push(RoleDraft { ty, player });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_kind_and_sequence() {
        let map = TopicMapId::nil();
        let topic = TopicId::new(map, 7);
        assert_eq!(topic.to_string(), "topic#7");
        assert_eq!(ConstructRef::Topic(topic).to_string(), "topic#7");
        assert_eq!(ConstructRef::Topic(topic).kind(), ConstructKind::Topic);
    }

    #[test]
    fn refs_carry_their_topic_map() {
        let map = TopicMapId::random();
        let name = NameId::new(map, 3);
        assert_eq!(ConstructRef::Name(name).topic_map(), map);
    }

    #[test]
    fn literal_constructors_pick_datatypes() {
        let s = Literal::string("hello");
        assert_eq!(s.datatype().as_str(), crate::locator::psi::XSD_STRING);

        let loc = Locator::new("http://example.org/doc").unwrap();
        let iri = Literal::iri(loc.clone());
        assert_eq!(iri.value(), loc.as_str());
        assert_eq!(iri.datatype().as_str(), crate::locator::psi::XSD_ANY_URI);
    }
}
