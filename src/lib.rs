//! Topic Maps (ISO/IEC 13250-2) data model engine.
//!
//! Module hierarchy follows type dependency order:
//! - locator, error, features: atoms (Layer 0)
//! - hash: content fingerprints (Layer 1)
//! - scope: scope interning and collection (Layer 2)
//! - identity: locator and reification registry (Layer 4)
//! - model: construct records and the construct store (Layers 3-6)
//! - merge: duplicate finalize, topic merge, topic-map merge (Layer 7)
//! - index, store: read-models and the persistence contract (Layer 8)
//! - system: session surface (Layer 9)
//!
//! The engine enforces the TMDM identity, scope and reification invariants
//! and silently merges information that turns out to describe the same
//! subject. See `DESIGN.md` for the algorithm notes.

#![forbid(unsafe_code)]

pub mod error;
pub mod features;
pub mod hash;
mod identity;
pub mod index;
pub mod locator;
mod merge;
pub mod model;
pub mod scope;
pub mod store;
pub mod system;
mod validate;

pub use error::{
    ConstraintReason, ConstraintViolation, FeatureError, IdentityConflict, InvalidLocator,
    ModelError, StoreFailure, TopicInUse, TopicUsage, UnknownConstruct,
};
pub use features::{Features, FEATURE_AUTOMERGE, FEATURE_AUTO_DUPLICATE_REMOVAL};
pub use hash::ContentHash;
pub use index::{LiteralIndex, ScopedIndex, TypeInstanceIndex};
pub use locator::{psi, Locator};
pub use model::{
    AssociationData, AssociationDraft, AssociationId, ConstructKind, ConstructRef, Literal,
    NameData, NameDraft, NameId, OccurrenceData, OccurrenceDraft, OccurrenceId, RoleData, RoleId,
    TopicData, TopicId, TopicMap, TopicMapId, VariantData, VariantDraft, VariantId,
};
pub use scope::ScopeId;
pub use store::{ConstructRow, MemoryStore, RowKey, ScopeRow, Store, TopicMapRow};
pub use system::{SystemBuilder, TopicMapSystem};
