//! Layer 0: Error taxonomy
//!
//! Bounded, typed refusal states. Constraint and identity errors are raised
//! at the point of violation, before any store mutation for the triggering
//! call; store failures abort the enclosing atomic boundary.

use thiserror::Error;

use crate::locator::Locator;
use crate::model::{ConstructRef, TopicId};

/// Invalid locator string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("locator `{raw}` is invalid: {reason}")]
pub struct InvalidLocator {
    pub raw: String,
    pub reason: String,
}

/// A model constraint was violated by the reported construct.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("constraint violation on {construct}: {reason}")]
pub struct ConstraintViolation {
    pub construct: ConstructRef,
    pub reason: ConstraintReason,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintReason {
    #[error("argument {argument} belongs to a different topic map")]
    CrossMap { argument: ConstructRef },
    #[error("{what} must not be empty")]
    EmptyValue { what: &'static str },
    #[error("variant scope must be a strict superset of the parent name scope")]
    VariantScopeNotSuperset,
    #[error("topics cannot be reified")]
    NotReifiable,
    #[error("reifier {reifier} already reifies {reified}")]
    ReifierInUse {
        reifier: TopicId,
        reified: ConstructRef,
    },
    #[error("merged topics reify different constructs: {left} and {right}")]
    ConflictingReifiers {
        left: ConstructRef,
        right: ConstructRef,
    },
    #[error("storage locator `{locator}` is already in use")]
    LocatorInUse { locator: Locator },
}

/// Item-identifier collision with a construct that cannot be merged.
///
/// Also raised for topic identity collisions when `automerge` is off.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("identity conflict on `{locator}`: {acting} collides with {existing}")]
pub struct IdentityConflict {
    pub existing: ConstructRef,
    pub acting: ConstructRef,
    pub locator: Locator,
}

/// Removal refused: the topic is still referenced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("topic {topic} is in use as a {usage}")]
pub struct TopicInUse {
    pub topic: TopicId,
    pub usage: TopicUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicUsage {
    Type,
    Player,
    Theme,
    Reifier,
}

impl std::fmt::Display for TopicUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TopicUsage::Type => "type",
            TopicUsage::Player => "role player",
            TopicUsage::Theme => "scope theme",
            TopicUsage::Reifier => "reifier",
        };
        f.write_str(s)
    }
}

/// Configuration-time errors on the system builder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("feature `{name}` is not recognized")]
    NotRecognized { name: String },
    #[error("feature `{name}` is recognized but not supported with this value")]
    NotSupported { name: String },
}

/// Failure surfaced by the persistence collaborator.
///
/// Fatal for the enclosing atomic boundary; never silently swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("store failure during {op}: {reason}")]
pub struct StoreFailure {
    pub op: &'static str,
    pub reason: String,
}

impl StoreFailure {
    pub fn new(op: &'static str, reason: impl Into<String>) -> Self {
        Self {
            op,
            reason: reason.into(),
        }
    }
}

/// A handle that no longer resolves (removed construct, or a handle from
/// another engine instance).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no such construct: {construct}")]
pub struct UnknownConstruct {
    pub construct: ConstructRef,
}

/// Canonical error enum for the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    #[error(transparent)]
    Locator(#[from] InvalidLocator),
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),
    #[error(transparent)]
    Identity(#[from] Box<IdentityConflict>),
    #[error(transparent)]
    TopicInUse(#[from] TopicInUse),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Store(#[from] StoreFailure),
    #[error(transparent)]
    Unknown(#[from] UnknownConstruct),
    #[error("unknown topic map `{locator}`")]
    UnknownTopicMap { locator: Locator },
}

impl From<IdentityConflict> for ModelError {
    fn from(err: IdentityConflict) -> Self {
        ModelError::Identity(Box::new(err))
    }
}
