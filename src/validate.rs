//! Layer 5: Constraint validation
//!
//! Synchronous checks run before any state mutation of the triggering call.
//! Cross-map arguments and stale handles are detectable because every id
//! carries its owning map.

use crate::error::{ConstraintReason, ConstraintViolation, ModelError, TopicUsage, UnknownConstruct};
use crate::model::map::TopicMap;
use crate::model::{ConstructRef, TopicId};

impl TopicMap {
    /// A topic argument must belong to this map and resolve.
    pub(crate) fn check_topic_arg(
        &self,
        subject: ConstructRef,
        arg: TopicId,
    ) -> Result<(), ModelError> {
        if arg.topic_map() != self.id {
            return Err(ConstraintViolation {
                construct: subject,
                reason: ConstraintReason::CrossMap {
                    argument: ConstructRef::Topic(arg),
                },
            }
            .into());
        }
        if !self.state.topics.contains_key(&arg) {
            return Err(UnknownConstruct {
                construct: ConstructRef::Topic(arg),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn check_theme_args(
        &self,
        subject: ConstructRef,
        themes: &[TopicId],
    ) -> Result<(), ModelError> {
        for theme in themes {
            self.check_topic_arg(subject, *theme)?;
        }
        Ok(())
    }

    /// A construct handle must belong to this map and still resolve.
    pub(crate) fn check_ref(&self, construct: ConstructRef) -> Result<(), ModelError> {
        if construct.topic_map() != self.id {
            return Err(ConstraintViolation {
                construct: ConstructRef::TopicMap(self.id),
                reason: ConstraintReason::CrossMap {
                    argument: construct,
                },
            }
            .into());
        }
        let resolves = match construct {
            ConstructRef::TopicMap(_) => true,
            ConstructRef::Topic(id) => self.state.topics.contains_key(&id),
            ConstructRef::Association(id) => self.state.associations.contains_key(&id),
            ConstructRef::Role(id) => self.state.roles.contains_key(&id),
            ConstructRef::Name(id) => self.state.names.contains_key(&id),
            ConstructRef::Occurrence(id) => self.state.occurrences.contains_key(&id),
            ConstructRef::Variant(id) => self.state.variants.contains_key(&id),
        };
        if !resolves {
            return Err(UnknownConstruct { construct }.into());
        }
        Ok(())
    }

    /// First active usage that blocks removal of `topic`, if any.
    pub(crate) fn topic_usage(&self, topic: TopicId) -> Option<TopicUsage> {
        if self
            .state
            .typed
            .get(&topic)
            .is_some_and(|users| !users.is_empty())
        {
            return Some(TopicUsage::Type);
        }
        if self
            .state
            .played
            .get(&topic)
            .is_some_and(|roles| !roles.is_empty())
        {
            return Some(TopicUsage::Player);
        }
        if self.state.scopes.uses_theme(topic) {
            return Some(TopicUsage::Theme);
        }
        if self.state.identity.reified(topic).is_some() {
            return Some(TopicUsage::Reifier);
        }
        None
    }
}
