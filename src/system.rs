//! Layer 9: System surface
//!
//! A [`TopicMapSystem`] owns the topic maps of one session: create/get/
//! remove by storage locator, list known locators, and fold one map into
//! another. Feature flags and the store collaborator are fixed when the
//! system is built.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ConstraintReason, ConstraintViolation, ModelError};
use crate::features::Features;
use crate::locator::Locator;
use crate::model::{ConstructRef, TopicMap};
use crate::store::{MemoryStore, Store};

#[derive(Default)]
pub struct SystemBuilder {
    features: Features,
    store: Option<Arc<dyn Store>>,
}

impl std::fmt::Debug for SystemBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemBuilder")
            .field("features", &self.features)
            .field("store", &self.store.as_ref().map(|_| "<store>"))
            .finish()
    }
}

impl SystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a feature flag by name. Unknown names and unsupported values are
    /// configuration-time errors.
    pub fn feature(mut self, name: &str, value: bool) -> Result<Self, ModelError> {
        self.features.set(name, value)?;
        Ok(self)
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> TopicMapSystem {
        TopicMapSystem {
            features: self.features,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            maps: BTreeMap::new(),
        }
    }
}

pub struct TopicMapSystem {
    features: Features,
    store: Arc<dyn Store>,
    maps: BTreeMap<Locator, TopicMap>,
}

impl TopicMapSystem {
    pub fn builder() -> SystemBuilder {
        SystemBuilder::new()
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Create a topic map under a storage locator. The locator must be
    /// unused.
    pub fn create_topic_map(&mut self, locator: Locator) -> Result<&mut TopicMap, ModelError> {
        if let Some(existing) = self.maps.get(&locator) {
            return Err(ConstraintViolation {
                construct: ConstructRef::TopicMap(existing.id()),
                reason: ConstraintReason::LocatorInUse { locator },
            }
            .into());
        }
        let map = TopicMap::create(locator.clone(), self.features, self.store.clone())?;
        tracing::debug!(map = %map.id(), %locator, "created topic map");
        Ok(self.maps.entry(locator).or_insert(map))
    }

    pub fn topic_map(&self, locator: &Locator) -> Option<&TopicMap> {
        self.maps.get(locator)
    }

    pub fn topic_map_mut(&mut self, locator: &Locator) -> Option<&mut TopicMap> {
        self.maps.get_mut(locator)
    }

    pub fn locators(&self) -> Vec<&Locator> {
        self.maps.keys().collect()
    }

    /// Remove a topic map and drop its persisted rows. Returns whether a
    /// map was removed.
    pub fn remove_topic_map(&mut self, locator: &Locator) -> Result<bool, ModelError> {
        match self.maps.remove(locator) {
            Some(map) => {
                self.store.drop_map(map.id())?;
                tracing::debug!(map = %map.id(), %locator, "removed topic map");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fold `source` into `target`, leaving `source` untouched.
    pub fn merge_topic_maps(
        &mut self,
        target: &Locator,
        source: &Locator,
    ) -> Result<(), ModelError> {
        if target == source {
            return Ok(());
        }
        let source_map = self
            .maps
            .remove(source)
            .ok_or_else(|| ModelError::UnknownTopicMap {
                locator: source.clone(),
            })?;
        let result = match self.maps.get_mut(target) {
            Some(target_map) => target_map.merge_from(&source_map),
            None => Err(ModelError::UnknownTopicMap {
                locator: target.clone(),
            }),
        };
        self.maps.insert(source.clone(), source_map);
        result
    }

    /// End the session. Maps are dropped; persisted state stays with the
    /// store collaborator.
    pub fn close(self) {}
}
