//! Layer 0: Session features
//!
//! Feature flags are fixed when a [`crate::system::TopicMapSystem`] is
//! built and immutable thereafter.

use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

pub const FEATURE_AUTOMERGE: &str = "automerge";
pub const FEATURE_AUTO_DUPLICATE_REMOVAL: &str = "auto-duplicate-removal";

/// Feature names the engine recognizes but cannot enable.
const UNSUPPORTED: &[&str] = &["read-only"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Merge topics on identity collision instead of rejecting with an
    /// identity conflict.
    pub automerge: bool,
    /// Run duplicate finalize inline after hash-affecting mutations.
    /// When off, callers invoke [`crate::model::TopicMap::finalize`]
    /// explicitly.
    pub auto_duplicate_removal: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            automerge: true,
            auto_duplicate_removal: false,
        }
    }
}

impl Features {
    pub fn set(&mut self, name: &str, value: bool) -> Result<(), FeatureError> {
        match name {
            FEATURE_AUTOMERGE => {
                self.automerge = value;
                Ok(())
            }
            FEATURE_AUTO_DUPLICATE_REMOVAL => {
                self.auto_duplicate_removal = value;
                Ok(())
            }
            _ if UNSUPPORTED.contains(&name) => {
                if value {
                    Err(FeatureError::NotSupported { name: name.into() })
                } else {
                    Ok(())
                }
            }
            _ => Err(FeatureError::NotRecognized { name: name.into() }),
        }
    }

    pub fn get(&self, name: &str) -> Result<bool, FeatureError> {
        match name {
            FEATURE_AUTOMERGE => Ok(self.automerge),
            FEATURE_AUTO_DUPLICATE_REMOVAL => Ok(self.auto_duplicate_removal),
            _ if UNSUPPORTED.contains(&name) => Ok(false),
            _ => Err(FeatureError::NotRecognized { name: name.into() }),
        }
    }
}
