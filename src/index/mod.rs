//! Layer 8: Index projections
//!
//! Pure read-models over the construct store. Each index is built per call
//! from current state, so merges are reflected immediately and no index
//! carries independent state.

mod literal;
mod scoped;
mod type_instance;

pub use literal::LiteralIndex;
pub use scoped::ScopedIndex;
pub use type_instance::TypeInstanceIndex;

use crate::model::TopicMap;

impl TopicMap {
    /// Topics/associations/roles/names/occurrences grouped by type.
    pub fn type_instance_index(&self) -> TypeInstanceIndex {
        TypeInstanceIndex::build(self)
    }

    /// Names/occurrences/variants grouped by exact value (and datatype).
    pub fn literal_index(&self) -> LiteralIndex {
        LiteralIndex::build(self)
    }

    /// Associations/names/occurrences/variants grouped by scope.
    pub fn scoped_index(&self) -> ScopedIndex {
        ScopedIndex::build(self)
    }
}
