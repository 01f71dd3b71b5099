//! Name and variant records and operations.
//!
//! Names default to the TMDM `topic-name` type. A variant's effective scope
//! is its own themes plus the parent name's themes and must strictly contain
//! the name's scope at creation time; removing a theme that would break the
//! superset rule is a no-op.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConstraintReason, ConstraintViolation, ModelError};
use crate::hash::{name_hash, variant_hash, ContentHash};
use crate::locator::Locator;
use crate::model::map::TopicMap;
use crate::model::{ConstructRef, Literal, NameDraft, NameId, TopicId, VariantDraft, VariantId};
use crate::scope::{ScopeId, ScopeRegistry};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NameData {
    pub(crate) id: NameId,
    pub(crate) parent: TopicId,
    pub(crate) ty: TopicId,
    pub(crate) value: String,
    pub(crate) scope: ScopeId,
    pub(crate) variants: BTreeSet<VariantId>,
    pub(crate) iids: BTreeSet<Locator>,
    pub(crate) reifier: Option<TopicId>,
    pub(crate) hash: ContentHash,
}

impl NameData {
    pub fn id(&self) -> NameId {
        self.id
    }

    pub fn parent(&self) -> TopicId {
        self.parent
    }

    pub fn name_type(&self) -> TopicId {
        self.ty
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn variants(&self) -> &BTreeSet<VariantId> {
        &self.variants
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.iids
    }

    pub fn reifier(&self) -> Option<TopicId> {
        self.reifier
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantData {
    pub(crate) id: VariantId,
    pub(crate) parent: NameId,
    pub(crate) literal: Literal,
    /// Own themes only; the effective scope adds the parent name's themes.
    pub(crate) scope: ScopeId,
    pub(crate) iids: BTreeSet<Locator>,
    pub(crate) reifier: Option<TopicId>,
    pub(crate) hash: ContentHash,
}

impl VariantData {
    pub fn id(&self) -> VariantId {
        self.id
    }

    pub fn parent(&self) -> NameId {
        self.parent
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    pub fn value(&self) -> &str {
        self.literal.value()
    }

    pub fn datatype(&self) -> &Locator {
        self.literal.datatype()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.iids
    }

    pub fn reifier(&self) -> Option<TopicId> {
        self.reifier
    }
}

impl TopicMap {
    /// Create-or-get a name on `parent`. Idempotent by content hash; the
    /// name type defaults to the TMDM `topic-name` subject.
    pub fn create_name(&mut self, parent: TopicId, draft: NameDraft) -> Result<NameId, ModelError> {
        self.txn(|map| {
            let subject = ConstructRef::Topic(parent);
            map.check_topic_arg(subject, parent)?;
            if let Some(ty) = draft.ty {
                map.check_topic_arg(subject, ty)?;
            }
            map.check_theme_args(subject, &draft.themes)?;

            let ty = match draft.ty {
                Some(ty) => ty,
                None => map.default_name_type()?,
            };
            let themes: BTreeSet<TopicId> = draft.themes.iter().copied().collect();
            let hash = name_hash(ty, &draft.value, &themes);
            if let Some(existing) = map.sibling_name(parent, hash, None) {
                return Ok(existing);
            }

            let id = NameId::new(map.id, map.alloc());
            let user = ConstructRef::Name(id);
            let scope = map.state.scopes.resolve(&themes);
            map.state.scopes.attach(scope, user);
            map.persist_scope(scope)?;

            map.state.names.insert(
                id,
                NameData {
                    id,
                    parent,
                    ty,
                    value: draft.value,
                    scope,
                    variants: BTreeSet::new(),
                    iids: BTreeSet::new(),
                    reifier: None,
                    hash,
                },
            );
            map.index_name_hash(parent, hash, id);
            map.index_typed(ty, user);
            if let Some(topic) = map.state.topics.get_mut(&parent) {
                topic.names.insert(id);
            }
            map.persist(user)?;
            map.persist(subject)?;
            Ok(id)
        })
    }

    /// The find-or-created default name type topic.
    pub(crate) fn default_name_type(&mut self) -> Result<TopicId, ModelError> {
        self.create_topic_by_subject_identifier(Locator::topic_name_type())
    }

    pub fn set_name_value(
        &mut self,
        name: NameId,
        value: impl Into<String>,
    ) -> Result<(), ModelError> {
        let value = value.into();
        self.txn(|map| {
            map.name(name)?;
            if let Some(data) = map.state.names.get_mut(&name) {
                data.value = value;
            }
            map.rehash_name(name)?;
            map.finalize_auto(ConstructRef::Name(name))
        })
    }

    pub fn set_name_type(&mut self, name: NameId, ty: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let old = map.name(name)?.ty;
            map.check_topic_arg(ConstructRef::Name(name), ty)?;
            if old == ty {
                return Ok(());
            }
            let user = ConstructRef::Name(name);
            map.unindex_typed(old, user);
            map.index_typed(ty, user);
            if let Some(data) = map.state.names.get_mut(&name) {
                data.ty = ty;
            }
            map.rehash_name(name)?;
            map.finalize_auto(user)
        })
    }

    pub fn add_name_theme(&mut self, name: NameId, theme: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Name(name);
            let scope = map.name(name)?.scope;
            map.check_topic_arg(user, theme)?;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.insert(theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.names.get_mut(&name) {
                data.scope = new_scope;
            }
            map.rehash_name(name)?;
            map.refresh_variants_of(name)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_name_theme(&mut self, name: NameId, theme: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Name(name);
            let scope = map.name(name)?.scope;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.remove(&theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.names.get_mut(&name) {
                data.scope = new_scope;
            }
            map.rehash_name(name)?;
            map.refresh_variants_of(name)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_name(&mut self, name: NameId) -> Result<(), ModelError> {
        self.txn(|map| {
            map.name(name)?;
            map.remove_name_internal(name)
        })
    }

    /// Create-or-get a variant on `name`. The effective scope (own themes
    /// plus the name's) must be a strict superset of the name's scope.
    pub fn create_variant(
        &mut self,
        name: NameId,
        draft: VariantDraft,
    ) -> Result<VariantId, ModelError> {
        self.txn(|map| {
            let subject = ConstructRef::Name(name);
            let name_scope = map.name(name)?.scope;
            map.check_theme_args(subject, &draft.themes)?;

            let name_themes = map.state.scopes.themes(name_scope);
            let own: BTreeSet<TopicId> = draft.themes.iter().copied().collect();
            let effective: BTreeSet<TopicId> = own.union(&name_themes).copied().collect();
            if !ScopeRegistry::is_strict_superset(&effective, &name_themes) {
                return Err(ConstraintViolation {
                    construct: subject,
                    reason: ConstraintReason::VariantScopeNotSuperset,
                }
                .into());
            }

            let hash = variant_hash(&draft.literal, &effective);
            if let Some(existing) = map.sibling_variant(name, hash, None) {
                return Ok(existing);
            }

            let id = VariantId::new(map.id, map.alloc());
            let user = ConstructRef::Variant(id);
            let scope = map.state.scopes.resolve(&own);
            map.state.scopes.attach(scope, user);
            map.persist_scope(scope)?;

            map.state.variants.insert(
                id,
                VariantData {
                    id,
                    parent: name,
                    literal: draft.literal,
                    scope,
                    iids: BTreeSet::new(),
                    reifier: None,
                    hash,
                },
            );
            map.index_variant_hash(name, hash, id);
            if let Some(data) = map.state.names.get_mut(&name) {
                data.variants.insert(id);
            }
            map.persist(user)?;
            map.persist(subject)?;
            Ok(id)
        })
    }

    pub fn set_variant_value(
        &mut self,
        variant: VariantId,
        literal: Literal,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            map.variant(variant)?;
            if let Some(data) = map.state.variants.get_mut(&variant) {
                data.literal = literal;
            }
            map.rehash_variant(variant)?;
            map.finalize_auto(ConstructRef::Variant(variant))
        })
    }

    pub fn add_variant_theme(&mut self, variant: VariantId, theme: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Variant(variant);
            let scope = map.variant(variant)?.scope;
            map.check_topic_arg(user, theme)?;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.insert(theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.variants.get_mut(&variant) {
                data.scope = new_scope;
            }
            map.rehash_variant(variant)?;
            map.finalize_auto(user)
        })
    }

    /// Removing a theme that would leave the effective scope no longer a
    /// strict superset of the name's scope is a no-op: the variant keeps
    /// the theme.
    pub fn remove_variant_theme(
        &mut self,
        variant: VariantId,
        theme: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Variant(variant);
            let data = map.variant(variant)?;
            let scope = data.scope;
            let parent = data.parent;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.remove(&theme) {
                return Ok(());
            }

            let name_scope = map.name(parent)?.scope;
            let name_themes = map.state.scopes.themes(name_scope);
            let effective: BTreeSet<TopicId> = themes.union(&name_themes).copied().collect();
            if !ScopeRegistry::is_strict_superset(&effective, &name_themes) {
                return Ok(());
            }

            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.variants.get_mut(&variant) {
                data.scope = new_scope;
            }
            map.rehash_variant(variant)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_variant(&mut self, variant: VariantId) -> Result<(), ModelError> {
        self.txn(|map| {
            map.variant(variant)?;
            map.remove_variant_internal(variant)
        })
    }

    /// Effective scope of a variant: own themes plus the parent name's.
    pub fn variant_effective_scope(
        &self,
        variant: VariantId,
    ) -> Result<BTreeSet<TopicId>, ModelError> {
        let data = self.variant(variant)?;
        let own = self.state.scopes.themes(data.scope);
        let name_scope = self.name(data.parent)?.scope;
        let name_themes = self.state.scopes.themes(name_scope);
        Ok(own.union(&name_themes).copied().collect())
    }

    /// Re-hash and re-dedup all variants of `name` after its scope changed.
    pub(crate) fn refresh_variants_of(&mut self, name: NameId) -> Result<(), ModelError> {
        let variants: Vec<VariantId> = match self.state.names.get(&name) {
            Some(data) => data.variants.iter().copied().collect(),
            None => return Ok(()),
        };
        for variant in variants {
            if !self.state.variants.contains_key(&variant) {
                continue;
            }
            self.rehash_variant(variant)?;
            self.finalize_auto(ConstructRef::Variant(variant))?;
        }
        Ok(())
    }

    pub(crate) fn remove_name_internal(&mut self, name: NameId) -> Result<(), ModelError> {
        let variants: Vec<VariantId> = match self.state.names.get(&name) {
            Some(data) => data.variants.iter().copied().collect(),
            None => return Ok(()),
        };
        for variant in variants {
            self.remove_variant_internal(variant)?;
        }

        let Some(data) = self.state.names.remove(&name) else {
            return Ok(());
        };
        let user = ConstructRef::Name(name);
        self.unindex_name_hash(data.parent, data.hash, name);
        self.unindex_typed(data.ty, user);
        for loc in &data.iids {
            self.state.identity.unbind_item(loc);
        }
        if let Some(reifier) = data.reifier {
            self.state.identity.unbind_reified(reifier);
        }
        self.release_scope(data.scope, user)?;
        if let Some(topic) = self.state.topics.get_mut(&data.parent) {
            topic.names.remove(&name);
        }
        self.erase(user)?;
        if self.state.topics.contains_key(&data.parent) {
            self.persist(ConstructRef::Topic(data.parent))?;
        }
        Ok(())
    }

    pub(crate) fn remove_variant_internal(&mut self, variant: VariantId) -> Result<(), ModelError> {
        let Some(data) = self.state.variants.remove(&variant) else {
            return Ok(());
        };
        let user = ConstructRef::Variant(variant);
        self.unindex_variant_hash(data.parent, data.hash, variant);
        for loc in &data.iids {
            self.state.identity.unbind_item(loc);
        }
        if let Some(reifier) = data.reifier {
            self.state.identity.unbind_reified(reifier);
        }
        self.release_scope(data.scope, user)?;
        if let Some(name) = self.state.names.get_mut(&data.parent) {
            name.variants.remove(&variant);
        }
        self.erase(user)?;
        if self.state.names.contains_key(&data.parent) {
            self.persist(ConstructRef::Name(data.parent))?;
        }
        Ok(())
    }
}
