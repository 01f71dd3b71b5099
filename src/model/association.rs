//! Association and role records and operations.
//!
//! An association owns an unordered set of roles and must be created with
//! at least one. Role changes re-hash the parent association, since role
//! (type, player) pairs are part of its dedup identity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConstraintReason, ConstraintViolation, ModelError};
use crate::hash::{association_hash, ContentHash};
use crate::locator::Locator;
use crate::model::map::TopicMap;
use crate::model::{AssociationDraft, AssociationId, ConstructRef, RoleId, TopicId};
use crate::scope::ScopeId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationData {
    pub(crate) id: AssociationId,
    pub(crate) ty: TopicId,
    pub(crate) scope: ScopeId,
    pub(crate) roles: BTreeSet<RoleId>,
    pub(crate) iids: BTreeSet<Locator>,
    pub(crate) reifier: Option<TopicId>,
    pub(crate) hash: ContentHash,
}

impl AssociationData {
    pub fn id(&self) -> AssociationId {
        self.id
    }

    pub fn association_type(&self) -> TopicId {
        self.ty
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.iids
    }

    pub fn reifier(&self) -> Option<TopicId> {
        self.reifier
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleData {
    pub(crate) id: RoleId,
    pub(crate) parent: AssociationId,
    pub(crate) ty: TopicId,
    pub(crate) player: TopicId,
    pub(crate) iids: BTreeSet<Locator>,
    pub(crate) reifier: Option<TopicId>,
}

impl RoleData {
    pub fn id(&self) -> RoleId {
        self.id
    }

    pub fn parent(&self) -> AssociationId {
        self.parent
    }

    pub fn role_type(&self) -> TopicId {
        self.ty
    }

    pub fn player(&self) -> TopicId {
        self.player
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.iids
    }

    pub fn reifier(&self) -> Option<TopicId> {
        self.reifier
    }
}

impl TopicMap {
    /// Create-or-get an association with its roles. Idempotent: an existing
    /// association with the same type, scope and role set is returned.
    pub fn create_association(
        &mut self,
        draft: AssociationDraft,
    ) -> Result<AssociationId, ModelError> {
        self.txn(|map| {
            let subject = ConstructRef::TopicMap(map.id);
            map.check_topic_arg(subject, draft.ty)?;
            map.check_theme_args(subject, &draft.themes)?;
            if draft.roles.is_empty() {
                return Err(ConstraintViolation {
                    construct: subject,
                    reason: ConstraintReason::EmptyValue {
                        what: "association roles",
                    },
                }
                .into());
            }
            for role in &draft.roles {
                map.check_topic_arg(subject, role.ty)?;
                map.check_topic_arg(subject, role.player)?;
            }

            let themes: BTreeSet<TopicId> = draft.themes.iter().copied().collect();
            let mut pairs: Vec<(TopicId, TopicId)> =
                draft.roles.iter().map(|r| (r.ty, r.player)).collect();
            pairs.sort();
            pairs.dedup();

            let hash = association_hash(draft.ty, &themes, &pairs);
            if let Some(existing) = map.sibling_association(hash, None) {
                return Ok(existing);
            }

            let id = AssociationId::new(map.id, map.alloc());
            let user = ConstructRef::Association(id);
            let scope = map.state.scopes.resolve(&themes);
            map.state.scopes.attach(scope, user);
            map.persist_scope(scope)?;

            map.state.associations.insert(
                id,
                AssociationData {
                    id,
                    ty: draft.ty,
                    scope,
                    roles: BTreeSet::new(),
                    iids: BTreeSet::new(),
                    reifier: None,
                    hash,
                },
            );
            map.index_association_hash(hash, id);
            map.index_typed(draft.ty, user);

            for (role_type, player) in pairs {
                map.insert_role(id, role_type, player)?;
            }
            map.persist(user)?;
            Ok(id)
        })
    }

    /// Add a role to an existing association. Returns the existing role when
    /// an identical (type, player) pair is already present.
    pub fn add_role(
        &mut self,
        association: AssociationId,
        ty: TopicId,
        player: TopicId,
    ) -> Result<RoleId, ModelError> {
        self.txn(|map| {
            let subject = ConstructRef::Association(association);
            map.association(association)?;
            map.check_topic_arg(subject, ty)?;
            map.check_topic_arg(subject, player)?;

            if let Some(existing) = map.find_role(association, ty, player) {
                return Ok(existing);
            }
            let role = map.insert_role(association, ty, player)?;
            map.rehash_association(association)?;
            map.finalize_auto(subject)?;
            Ok(role)
        })
    }

    fn insert_role(
        &mut self,
        association: AssociationId,
        ty: TopicId,
        player: TopicId,
    ) -> Result<RoleId, ModelError> {
        let id = RoleId::new(self.id, self.alloc());
        let user = ConstructRef::Role(id);
        self.state.roles.insert(
            id,
            RoleData {
                id,
                parent: association,
                ty,
                player,
                iids: BTreeSet::new(),
                reifier: None,
            },
        );
        self.index_typed(ty, user);
        self.index_played(player, id);
        if let Some(data) = self.state.associations.get_mut(&association) {
            data.roles.insert(id);
        }
        self.persist(user)?;
        self.persist(ConstructRef::Association(association))?;
        Ok(id)
    }

    pub(crate) fn find_role(
        &self,
        association: AssociationId,
        ty: TopicId,
        player: TopicId,
    ) -> Option<RoleId> {
        let data = self.state.associations.get(&association)?;
        data.roles
            .iter()
            .copied()
            .find(|id| match self.state.roles.get(id) {
                Some(role) => role.ty == ty && role.player == player,
                None => false,
            })
    }

    pub fn set_role_type(&mut self, role: RoleId, ty: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let old = map.role(role)?.ty;
            map.check_topic_arg(ConstructRef::Role(role), ty)?;
            if old == ty {
                return Ok(());
            }
            let user = ConstructRef::Role(role);
            map.unindex_typed(old, user);
            map.index_typed(ty, user);
            let parent = match map.state.roles.get_mut(&role) {
                Some(data) => {
                    data.ty = ty;
                    data.parent
                }
                None => return Ok(()),
            };
            map.persist(user)?;
            map.rehash_association(parent)?;
            map.finalize_auto(ConstructRef::Association(parent))
        })
    }

    pub fn set_role_player(&mut self, role: RoleId, player: TopicId) -> Result<(), ModelError> {
        self.txn(|map| {
            let old = map.role(role)?.player;
            map.check_topic_arg(ConstructRef::Role(role), player)?;
            if old == player {
                return Ok(());
            }
            map.unindex_played(old, role);
            map.index_played(player, role);
            let parent = match map.state.roles.get_mut(&role) {
                Some(data) => {
                    data.player = player;
                    data.parent
                }
                None => return Ok(()),
            };
            map.persist(ConstructRef::Role(role))?;
            map.rehash_association(parent)?;
            map.finalize_auto(ConstructRef::Association(parent))
        })
    }

    pub fn set_association_type(
        &mut self,
        association: AssociationId,
        ty: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let old = map.association(association)?.ty;
            map.check_topic_arg(ConstructRef::Association(association), ty)?;
            if old == ty {
                return Ok(());
            }
            let user = ConstructRef::Association(association);
            map.unindex_typed(old, user);
            map.index_typed(ty, user);
            if let Some(data) = map.state.associations.get_mut(&association) {
                data.ty = ty;
            }
            map.rehash_association(association)?;
            map.finalize_auto(user)
        })
    }

    pub fn add_association_theme(
        &mut self,
        association: AssociationId,
        theme: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Association(association);
            let scope = map.association(association)?.scope;
            map.check_topic_arg(user, theme)?;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.insert(theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.associations.get_mut(&association) {
                data.scope = new_scope;
            }
            map.rehash_association(association)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_association_theme(
        &mut self,
        association: AssociationId,
        theme: TopicId,
    ) -> Result<(), ModelError> {
        self.txn(|map| {
            let user = ConstructRef::Association(association);
            let scope = map.association(association)?.scope;
            let mut themes = map.state.scopes.themes(scope);
            if !themes.remove(&theme) {
                return Ok(());
            }
            let new_scope = map.rescope(user, scope, &themes)?;
            if let Some(data) = map.state.associations.get_mut(&association) {
                data.scope = new_scope;
            }
            map.rehash_association(association)?;
            map.finalize_auto(user)
        })
    }

    pub fn remove_role(&mut self, role: RoleId) -> Result<(), ModelError> {
        self.txn(|map| {
            let parent = map.role(role)?.parent;
            map.remove_role_internal(role)?;
            map.rehash_association(parent)?;
            map.finalize_auto(ConstructRef::Association(parent))
        })
    }

    pub fn remove_association(&mut self, association: AssociationId) -> Result<(), ModelError> {
        self.txn(|map| {
            map.association(association)?;
            map.remove_association_internal(association)
        })
    }

    pub(crate) fn remove_role_internal(&mut self, role: RoleId) -> Result<(), ModelError> {
        let Some(data) = self.state.roles.remove(&role) else {
            return Ok(());
        };
        let user = ConstructRef::Role(role);
        self.unindex_typed(data.ty, user);
        self.unindex_played(data.player, role);
        for loc in &data.iids {
            self.state.identity.unbind_item(loc);
        }
        if let Some(reifier) = data.reifier {
            self.state.identity.unbind_reified(reifier);
        }
        if let Some(assoc) = self.state.associations.get_mut(&data.parent) {
            assoc.roles.remove(&role);
        }
        self.erase(user)?;
        if self.state.associations.contains_key(&data.parent) {
            self.persist(ConstructRef::Association(data.parent))?;
        }
        Ok(())
    }

    pub(crate) fn remove_association_internal(
        &mut self,
        association: AssociationId,
    ) -> Result<(), ModelError> {
        let roles: Vec<RoleId> = match self.state.associations.get(&association) {
            Some(data) => data.roles.iter().copied().collect(),
            None => return Ok(()),
        };
        for role in roles {
            self.remove_role_internal(role)?;
        }

        let Some(data) = self.state.associations.remove(&association) else {
            return Ok(());
        };
        let user = ConstructRef::Association(association);
        self.unindex_association_hash(data.hash, association);
        self.unindex_typed(data.ty, user);
        for loc in &data.iids {
            self.state.identity.unbind_item(loc);
        }
        if let Some(reifier) = data.reifier {
            self.state.identity.unbind_reified(reifier);
        }
        self.release_scope(data.scope, user)?;
        self.erase(user)
    }
}
