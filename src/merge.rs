//! Layer 7: Merge engine
//!
//! Three algorithms built on the identity index, the scope registry and the
//! content hasher:
//!
//! - duplicate finalize: collapse same-parent constructs with equal content
//!   hashes, folding item identifiers, reifiers and (for names) variants
//!   onto the survivor;
//! - topic merge: fold one topic's links, characteristics and identities
//!   onto another, then remove it;
//! - topic-map merge: one-directional copy-and-fold of a whole map.
//!
//! Every entry point runs inside an atomic boundary; partial merges are
//! never visible.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConstraintReason, ConstraintViolation, ModelError};
use crate::identity::IdentityKind;
use crate::model::map::TopicMap;
use crate::model::{
    AssociationDraft, AssociationId, ConstructRef, NameDraft, NameId, OccurrenceDraft,
    OccurrenceId, TopicId, VariantDraft, VariantId,
};
use crate::scope::ScopeId;

impl TopicMap {
    /// Duplicate finalize: re-hash `construct` and collapse it with any
    /// same-parent sibling carrying an equal content hash. Returns whether
    /// a duplicate was absorbed.
    ///
    /// Runs inline after hash-affecting mutations when the
    /// `auto-duplicate-removal` feature is on; otherwise call it explicitly
    /// after mutations that may have created duplicates.
    pub fn finalize(&mut self, construct: ConstructRef) -> Result<bool, ModelError> {
        self.txn(|map| match construct {
            ConstructRef::Name(id) => map.finalize_name(id),
            ConstructRef::Occurrence(id) => map.finalize_occurrence(id),
            ConstructRef::Association(id) => map.finalize_association(id),
            ConstructRef::Variant(id) => map.finalize_variant(id),
            _ => Ok(false),
        })
    }

    pub(crate) fn finalize_auto(&mut self, construct: ConstructRef) -> Result<(), ModelError> {
        if self.features().auto_duplicate_removal {
            self.finalize(construct)?;
        }
        Ok(())
    }

    fn finalize_name(&mut self, id: NameId) -> Result<bool, ModelError> {
        if !self.state.names.contains_key(&id) {
            return Ok(false);
        }
        self.rehash_name(id)?;
        let mut collapsed = false;
        loop {
            let (parent, hash) = match self.state.names.get(&id) {
                Some(data) => (data.parent, data.hash),
                None => break,
            };
            let Some(dup) = self.sibling_name(parent, hash, Some(id)) else {
                break;
            };
            tracing::debug!(map = %self.id, survivor = %id, duplicate = %dup, "collapsing duplicate name");
            self.absorb_name(id, dup)?;
            collapsed = true;
        }
        Ok(collapsed)
    }

    fn finalize_occurrence(&mut self, id: OccurrenceId) -> Result<bool, ModelError> {
        if !self.state.occurrences.contains_key(&id) {
            return Ok(false);
        }
        self.rehash_occurrence(id)?;
        let mut collapsed = false;
        loop {
            let (parent, hash) = match self.state.occurrences.get(&id) {
                Some(data) => (data.parent, data.hash),
                None => break,
            };
            let Some(dup) = self.sibling_occurrence(parent, hash, Some(id)) else {
                break;
            };
            tracing::debug!(map = %self.id, survivor = %id, duplicate = %dup, "collapsing duplicate occurrence");
            self.absorb_occurrence(id, dup)?;
            collapsed = true;
        }
        Ok(collapsed)
    }

    fn finalize_association(&mut self, id: AssociationId) -> Result<bool, ModelError> {
        if !self.state.associations.contains_key(&id) {
            return Ok(false);
        }
        self.rehash_association(id)?;
        let mut collapsed = false;
        loop {
            let hash = match self.state.associations.get(&id) {
                Some(data) => data.hash,
                None => break,
            };
            let Some(dup) = self.sibling_association(hash, Some(id)) else {
                break;
            };
            tracing::debug!(map = %self.id, survivor = %id, duplicate = %dup, "collapsing duplicate association");
            self.absorb_association(id, dup)?;
            collapsed = true;
        }
        Ok(collapsed)
    }

    fn finalize_variant(&mut self, id: VariantId) -> Result<bool, ModelError> {
        if !self.state.variants.contains_key(&id) {
            return Ok(false);
        }
        self.rehash_variant(id)?;
        let mut collapsed = false;
        loop {
            let (parent, hash) = match self.state.variants.get(&id) {
                Some(data) => (data.parent, data.hash),
                None => break,
            };
            let Some(dup) = self.sibling_variant(parent, hash, Some(id)) else {
                break;
            };
            self.absorb_variant(id, dup)?;
            collapsed = true;
        }
        Ok(collapsed)
    }

    // ------------------------------------------------------------------
    // Absorption: survivor gains the duplicate's identifiers, reifier and
    // (for names) variants; the duplicate is removed.

    pub(crate) fn absorb_name(&mut self, survivor: NameId, dup: NameId) -> Result<(), ModelError> {
        self.move_item_identifiers(ConstructRef::Name(dup), ConstructRef::Name(survivor))?;
        self.adopt_reifier(ConstructRef::Name(survivor), ConstructRef::Name(dup))?;
        let variants: Vec<VariantId> = match self.state.names.get(&dup) {
            Some(data) => data.variants.iter().copied().collect(),
            None => Vec::new(),
        };
        for variant in variants {
            self.reparent_variant(variant, survivor)?;
        }
        self.remove_name_internal(dup)
    }

    fn absorb_occurrence(&mut self, survivor: OccurrenceId, dup: OccurrenceId) -> Result<(), ModelError> {
        self.move_item_identifiers(
            ConstructRef::Occurrence(dup),
            ConstructRef::Occurrence(survivor),
        )?;
        self.adopt_reifier(
            ConstructRef::Occurrence(survivor),
            ConstructRef::Occurrence(dup),
        )?;
        self.remove_occurrence_internal(dup)
    }

    fn absorb_association(
        &mut self,
        survivor: AssociationId,
        dup: AssociationId,
    ) -> Result<(), ModelError> {
        self.move_item_identifiers(
            ConstructRef::Association(dup),
            ConstructRef::Association(survivor),
        )?;
        self.adopt_reifier(
            ConstructRef::Association(survivor),
            ConstructRef::Association(dup),
        )?;
        self.remove_association_internal(dup)
    }

    fn absorb_variant(&mut self, survivor: VariantId, dup: VariantId) -> Result<(), ModelError> {
        self.move_item_identifiers(ConstructRef::Variant(dup), ConstructRef::Variant(survivor))?;
        self.adopt_reifier(ConstructRef::Variant(survivor), ConstructRef::Variant(dup))?;
        self.remove_variant_internal(dup)
    }

    /// Move a duplicate's variant under `new_parent`, deduplicating against
    /// the new parent's existing variants.
    fn reparent_variant(&mut self, variant: VariantId, new_parent: NameId) -> Result<(), ModelError> {
        let (old_parent, old_hash) = match self.state.variants.get(&variant) {
            Some(data) => (data.parent, data.hash),
            None => return Ok(()),
        };
        self.unindex_variant_hash(old_parent, old_hash, variant);
        if let Some(name) = self.state.names.get_mut(&old_parent) {
            name.variants.remove(&variant);
        }
        if let Some(data) = self.state.variants.get_mut(&variant) {
            data.parent = new_parent;
        }
        if let Some(name) = self.state.names.get_mut(&new_parent) {
            name.variants.insert(variant);
        }
        // Hash-equal parent names share type, value and scope, so the
        // effective scope is unchanged; re-hash anyway to stay safe.
        self.index_variant_hash(new_parent, old_hash, variant);
        self.rehash_variant(variant)?;
        self.persist(ConstructRef::Name(new_parent))?;

        let hash = match self.state.variants.get(&variant) {
            Some(data) => data.hash,
            None => return Ok(()),
        };
        if let Some(existing) = self.sibling_variant(new_parent, hash, Some(variant)) {
            self.absorb_variant(existing, variant)?;
        } else {
            self.persist(ConstructRef::Variant(variant))?;
        }
        Ok(())
    }

    /// Move every item identifier of `from` onto `to`.
    ///
    /// The locators currently resolve to `from`, so rebinding cannot
    /// conflict and must not re-enter the merge chokepoint.
    pub(crate) fn move_item_identifiers(
        &mut self,
        from: ConstructRef,
        to: ConstructRef,
    ) -> Result<(), ModelError> {
        let locs = self.item_identifiers_of(from);
        if locs.is_empty() {
            return Ok(());
        }
        for loc in &locs {
            if let Some(iids) = self.iids_mut(from) {
                iids.remove(loc);
            }
            self.state.identity.unbind_item(loc);
        }
        for loc in locs {
            if let Some(iids) = self.iids_mut(to) {
                iids.insert(loc.clone());
            }
            self.state.identity.bind_item(loc, to);
        }
        self.persist(from)?;
        self.persist(to)
    }

    /// Fold the duplicate's reifier onto the survivor. When both sides are
    /// reified, the two reifier topics are merged (nested merge).
    pub(crate) fn adopt_reifier(
        &mut self,
        winner: ConstructRef,
        loser: ConstructRef,
    ) -> Result<(), ModelError> {
        let Some(loser_reifier) = self.reifier_of(loser) else {
            return Ok(());
        };
        self.set_reifier_slot(loser, None);
        self.state.identity.unbind_reified(loser_reifier);
        self.persist(loser)?;

        match self.reifier_of(winner) {
            None => {
                self.set_reifier_slot(winner, Some(loser_reifier));
                self.state.identity.bind_reified(loser_reifier, winner);
                self.persist(winner)
            }
            Some(winner_reifier) if winner_reifier == loser_reifier => Ok(()),
            Some(winner_reifier) => {
                tracing::debug!(
                    map = %self.id,
                    %winner_reifier,
                    %loser_reifier,
                    "merging reifier topics of collapsed duplicates"
                );
                self.merge_topics(winner_reifier, loser_reifier)
            }
        }
    }

    // ------------------------------------------------------------------
    // Topic merge

    /// Merge `source` into `target`: reassign typing, scope, role and
    /// reification links, copy characteristics and identities, then remove
    /// `source`. No-op when the ids are equal. Atomic: a failing step rolls
    /// the whole merge back.
    pub fn merge_topics(&mut self, target: TopicId, source: TopicId) -> Result<(), ModelError> {
        if target == source {
            return Ok(());
        }
        self.txn(|map| {
            map.check_topic_arg(ConstructRef::Topic(target), target)?;
            map.check_topic_arg(ConstructRef::Topic(target), source)?;
            tracing::debug!(map = %map.id, %target, %source, "merging topics");
            map.merge_topics_inner(target, source)
        })
    }

    fn merge_topics_inner(&mut self, target: TopicId, source: TopicId) -> Result<(), ModelError> {
        // 1. Topics typed by `source`, and `source`'s own types. Self-typing
        // rows produced by the reassignment are dropped.
        for user in self.typed_users(source) {
            if let ConstructRef::Topic(instance) = user {
                self.unindex_typed(source, user);
                let inserted = match self.state.topics.get_mut(&instance) {
                    Some(data) => {
                        data.types.remove(&source);
                        if instance == target {
                            false
                        } else {
                            data.types.insert(target)
                        }
                    }
                    None => false,
                };
                if inserted {
                    self.index_typed(target, user);
                }
                self.persist(user)?;
            }
        }
        let source_types: Vec<TopicId> = match self.state.topics.get(&source) {
            Some(data) => data.types.iter().copied().collect(),
            None => Vec::new(),
        };
        for ty in source_types {
            self.unindex_typed(ty, ConstructRef::Topic(source));
            if let Some(data) = self.state.topics.get_mut(&source) {
                data.types.remove(&ty);
            }
            if ty == target {
                continue;
            }
            let inserted = match self.state.topics.get_mut(&target) {
                Some(data) => data.types.insert(ty),
                None => false,
            };
            if inserted {
                self.index_typed(ty, ConstructRef::Topic(target));
            }
        }
        self.persist(ConstructRef::Topic(target))?;

        // 2. Scopes containing `source` as a theme: re-intern with `target`
        // substituted and re-hash every construct whose scope changed.
        for scope in self.state.scopes.scopes_with_theme(source) {
            let Some(data) = self.state.scopes.get(scope) else {
                continue;
            };
            let users: Vec<ConstructRef> = data.users().iter().copied().collect();
            let mut themes = data.themes().clone();
            themes.remove(&source);
            themes.insert(target);
            for user in users {
                if self.check_ref(user).is_err() {
                    continue;
                }
                let new_scope = self.rescope(user, scope, &themes)?;
                self.set_scope_slot(user, new_scope);
                self.refresh_scoped(user)?;
            }
        }

        // 3. Roles played by `source`, then roles typed by `source`.
        // Duplicate roles (same association, type and player) are dropped.
        for role in self.played_roles(source) {
            let Some(data) = self.state.roles.get(&role) else {
                continue;
            };
            let association = data.parent;
            let ty = data.ty;
            match self.find_role(association, ty, target) {
                Some(existing) if existing != role => {
                    self.remove_role_internal(role)?;
                }
                _ => {
                    self.unindex_played(source, role);
                    self.index_played(target, role);
                    if let Some(data) = self.state.roles.get_mut(&role) {
                        data.player = target;
                    }
                    self.persist(ConstructRef::Role(role))?;
                }
            }
            self.rehash_association(association)?;
            self.finalize(ConstructRef::Association(association))?;
        }
        for user in self.typed_users(source) {
            if let ConstructRef::Role(role) = user {
                let Some(data) = self.state.roles.get(&role) else {
                    continue;
                };
                let association = data.parent;
                let player = data.player;
                match self.find_role(association, target, player) {
                    Some(existing) if existing != role => {
                        self.remove_role_internal(role)?;
                    }
                    _ => {
                        self.unindex_typed(source, user);
                        self.index_typed(target, user);
                        if let Some(data) = self.state.roles.get_mut(&role) {
                            data.ty = target;
                        }
                        self.persist(user)?;
                    }
                }
                self.rehash_association(association)?;
                self.finalize(ConstructRef::Association(association))?;
            }
        }

        // 4. Statements typed by `source`, re-typed through the normal
        // setters so finalize fires on the new hashes. Constructs already
        // collapsed by an earlier finalize are skipped.
        for user in self.typed_users(source) {
            match user {
                ConstructRef::Name(id) if self.state.names.contains_key(&id) => {
                    self.set_name_type(id, target)?;
                    self.finalize(user)?;
                }
                ConstructRef::Occurrence(id) if self.state.occurrences.contains_key(&id) => {
                    self.set_occurrence_type(id, target)?;
                    self.finalize(user)?;
                }
                ConstructRef::Association(id) if self.state.associations.contains_key(&id) => {
                    self.set_association_type(id, target)?;
                    self.finalize(user)?;
                }
                _ => {}
            }
        }

        // 5. Reification link. Both sides reifying different constructs is
        // a hard constraint violation and aborts the merge.
        if let Some(reified) = self.state.identity.reified(source) {
            match self.state.identity.reified(target) {
                Some(existing) if existing != reified => {
                    return Err(ConstraintViolation {
                        construct: ConstructRef::Topic(target),
                        reason: ConstraintReason::ConflictingReifiers {
                            left: existing,
                            right: reified,
                        },
                    }
                    .into());
                }
                Some(_) => {
                    self.state.identity.unbind_reified(source);
                }
                None => {
                    self.state.identity.unbind_reified(source);
                    self.set_reifier_slot(reified, Some(target));
                    self.state.identity.bind_reified(target, reified);
                    self.persist(reified)?;
                }
            }
        }

        // 6. Characteristics through the normal create operations (dedup
        // applies), folding identifiers, reifiers and variants; then move
        // identity locators directly so no merge re-triggers.
        let source_names: Vec<NameId> = match self.state.topics.get(&source) {
            Some(data) => data.names.iter().copied().collect(),
            None => Vec::new(),
        };
        for name in source_names {
            let Some(data) = self.state.names.get(&name) else {
                continue;
            };
            let themes = self.state.scopes.themes(data.scope);
            let draft = NameDraft {
                value: data.value.clone(),
                ty: Some(data.ty),
                themes: themes.iter().copied().collect(),
            };
            let copy = self.create_name(target, draft)?;
            self.absorb_name(copy, name)?;
        }
        let source_occurrences: Vec<OccurrenceId> = match self.state.topics.get(&source) {
            Some(data) => data.occurrences.iter().copied().collect(),
            None => Vec::new(),
        };
        for occurrence in source_occurrences {
            let Some(data) = self.state.occurrences.get(&occurrence) else {
                continue;
            };
            let themes = self.state.scopes.themes(data.scope);
            let draft = OccurrenceDraft {
                ty: data.ty,
                literal: data.literal.clone(),
                themes: themes.iter().copied().collect(),
            };
            let copy = self.create_occurrence(target, draft)?;
            self.absorb_occurrence(copy, occurrence)?;
        }

        if let Some(data) = self.state.topics.get(&source) {
            let iids: Vec<_> = data.iids.iter().cloned().collect();
            let sids: Vec<_> = data.sids.iter().cloned().collect();
            let slos: Vec<_> = data.slos.iter().cloned().collect();
            for loc in iids {
                if let Some(data) = self.state.topics.get_mut(&source) {
                    data.iids.remove(&loc);
                }
                self.state.identity.unbind_item(&loc);
                self.bind_topic_identity(target, loc, IdentityKind::Item)?;
            }
            for loc in sids {
                if let Some(data) = self.state.topics.get_mut(&source) {
                    data.sids.remove(&loc);
                }
                self.state.identity.unbind_subject(&loc);
                self.bind_topic_identity(target, loc, IdentityKind::Subject)?;
            }
            for loc in slos {
                if let Some(data) = self.state.topics.get_mut(&source) {
                    data.slos.remove(&loc);
                }
                self.state.identity.unbind_subject_locator(&loc);
                self.bind_topic_identity(target, loc, IdentityKind::SubjectLocator)?;
            }
        }

        // 7. Remove the emptied source.
        self.remove_topic_internal(source)
    }

    fn set_scope_slot(&mut self, user: ConstructRef, scope: ScopeId) {
        match user {
            ConstructRef::Name(id) => {
                if let Some(data) = self.state.names.get_mut(&id) {
                    data.scope = scope;
                }
            }
            ConstructRef::Occurrence(id) => {
                if let Some(data) = self.state.occurrences.get_mut(&id) {
                    data.scope = scope;
                }
            }
            ConstructRef::Association(id) => {
                if let Some(data) = self.state.associations.get_mut(&id) {
                    data.scope = scope;
                }
            }
            ConstructRef::Variant(id) => {
                if let Some(data) = self.state.variants.get_mut(&id) {
                    data.scope = scope;
                }
            }
            _ => {}
        }
    }

    /// Re-hash a rescoped construct and collapse any duplicates this
    /// produced; for names the owned variants are refreshed too.
    fn refresh_scoped(&mut self, user: ConstructRef) -> Result<(), ModelError> {
        match user {
            ConstructRef::Name(id) => {
                self.rehash_name(id)?;
                let variants: Vec<VariantId> = match self.state.names.get(&id) {
                    Some(data) => data.variants.iter().copied().collect(),
                    None => Vec::new(),
                };
                for variant in variants {
                    self.rehash_variant(variant)?;
                    self.finalize(ConstructRef::Variant(variant))?;
                }
                self.finalize(user)?;
            }
            ConstructRef::Occurrence(id) => {
                self.rehash_occurrence(id)?;
                self.finalize(user)?;
            }
            ConstructRef::Association(id) => {
                self.rehash_association(id)?;
                self.finalize(user)?;
            }
            ConstructRef::Variant(id) => {
                self.rehash_variant(id)?;
                self.finalize(user)?;
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Topic-map merge

    /// Fold a whole topic map into this one. `source` is left untouched;
    /// topics are matched by shared identity (including the item/subject
    /// cross rule), characteristics and associations are copied through the
    /// normal create operations so dedup applies throughout.
    pub fn merge_from(&mut self, source: &TopicMap) -> Result<(), ModelError> {
        if source.id == self.id {
            return Ok(());
        }
        tracing::debug!(target = %self.id, source = %source.id, "merging topic maps");
        self.txn(|map| map.merge_from_inner(source))
    }

    fn merge_from_inner(&mut self, source: &TopicMap) -> Result<(), ModelError> {
        let mut mapping: BTreeMap<TopicId, TopicId> = BTreeMap::new();

        // Topics and identities. Identity copies go through the chokepoint,
        // so collisions inside the target fold topics together as they are
        // discovered; the mapping is re-pointed after each fold.
        for (src_id, data) in &source.state.topics {
            let mut found: Option<TopicId> = None;
            for loc in &data.sids {
                if let Some(t) = self.state.identity.subject(loc) {
                    found = Some(t);
                    break;
                }
                if let Some(ConstructRef::Topic(t)) = self.state.identity.item(loc) {
                    found = Some(t);
                    break;
                }
            }
            if found.is_none() {
                for loc in &data.slos {
                    if let Some(t) = self.state.identity.subject_locator(loc) {
                        found = Some(t);
                        break;
                    }
                }
            }
            if found.is_none() {
                for loc in &data.iids {
                    if let Some(ConstructRef::Topic(t)) = self.state.identity.item(loc) {
                        found = Some(t);
                        break;
                    }
                    if let Some(t) = self.state.identity.subject(loc) {
                        found = Some(t);
                        break;
                    }
                }
            }
            let topic = match found {
                Some(existing) => existing,
                None => self.create_topic_internal()?,
            };
            for loc in &data.sids {
                self.add_topic_identity(topic, loc.clone(), IdentityKind::Subject)?;
            }
            for loc in &data.slos {
                self.add_topic_identity(topic, loc.clone(), IdentityKind::SubjectLocator)?;
            }
            for loc in &data.iids {
                self.add_topic_identity(topic, loc.clone(), IdentityKind::Item)?;
            }
            for mapped in mapping.values_mut() {
                if !self.state.topics.contains_key(mapped) {
                    *mapped = topic;
                }
            }
            mapping.insert(*src_id, topic);
        }

        // Types.
        for (src_id, data) in &source.state.topics {
            let target = mapping[src_id];
            for ty in &data.types {
                self.add_topic_type(target, mapping[ty])?;
            }
        }

        // Names (with variants) and occurrences.
        for (src_id, data) in &source.state.topics {
            let target = mapping[src_id];
            for name_id in &data.names {
                let Some(name) = source.state.names.get(name_id) else {
                    continue;
                };
                let themes = map_themes(&source.state.scopes.themes(name.scope), &mapping);
                let draft = NameDraft {
                    value: name.value.clone(),
                    ty: Some(mapping[&name.ty]),
                    themes,
                };
                let copy = self.create_name(target, draft)?;
                for loc in &name.iids {
                    self.add_item_identifier(ConstructRef::Name(copy), loc.clone())?;
                }
                if let Some(reifier) = name.reifier {
                    self.fold_reifier(ConstructRef::Name(copy), reifier, &mut mapping)?;
                }
                for variant_id in &name.variants {
                    let Some(variant) = source.state.variants.get(variant_id) else {
                        continue;
                    };
                    let own = map_themes(&source.state.scopes.themes(variant.scope), &mapping);
                    let draft = VariantDraft {
                        literal: variant.literal.clone(),
                        themes: own,
                    };
                    let copy_variant = self.create_variant(copy, draft)?;
                    for loc in &variant.iids {
                        self.add_item_identifier(
                            ConstructRef::Variant(copy_variant),
                            loc.clone(),
                        )?;
                    }
                    if let Some(reifier) = variant.reifier {
                        self.fold_reifier(
                            ConstructRef::Variant(copy_variant),
                            reifier,
                            &mut mapping,
                        )?;
                    }
                }
            }
            for occurrence_id in &data.occurrences {
                let Some(occurrence) = source.state.occurrences.get(occurrence_id) else {
                    continue;
                };
                let themes = map_themes(&source.state.scopes.themes(occurrence.scope), &mapping);
                let draft = OccurrenceDraft {
                    ty: mapping[&occurrence.ty],
                    literal: occurrence.literal.clone(),
                    themes,
                };
                let copy = self.create_occurrence(target, draft)?;
                for loc in &occurrence.iids {
                    self.add_item_identifier(ConstructRef::Occurrence(copy), loc.clone())?;
                }
                if let Some(reifier) = occurrence.reifier {
                    self.fold_reifier(ConstructRef::Occurrence(copy), reifier, &mut mapping)?;
                }
            }
        }

        // The source map's own reifier folds into ours.
        if let Some(source_reifier) = source.state.reifier {
            self.fold_reifier(
                ConstructRef::TopicMap(self.id),
                source_reifier,
                &mut mapping,
            )?;
        }

        // Associations with their roles.
        for data in source.state.associations.values() {
            let themes = map_themes(&source.state.scopes.themes(data.scope), &mapping);
            let mut draft = AssociationDraft::new(mapping[&data.ty]).with_themes(themes);
            for role_id in &data.roles {
                if let Some(role) = source.state.roles.get(role_id) {
                    draft = draft.with_role(mapping[&role.ty], mapping[&role.player]);
                }
            }
            let association = self.create_association(draft)?;
            for loc in &data.iids {
                self.add_item_identifier(ConstructRef::Association(association), loc.clone())?;
            }
            if let Some(reifier) = data.reifier {
                self.fold_reifier(
                    ConstructRef::Association(association),
                    reifier,
                    &mut mapping,
                )?;
            }
            for role_id in &data.roles {
                let Some(role) = source.state.roles.get(role_id) else {
                    continue;
                };
                let Some(mine) = self.find_role(association, mapping[&role.ty], mapping[&role.player])
                else {
                    continue;
                };
                for loc in &role.iids {
                    self.add_item_identifier(ConstructRef::Role(mine), loc.clone())?;
                }
                if let Some(reifier) = role.reifier {
                    self.fold_reifier(ConstructRef::Role(mine), reifier, &mut mapping)?;
                }
            }
        }

        Ok(())
    }

    /// Fold a copied construct's reifier (a *source-map* topic id, resolved
    /// through `mapping`) onto the copy, merging reifier topics when the
    /// copy is already reified.
    fn fold_reifier(
        &mut self,
        target: ConstructRef,
        source_reifier: TopicId,
        mapping: &mut BTreeMap<TopicId, TopicId>,
    ) -> Result<(), ModelError> {
        let mapped = mapping[&source_reifier];
        match self.reifier_of(target) {
            None => {
                match self.state.identity.reified(mapped) {
                    None => {
                        self.set_reifier_slot(target, Some(mapped));
                        self.state.identity.bind_reified(mapped, target);
                        self.persist(target)
                    }
                    Some(reified) if reified == target => Ok(()),
                    Some(reified) => Err(ConstraintViolation {
                        construct: target,
                        reason: ConstraintReason::ReifierInUse {
                            reifier: mapped,
                            reified,
                        },
                    }
                    .into()),
                }
            }
            Some(existing) if existing == mapped => Ok(()),
            Some(existing) => {
                self.merge_topics(existing, mapped)?;
                for value in mapping.values_mut() {
                    if !self.state.topics.contains_key(value) {
                        *value = existing;
                    }
                }
                Ok(())
            }
        }
    }
}

fn map_themes(
    themes: &BTreeSet<TopicId>,
    mapping: &BTreeMap<TopicId, TopicId>,
) -> Vec<TopicId> {
    themes.iter().map(|theme| mapping[theme]).collect()
}
