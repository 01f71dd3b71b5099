//! Duplicate prevention and the finalize pass.

mod fixtures;

use fixtures::{loc, single_map_system, the_map};
use mappa::{
    psi, AssociationDraft, ConstructRef, Features, Literal, NameDraft, OccurrenceDraft,
    SystemBuilder,
};

#[test]
fn create_name_is_idempotent() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let first = map.create_name(topic, NameDraft::new("Norway")).unwrap();
    let second = map.create_name(topic, NameDraft::new("Norway")).unwrap();

    assert_eq!(first, second);
    assert_eq!(map.topic(topic).unwrap().names().len(), 1);
}

#[test]
fn create_name_hash_is_theme_order_independent() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let th1 = map.create_topic().unwrap();
    let th2 = map.create_topic().unwrap();

    let a = map
        .create_name(topic, NameDraft::new("Norge").with_themes([th1, th2]))
        .unwrap();
    let b = map
        .create_name(topic, NameDraft::new("Norge").with_themes([th2, th1]))
        .unwrap();

    assert_eq!(a, b);
}

#[test]
fn create_occurrence_is_idempotent_per_datatype() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let ty = map.create_topic().unwrap();

    let a = map
        .create_occurrence(topic, OccurrenceDraft::new(ty, Literal::string("42")))
        .unwrap();
    let b = map
        .create_occurrence(topic, OccurrenceDraft::new(ty, Literal::string("42")))
        .unwrap();
    let c = map
        .create_occurrence(
            topic,
            OccurrenceDraft::new(ty, Literal::new("42", loc("dt:int"))),
        )
        .unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(map.topic(topic).unwrap().occurrences().len(), 2);
}

#[test]
fn equal_associations_in_unconstrained_scope_collapse_to_one() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let ty = map.create_topic().unwrap();
    let role_type = map.create_topic().unwrap();
    let player = map.create_topic().unwrap();

    let a1 = map
        .create_association(AssociationDraft::new(ty).with_role(role_type, player))
        .unwrap();
    let a2 = map
        .create_association(AssociationDraft::new(ty).with_role(role_type, player))
        .unwrap();

    assert_eq!(a1, a2);
    assert_eq!(map.associations().count(), 1);
}

#[test]
fn finalize_collapses_names_mutated_into_equality() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let th1 = map.create_topic().unwrap();
    let th2 = map.create_topic().unwrap();

    let name1 = map
        .create_name(topic, NameDraft::new("Name1").with_themes([th1, th2]))
        .unwrap();
    let name2 = map.create_name(topic, NameDraft::new("Name2")).unwrap();
    assert_ne!(name1, name2);

    map.set_name_value(name2, "Name1").unwrap();
    map.add_name_theme(name2, th1).unwrap();
    map.add_name_theme(name2, th2).unwrap();
    assert!(map.finalize(ConstructRef::Name(name2)).unwrap());

    let names = map.topic(topic).unwrap().names().clone();
    assert_eq!(names.len(), 1);
    let survivor = map.name(*names.iter().next().unwrap()).unwrap();
    assert_eq!(survivor.value(), "Name1");
    let themes = map.scope_themes(survivor.scope());
    assert_eq!(themes, [th1, th2].into_iter().collect());

    // Default name type on the survivor.
    let ty = map.topic(survivor.name_type()).unwrap();
    assert!(ty.subject_identifiers().contains(&loc(psi::TOPIC_NAME)));
}

#[test]
fn finalize_folds_item_identifiers_and_variants_onto_survivor() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let th = map.create_topic().unwrap();

    let keep = map.create_name(topic, NameDraft::new("x")).unwrap();
    let dup = map.create_name(topic, NameDraft::new("y")).unwrap();
    map.add_item_identifier(ConstructRef::Name(dup), loc("iid:dup-name"))
        .unwrap();
    let variant = map
        .create_variant(
            dup,
            mappa::VariantDraft::new(Literal::string("sort-key")).with_theme(th),
        )
        .unwrap();

    map.set_name_value(keep, "y").unwrap();
    assert!(map.finalize(ConstructRef::Name(keep)).unwrap());

    assert!(map.name(dup).is_err());
    let survivor = map.name(keep).unwrap();
    assert!(survivor.item_identifiers().contains(&loc("iid:dup-name")));
    assert_eq!(survivor.variants().len(), 1);
    let moved = map.variant(*survivor.variants().iter().next().unwrap()).unwrap();
    assert_eq!(moved.value(), "sort-key");
    assert_eq!(moved.id(), variant);
}

#[test]
fn auto_duplicate_removal_fires_inline() {
    let mut system = SystemBuilder::new()
        .features(Features {
            automerge: true,
            auto_duplicate_removal: true,
        })
        .build();
    let map = system
        .create_topic_map(loc("http://example.org/maps/auto"))
        .unwrap();

    let topic = map.create_topic().unwrap();
    let keep = map.create_name(topic, NameDraft::new("a")).unwrap();
    let dup = map.create_name(topic, NameDraft::new("b")).unwrap();
    assert_ne!(keep, dup);

    // No explicit finalize: the setter collapses the duplicate itself.
    map.set_name_value(dup, "a").unwrap();
    assert_eq!(map.topic(topic).unwrap().names().len(), 1);
}

#[test]
fn finalize_without_duplicates_reports_nothing() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let name = map.create_name(topic, NameDraft::new("only")).unwrap();
    assert!(!map.finalize(ConstructRef::Name(name)).unwrap());
}
