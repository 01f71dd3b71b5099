//! Identity collisions and the topic merge algorithm.

mod fixtures;

use std::collections::BTreeSet;

use fixtures::{loc, single_map_system, system_with, the_map};
use mappa::{
    AssociationDraft, ConstructRef, Features, Literal, ModelError, NameDraft, OccurrenceDraft,
    TopicMap,
};

#[test]
fn item_identifier_matching_subject_identifier_merges_topics() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let t1 = map.create_topic().unwrap();
    map.add_subject_identifier(t1, loc("sid:A")).unwrap();
    let t2 = map.create_topic().unwrap();

    map.add_item_identifier(ConstructRef::Topic(t2), loc("sid:A"))
        .unwrap();

    assert!(map.topic(t1).is_err(), "source topic must be gone");
    let survivor = map.topic(t2).unwrap();
    assert!(survivor.subject_identifiers().contains(&loc("sid:A")));
    assert!(survivor.item_identifiers().contains(&loc("sid:A")));
    assert_eq!(map.topics().count(), 1);
}

#[test]
fn identity_collision_without_automerge_is_a_conflict() {
    let mut system = system_with(Features {
        automerge: false,
        auto_duplicate_removal: false,
    });
    let map = system
        .create_topic_map(loc("http://example.org/maps/no-automerge"))
        .unwrap();

    let t1 = map.create_topic().unwrap();
    map.add_subject_identifier(t1, loc("sid:A")).unwrap();
    let t2 = map.create_topic().unwrap();

    let err = map
        .add_item_identifier(ConstructRef::Topic(t2), loc("sid:A"))
        .unwrap_err();
    let ModelError::Identity(conflict) = err else {
        panic!("expected identity conflict, got {err}");
    };
    assert_eq!(conflict.locator, loc("sid:A"));
    assert_eq!(conflict.existing, ConstructRef::Topic(t1));
    assert_eq!(conflict.acting, ConstructRef::Topic(t2));

    // Both topics survive untouched.
    assert!(map.topic(t1).is_ok());
    assert!(map.topic(t2).is_ok());
}

#[test]
fn merge_moves_characteristics_types_and_identities() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let ty = map.create_topic().unwrap();
    let occurrence_type = map.create_topic().unwrap();

    let target = map.create_topic().unwrap();
    map.add_subject_identifier(target, loc("sid:target")).unwrap();
    map.create_name(target, NameDraft::new("Target")).unwrap();

    let source = map.create_topic().unwrap();
    map.add_subject_identifier(source, loc("sid:source")).unwrap();
    map.add_subject_locator(source, loc("http://example.org/source"))
        .unwrap();
    map.add_topic_type(source, ty).unwrap();
    map.create_name(source, NameDraft::new("Source")).unwrap();
    map.create_occurrence(
        source,
        OccurrenceDraft::new(occurrence_type, Literal::string("payload")),
    )
    .unwrap();

    map.merge_topics(target, source).unwrap();

    assert!(map.topic(source).is_err());
    let survivor = map.topic(target).unwrap();
    assert!(survivor.subject_identifiers().contains(&loc("sid:target")));
    assert!(survivor.subject_identifiers().contains(&loc("sid:source")));
    assert!(survivor
        .subject_locators()
        .contains(&loc("http://example.org/source")));
    assert!(survivor.types().contains(&ty));

    let values: BTreeSet<String> = survivor
        .names()
        .iter()
        .map(|id| map.name(*id).unwrap().value().to_string())
        .collect();
    assert_eq!(values, ["Target".to_string(), "Source".to_string()].into());
    assert_eq!(survivor.occurrences().len(), 1);
}

#[test]
fn merge_deduplicates_equal_characteristics() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let target = map.create_topic().unwrap();
    map.create_name(target, NameDraft::new("Shared")).unwrap();
    let source = map.create_topic().unwrap();
    map.create_name(source, NameDraft::new("Shared")).unwrap();

    map.merge_topics(target, source).unwrap();
    assert_eq!(map.topic(target).unwrap().names().len(), 1);
}

#[test]
fn merge_reassigns_role_players_and_drops_duplicate_roles() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let assoc_type = map.create_topic().unwrap();
    let role_type = map.create_topic().unwrap();
    let other = map.create_topic().unwrap();
    let other_role = map.create_topic().unwrap();

    let target = map.create_topic().unwrap();
    let source = map.create_topic().unwrap();

    // Two structurally identical associations, one played by target, one by
    // source: the merge makes them equal and collapses them.
    let a1 = map
        .create_association(
            AssociationDraft::new(assoc_type)
                .with_role(role_type, target)
                .with_role(other_role, other),
        )
        .unwrap();
    let a2 = map
        .create_association(
            AssociationDraft::new(assoc_type)
                .with_role(role_type, source)
                .with_role(other_role, other),
        )
        .unwrap();
    assert_ne!(a1, a2);

    map.merge_topics(target, source).unwrap();

    assert_eq!(map.associations().count(), 1);
    let survivor = map.associations().next().unwrap();
    let players: BTreeSet<_> = survivor
        .roles()
        .iter()
        .map(|id| map.role(*id).unwrap().player())
        .collect();
    assert!(players.contains(&target));
    assert!(!players.contains(&source));
}

#[test]
fn merge_substitutes_source_in_scopes_and_rehashes() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let target = map.create_topic().unwrap();
    let source = map.create_topic().unwrap();

    // Same value scoped once by target, once by source: after the merge both
    // scopes are the same set and the names collapse.
    map.create_name(topic, NameDraft::new("N").with_theme(target))
        .unwrap();
    map.create_name(topic, NameDraft::new("N").with_theme(source))
        .unwrap();
    assert_eq!(map.topic(topic).unwrap().names().len(), 2);

    map.merge_topics(target, source).unwrap();

    let names = map.topic(topic).unwrap().names().clone();
    assert_eq!(names.len(), 1);
    let themes = map.scope_themes(map.name(*names.iter().next().unwrap()).unwrap().scope());
    assert_eq!(themes, [target].into_iter().collect());
}

#[test]
fn merge_moves_reification_link() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let name = map.create_name(topic, NameDraft::new("reified")).unwrap();

    let target = map.create_topic().unwrap();
    let source = map.create_topic().unwrap();
    map.set_reifier(ConstructRef::Name(name), Some(source)).unwrap();

    map.merge_topics(target, source).unwrap();

    assert_eq!(map.reified_by(target), Some(ConstructRef::Name(name)));
    assert_eq!(map.name(name).unwrap().reifier(), Some(target));
}

#[test]
fn merge_of_topics_reifying_different_constructs_fails_and_rolls_back() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let name_a = map.create_name(topic, NameDraft::new("a")).unwrap();
    let name_b = map.create_name(topic, NameDraft::new("b")).unwrap();

    let t1 = map.create_topic().unwrap();
    map.add_subject_identifier(t1, loc("sid:r1")).unwrap();
    map.create_name(t1, NameDraft::new("reifier one")).unwrap();
    let t2 = map.create_topic().unwrap();
    map.add_subject_identifier(t2, loc("sid:r2")).unwrap();

    map.set_reifier(ConstructRef::Name(name_a), Some(t1)).unwrap();
    map.set_reifier(ConstructRef::Name(name_b), Some(t2)).unwrap();

    let err = map.merge_topics(t1, t2).unwrap_err();
    assert!(matches!(err, ModelError::Constraint(_)), "{err}");

    // Atomic boundary: the failed merge left no partial state behind.
    assert!(map.topic(t1).is_ok());
    assert!(map.topic(t2).is_ok());
    assert_eq!(map.reified_by(t1), Some(ConstructRef::Name(name_a)));
    assert_eq!(map.reified_by(t2), Some(ConstructRef::Name(name_b)));
    assert!(map.topic(t1).unwrap().subject_identifiers().contains(&loc("sid:r1")));
    assert!(map.topic(t2).unwrap().subject_identifiers().contains(&loc("sid:r2")));
    assert_eq!(map.topic(t1).unwrap().names().len(), 1);
}

fn observable_names(map: &TopicMap, sid: &str) -> BTreeSet<String> {
    let topic = map.topic_by_subject_identifier(&loc(sid)).unwrap();
    map.topic(topic)
        .unwrap()
        .names()
        .iter()
        .map(|id| map.name(*id).unwrap().value().to_string())
        .collect()
}

#[test]
fn merge_outcome_is_symmetric_up_to_surviving_id() {
    let build = |map: &mut TopicMap| {
        let a = map.create_topic().unwrap();
        map.add_subject_identifier(a, loc("sid:keep")).unwrap();
        map.create_name(a, NameDraft::new("Alpha")).unwrap();
        let b = map.create_topic().unwrap();
        map.add_subject_identifier(b, loc("sid:fold")).unwrap();
        map.create_name(b, NameDraft::new("Beta")).unwrap();
        (a, b)
    };

    let mut system_ab = single_map_system();
    let map_ab = the_map(&mut system_ab);
    let (a, b) = build(map_ab);
    map_ab.merge_topics(a, b).unwrap();

    let mut system_ba = single_map_system();
    let map_ba = the_map(&mut system_ba);
    let (a2, b2) = build(map_ba);
    map_ba.merge_topics(b2, a2).unwrap();

    // Both directions leave one topic holding both identities and both
    // names; only the surviving id differs.
    for (map, survivor_sid) in [(&*map_ab, "sid:keep"), (&*map_ba, "sid:fold")] {
        let survivor = map.topic_by_subject_identifier(&loc(survivor_sid)).unwrap();
        let data = map.topic(survivor).unwrap();
        assert!(data.subject_identifiers().contains(&loc("sid:keep")));
        assert!(data.subject_identifiers().contains(&loc("sid:fold")));
    }
    assert_eq!(
        observable_names(map_ab, "sid:keep"),
        observable_names(map_ba, "sid:fold")
    );
}

#[test]
fn merge_with_self_is_a_noop() {
    let mut system = single_map_system();
    let map = the_map(&mut system);
    let topic = map.create_topic().unwrap();
    map.create_name(topic, NameDraft::new("self")).unwrap();
    map.merge_topics(topic, topic).unwrap();
    assert!(map.topic(topic).is_ok());
    assert_eq!(map.topic(topic).unwrap().names().len(), 1);
}
