//! Index projections: pure read-models that reflect merges immediately.

mod fixtures;

use fixtures::{loc, single_map_system, the_map};
use mappa::{AssociationDraft, Literal, NameDraft, OccurrenceDraft, VariantDraft};

#[test]
fn type_instance_index_groups_by_type() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let city = map.create_topic().unwrap();
    let oslo = map.create_topic().unwrap();
    let bergen = map.create_topic().unwrap();
    map.add_topic_type(oslo, city).unwrap();
    map.add_topic_type(bergen, city).unwrap();
    let untyped = map.create_topic().unwrap();

    let index = map.type_instance_index();
    let cities: Vec<_> = index.topics_of(city).collect();
    assert_eq!(cities.len(), 2);
    assert!(cities.contains(&oslo) && cities.contains(&bergen));
    assert!(index.untyped_topics().any(|t| t == untyped));
    assert!(index.topic_types().any(|t| t == city));
}

#[test]
fn literal_index_groups_by_exact_value_and_datatype() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let ty = map.create_topic().unwrap();
    let name = map.create_name(topic, NameDraft::new("Oslo")).unwrap();
    let occ_str = map
        .create_occurrence(topic, OccurrenceDraft::new(ty, Literal::string("42")))
        .unwrap();
    map.create_occurrence(
        topic,
        OccurrenceDraft::new(ty, Literal::new("42", loc("dt:int"))),
    )
    .unwrap();

    let index = map.literal_index();
    assert_eq!(index.names_by_value("Oslo").collect::<Vec<_>>(), vec![name]);
    assert!(index.names_by_value("Bergen").next().is_none());
    let hits: Vec<_> = index
        .occurrences_by_literal("42", &mappa::Locator::xsd_string())
        .collect();
    assert_eq!(hits, vec![occ_str]);
}

#[test]
fn scoped_index_covers_themes_and_exact_scopes() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let topic = map.create_topic().unwrap();
    let theme = map.create_topic().unwrap();
    let other = map.create_topic().unwrap();
    let name = map
        .create_name(topic, NameDraft::new("scoped").with_theme(theme))
        .unwrap();
    let variant = map
        .create_variant(name, VariantDraft::new(Literal::string("v")).with_theme(other))
        .unwrap();

    let index = map.scoped_index();
    assert!(index.names_by_theme(theme).any(|n| n == name));
    assert!(index.name_themes().any(|t| t == theme));
    // The variant's effective scope includes the parent name's theme.
    assert!(index.variants_by_theme(theme).any(|v| v == variant));
    assert!(index.variants_by_theme(other).any(|v| v == variant));
    assert!(index
        .names_by_scope(&[theme].into_iter().collect())
        .any(|n| n == name));
    assert!(index
        .variants_by_scope(&[theme, other].into_iter().collect())
        .any(|v| v == variant));
}

#[test]
fn indexes_reflect_merges_immediately() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let ty = map.create_topic().unwrap();
    let target = map.create_topic().unwrap();
    map.add_subject_identifier(target, loc("sid:t")).unwrap();
    let source = map.create_topic().unwrap();
    map.add_topic_type(source, ty).unwrap();
    map.create_name(source, NameDraft::new("Merged")).unwrap();

    map.merge_topics(target, source).unwrap();

    let index = map.type_instance_index();
    assert!(index.topics_of(ty).any(|t| t == target));
    assert!(index.topics_of(ty).all(|t| t != source));

    let literals = map.literal_index();
    let holder: Vec<_> = literals
        .names_by_value("Merged")
        .map(|n| map.name(n).unwrap().parent())
        .collect();
    assert_eq!(holder, vec![target]);
}

#[test]
fn association_projections_follow_role_reassignment() {
    let mut system = single_map_system();
    let map = the_map(&mut system);

    let assoc_type = map.create_topic().unwrap();
    let role_type = map.create_topic().unwrap();
    let target = map.create_topic().unwrap();
    let source = map.create_topic().unwrap();
    let theme = map.create_topic().unwrap();

    map.create_association(
        AssociationDraft::new(assoc_type)
            .with_role(role_type, source)
            .with_theme(theme),
    )
    .unwrap();

    map.merge_topics(target, source).unwrap();

    let index = map.type_instance_index();
    let associations: Vec<_> = index.associations_of(assoc_type).collect();
    assert_eq!(associations.len(), 1);
    let players: Vec<_> = map
        .association(associations[0])
        .unwrap()
        .roles()
        .iter()
        .map(|r| map.role(*r).unwrap().player())
        .collect();
    assert_eq!(players, vec![target]);

    let scoped = map.scoped_index();
    assert!(scoped
        .associations_by_theme(theme)
        .any(|a| a == associations[0]));
}
