#![allow(dead_code)]

use mappa::{Features, Locator, SystemBuilder, TopicMap, TopicMapSystem};

pub const MAP_IRI: &str = "http://example.org/maps/test";

pub fn loc(s: &str) -> Locator {
    Locator::new(s).unwrap()
}

pub fn system() -> TopicMapSystem {
    SystemBuilder::new().build()
}

pub fn system_with(features: Features) -> TopicMapSystem {
    SystemBuilder::new().features(features).build()
}

/// A system with one topic map under [`MAP_IRI`].
pub fn single_map_system() -> TopicMapSystem {
    let mut system = system();
    system.create_topic_map(loc(MAP_IRI)).unwrap();
    system
}

pub fn the_map(system: &mut TopicMapSystem) -> &mut TopicMap {
    system.topic_map_mut(&loc(MAP_IRI)).unwrap()
}
