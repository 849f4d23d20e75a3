mod common;

use keepsake::{CoreError, Entity, EntityQuery, Error, FieldValue};
use tempfile::TempDir;

use common::{open_store, register_music, register_scenario};

fn owner_named(name: &'static str) -> EntityQuery {
    EntityQuery::new().test("owner", move |owner| {
        owner
            .as_entity()
            .is_some_and(|o| o.get_str("name").is_ok_and(|n| n == name))
    })
}

#[test]
fn test_filter_exclude_scenario() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp);
    register_scenario(&store);

    let a = store.build("A").with("name", "x").create().unwrap();
    let b = store
        .build("B")
        .with("owner", &a)
        .with("tags", Vec::<Entity>::new())
        .create()
        .unwrap();

    let kept = store.filter("B", &owner_named("x")).unwrap();
    assert_eq!(kept.into_vec(), vec![b]);
    let dropped = store.exclude("B", &owner_named("x")).unwrap();
    assert!(dropped.is_empty());
}

#[test]
fn test_filter_after_restart_resolves() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp);
    register_scenario(&store);

    let x = store.build("A").with("name", "x").create().unwrap();
    let y = store.build("A").with("name", "y").create().unwrap();
    let bx = store.build("B").with("owner", &x).create().unwrap();
    store.build("B").with("owner", &y).create().unwrap();

    let reopened = open_store(&tmp);
    register_scenario(&reopened);
    let kept = reopened.filter("B", &owner_named("x")).unwrap();
    assert_eq!(kept.ids(), vec![bx.id().clone()]);
}

#[test]
fn test_filter_and_exclude_partition() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp);
    register_music(&store);

    for (title, plays) in [("a", 1), ("b", 5), ("c", 9), ("d", 5)] {
        store
            .build("Song")
            .with("title", title)
            .with("plays", plays)
            .create()
            .unwrap();
    }

    let popular = EntityQuery::new().test("plays", |p| p.as_int().is_some_and(|n| n >= 5));
    let kept = store.filter("Song", &popular).unwrap();
    let dropped = store.exclude("Song", &popular).unwrap();
    assert_eq!(kept.len(), 3);
    assert_eq!(dropped.len(), 1);
    assert_eq!(kept.len() + dropped.len(), store.count("Song").unwrap());
    assert!(kept.iter().all(|s| !dropped.contains(s)));

    // Literal equality
    let five = store
        .filter("Song", &EntityQuery::new().eq("plays", 5))
        .unwrap();
    assert_eq!(five.len(), 2);

    // Every predicate must hold, or any one in `any` mode
    let both = EntityQuery::new().eq("plays", 5).eq("title", "b");
    assert_eq!(store.filter("Song", &both).unwrap().len(), 1);
    let either = EntityQuery::new().eq("plays", 1).eq("title", "c").any();
    assert_eq!(store.filter("Song", &either).unwrap().len(), 2);

    // Exclude keeps elements where every predicate is false
    let neither = EntityQuery::new().eq("plays", 1).eq("title", "c");
    let rest = store.exclude("Song", &neither).unwrap();
    let mut titles: Vec<String> = rest.iter().map(|s| s.get_str("title").unwrap()).collect();
    titles.sort();
    assert_eq!(titles, ["b", "d"]);

    // Empty queries
    assert_eq!(store.filter("Song", &EntityQuery::new()).unwrap().len(), 4);
    assert!(store
        .filter("Song", &EntityQuery::new().any())
        .unwrap()
        .is_empty());
}

#[test]
fn test_unknown_field_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp);
    register_scenario(&store);

    // Checked even when there is nothing to evaluate
    let query = EntityQuery::new().eq("colour", "red");
    let err = store.filter("A", &query).unwrap_err();
    assert!(matches!(
        err,
        Error::Core(CoreError::UnknownField { field, .. }) if field == "colour"
    ));

    let a = store.build("A").with("name", "x").create().unwrap();
    let b = store.build("B").with("owner", &a).create().unwrap();
    assert!(store.exclude("A", &query).is_err());
    assert!(b.collection("tags").unwrap().filter(&query).is_err());
}

#[test]
fn test_collection_queries_are_detached() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp);
    register_music(&store);

    let playlist = store.build("Playlist").with("title", "Mix").create().unwrap();
    let queue = playlist.collection("songs").unwrap();
    for (title, plays) in [("a", 3), ("b", 1), ("c", 2)] {
        let song = store
            .build("Song")
            .with("title", title)
            .with("plays", plays)
            .create()
            .unwrap();
        queue.add(&song).unwrap();
    }

    let played = EntityQuery::new().test("plays", |p| p.as_int().is_some_and(|n| n > 1));
    let selection = queue.filter(&played).unwrap();
    assert_eq!(selection.len(), 2);
    assert_eq!(queue.exclude(&played).unwrap().len(), 1);

    // Sorting a selection leaves the collection alone
    let sorted = selection.sort_by_key(|s| s.get_int("plays").unwrap_or_default());
    let titles: Vec<String> = sorted.iter().map(|s| s.get_str("title").unwrap()).collect();
    assert_eq!(titles, ["c", "a"]);
    assert_eq!(queue.len().unwrap(), 3);

    // Filtering a selection further
    let only_a = sorted
        .filter(&EntityQuery::new().eq("title", "a"))
        .unwrap();
    assert_eq!(only_a.len(), 1);
}

#[test]
fn test_sample_and_sort() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp);
    register_scenario(&store);

    for name in ["c", "a", "b"] {
        store.build("A").with("name", name).create().unwrap();
    }
    let all = store.all("A").unwrap();

    let sample = all.sample(2);
    assert_eq!(sample.len(), 2);
    assert!(sample.iter().all(|e| all.contains(e)));
    assert_ne!(sample.get(0), sample.get(1));
    assert_eq!(all.sample(10).len(), 3);

    let sorted = all.sort_by(|x, y| {
        x.get_str("name")
            .unwrap()
            .cmp(&y.get_str("name").unwrap())
    });
    let names: Vec<FieldValue> = sorted.iter().map(|e| e.get("name").unwrap()).collect();
    assert_eq!(
        names,
        vec![
            FieldValue::from("a"),
            FieldValue::from("b"),
            FieldValue::from("c")
        ]
    );
}
