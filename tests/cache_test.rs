// tests/cache_test.rs
//
// End-to-end coverage of the public `Cache` API against an in-memory
// store: read, field lookups, a field update round-trip, search, sort,
// and marks.

use bookcache::fields::FieldValue;
use bookcache::store::mock::MockStore;
use bookcache::{Cache, Preferences, UpdateValue, Value};
use std::collections::HashMap;

fn seeded_store() -> MockStore {
    let mut store = MockStore::new();
    store.seed_id_map(
        "titles",
        vec![
            (1, Value::from("The Left Hand of Darkness")),
            (2, Value::from("A Wizard of Earthsea")),
            (3, Value::from("The Dispossessed")),
        ],
    );
    store.seed_id_map("tags", vec![(10, Value::from("sci-fi")), (11, Value::from("fantasy"))]);
    store.seed_many_to_many("tags", vec![(1, 10), (3, 10), (2, 11)]);
    store.seed_id_map("authors", vec![(20, Value::from("Ursula K. Le Guin"))]);
    store.seed_many_to_many_priority("authors", vec![(1, 20, 0), (2, 20, 0), (3, 20, 0)]);
    store
}

#[test]
fn read_populates_fields_and_view() {
    let store = seeded_store();
    let cache = Cache::new(Preferences::default());
    cache.read(&store).unwrap();

    assert_eq!(cache.view_book_ids(), vec![1, 2, 3]);
    match cache.field_value("tags", 1) {
        FieldValue::Multi(tags) => assert_eq!(tags, vec![Value::from("sci-fi")]),
        other => panic!("expected Multi, got {other:?}"),
    }
    match cache.field_value("title", 2) {
        FieldValue::Single(Value::Text(t)) => assert_eq!(t, "A Wizard of Earthsea"),
        other => panic!("expected a title, got {other:?}"),
    }
}

#[test]
fn search_restricts_to_matching_books() {
    let store = seeded_store();
    let cache = Cache::new(Preferences::default());
    cache.read(&store).unwrap();

    cache.search(Some("fantasy".into()));
    assert_eq!(cache.view_book_ids(), vec![2]);

    cache.search(None);
    assert_eq!(cache.view_book_ids(), vec![1, 2, 3]);
}

#[test]
fn multisort_orders_by_title_descending() {
    let store = seeded_store();
    let cache = Cache::new(Preferences::default());
    cache.read(&store).unwrap();

    cache.multisort("title", false);
    // Descending by title text: "The Left Hand..." > "The Dispossessed" > "A Wizard..."
    assert_eq!(cache.view_book_ids(), vec![1, 3, 2]);
}

#[test]
fn update_field_adds_tag_and_refreshes_reciprocal_lookup() {
    let store = seeded_store();
    let cache = Cache::new(Preferences::default());
    cache.read(&store).unwrap();

    let mut changes = HashMap::new();
    changes.insert(2, UpdateValue::One(10));
    cache.update_field(&store, "tags", changes, HashMap::new(), false).unwrap();

    match cache.field_value("tags", 2) {
        FieldValue::Multi(tags) => {
            assert!(tags.contains(&Value::from("sci-fi")));
            assert!(tags.contains(&Value::from("fantasy")));
        }
        other => panic!("expected Multi, got {other:?}"),
    }
}

#[test]
fn marks_persist_across_view_refresh() {
    let store = seeded_store();
    let cache = Cache::new(Preferences::default());
    cache.read(&store).unwrap();

    cache.mark(2);
    cache.search(Some("dispossessed".into()));
    assert!(cache.is_marked(2));
}

#[test]
fn author_sort_falls_back_without_a_stored_override() {
    let store = seeded_store();
    let cache = Cache::new(Preferences::default());
    cache.read(&store).unwrap();

    assert_eq!(cache.author_sort(1), "Le Guin, Ursula K.");
}
