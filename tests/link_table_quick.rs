// tests/link_table_quick.rs
//
// Property-based checks of the reciprocal-index invariant (spec section
// 7): for every link table, `d` appears under `book_col_map[s]` iff `s`
// appears under `col_book_map[d]`. Uses quickcheck the same way the
// evmap crate this workspace was built from exercises its own map.

use bookcache::store::mock::MockStore;
use bookcache::{LinkTable, Value, Variant};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::collections::HashSet;

fn build_table(rows: &[(i64, i64)]) -> LinkTable {
    let mut store = MockStore::new();
    let dst_ids: HashSet<i64> = rows.iter().map(|(_, d)| *d).collect();
    store.seed_id_map("tags", dst_ids.into_iter().map(|id| (id, Value::from(format!("t{id}")))).collect());
    store.seed_many_to_many("tags", rows.to_vec());
    let known: HashSet<i64> = rows.iter().map(|(s, _)| *s).collect();
    let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
    table.read(&store, &known).unwrap();
    table
}

#[quickcheck]
fn reciprocal_index_holds(rows: Vec<(i64, i64)>) -> TestResult {
    if rows.iter().any(|(s, d)| *s <= 0 || *d <= 0) {
        return TestResult::discard();
    }
    let table = build_table(&rows);
    for &(src, dst) in &rows {
        if !table.ids_for_book(src).contains(&dst) {
            return TestResult::failed();
        }
        if !table.books_for(dst).contains(&src) {
            return TestResult::failed();
        }
    }
    TestResult::passed()
}

#[quickcheck]
fn read_is_idempotent(rows: Vec<(i64, i64)>) -> TestResult {
    if rows.iter().any(|(s, d)| *s <= 0 || *d <= 0) {
        return TestResult::discard();
    }
    let mut store = MockStore::new();
    let dst_ids: HashSet<i64> = rows.iter().map(|(_, d)| *d).collect();
    store.seed_id_map("tags", dst_ids.into_iter().map(|id| (id, Value::from(format!("t{id}")))).collect());
    store.seed_many_to_many("tags", rows.clone());
    let known: HashSet<i64> = rows.iter().map(|(s, _)| *s).collect();

    let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
    table.read(&store, &known).unwrap();
    let first: Vec<i64> = known.iter().flat_map(|&s| table.ids_for_book(s)).collect();

    table.read(&store, &known).unwrap();
    let second: Vec<i64> = known.iter().flat_map(|&s| table.ids_for_book(s)).collect();

    TestResult::from_bool(first == second)
}
