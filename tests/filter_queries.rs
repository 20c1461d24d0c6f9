//! Filter compilation and execution against a live store

use chrono::NaiveDate;
use quilldb::{
    Document, Error, FieldType, ScalarType, Store, StoreOptions, Value,
};
use tempfile::TempDir;

fn open_store_with(options: StoreOptions) -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open_with(dir.path().join("store.db"), options).unwrap();
    (dir, store)
}

/// Two subjects with ages, tags and birth dates
fn populated_store(options: StoreOptions) -> (TempDir, Store) {
    let (dir, store) = open_store_with(options);
    let session = store.write_session().unwrap();
    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    session
        .declare_field("subject", "age", FieldType::INTEGER)
        .unwrap();
    session
        .declare_field("subject", "tags", FieldType::list_of(ScalarType::String))
        .unwrap();
    session
        .declare_field("subject", "born", FieldType::DATE)
        .unwrap();
    session
        .declare_field("subject", "meta", FieldType::JSON)
        .unwrap();
    session
        .insert(
            "subject",
            &Document::new()
                .with("subject_id", "s1")
                .with("age", 30i64)
                .with("tags", vec!["a", "b"])
                .with("born", NaiveDate::from_ymd_opt(1995, 1, 10).unwrap()),
        )
        .unwrap();
    session
        .insert(
            "subject",
            &Document::new()
                .with("subject_id", "s2")
                .with("age", 45i64)
                .with("born", NaiveDate::from_ymd_opt(1980, 7, 2).unwrap()),
        )
        .unwrap();
    session.commit().unwrap();
    (dir, store)
}

fn ids(store: &Store, filter: &str) -> Vec<String> {
    let reader = store.read_session().unwrap();
    let mut found: Vec<String> = reader
        .search("subject", filter)
        .unwrap()
        .documents
        .iter()
        .map(|doc| match doc.get("subject_id") {
            Some(Value::String(s)) => s.clone(),
            other => panic!("unexpected key {other:?}"),
        })
        .collect();
    found.sort();
    found
}

#[test]
fn test_numeric_range_filters() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "age > 40"), vec!["s2"]);
    assert_eq!(ids(&store, "age > 40 and age < 44"), Vec::<String>::new());
    assert_eq!(ids(&store, "age >= 30 and age <= 45"), vec!["s1", "s2"]);
    assert_eq!(ids(&store, "age == 30 or age == 45"), vec!["s1", "s2"]);
    assert_eq!(ids(&store, "age != 30"), vec!["s2"]);
}

#[test]
fn test_list_membership() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "\"b\" in tags"), vec!["s1"]);
    assert_eq!(ids(&store, "\"c\" in tags"), Vec::<String>::new());
    // s2 has no tags at all and never matches a membership test
    assert_eq!(ids(&store, "not (\"b\" in tags)"), vec!["s2"]);
}

#[test]
fn test_membership_fallback_matches_native() {
    let native = StoreOptions::default();
    let mut fallback = StoreOptions::default();
    fallback.capabilities.native_list_membership = false;

    let (_dir1, store_native) = populated_store(native);
    let (_dir2, store_fallback) = populated_store(fallback);
    for filter in [
        "\"b\" in tags",
        "\"c\" in tags",
        "\"a\" in tags and age < 40",
        "\"a\" in tags or age > 40",
        "not (\"b\" in tags)",
    ] {
        assert_eq!(
            ids(&store_native, filter),
            ids(&store_fallback, filter),
            "strategies disagree on {filter:?}"
        );
    }
}

#[test]
fn test_literal_list_membership() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "age in [30, 45]"), vec!["s1", "s2"]);
    assert_eq!(ids(&store, "age in [31]"), Vec::<String>::new());
    assert_eq!(ids(&store, "subject_id in [\"s2\"]"), vec!["s2"]);
    assert_eq!(ids(&store, "age in []"), Vec::<String>::new());
}

#[test]
fn test_null_comparisons() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "tags == null"), vec!["s2"]);
    assert_eq!(ids(&store, "tags != null"), vec!["s1"]);
    // a missing value never satisfies an ordinary comparison
    assert_eq!(ids(&store, "tags != null and age > 0"), vec!["s1"]);
}

#[test]
fn test_date_filters() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "born < 1990-01-01"), vec!["s2"]);
    assert_eq!(ids(&store, "born == 1995-01-10"), vec!["s1"]);
    assert_eq!(
        ids(&store, "born >= 1980-01-01 and born <= 1999-12-31"),
        vec!["s1", "s2"]
    );
}

#[test]
fn test_like_and_ilike() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "subject_id like \"s%\""), vec!["s1", "s2"]);
    assert_eq!(ids(&store, "subject_id like \"s_\""), vec!["s1", "s2"]);
    assert_eq!(ids(&store, "subject_id like \"%2\""), vec!["s2"]);
    assert_eq!(ids(&store, "subject_id ilike \"S1\""), vec!["s1"]);
    assert_eq!(ids(&store, "subject_id like \"S1\""), Vec::<String>::new());
}

#[test]
fn test_all_and_delimited_fields() {
    let (_dir, store) = populated_store(StoreOptions::default());
    assert_eq!(ids(&store, "all"), vec!["s1", "s2"]);
    assert_eq!(ids(&store, "{age} > 40"), vec!["s2"]);
    // field lookup inside filters is case-insensitive
    assert_eq!(ids(&store, "AGE > 40"), vec!["s2"]);
}

#[test]
fn test_field_to_field_comparison() {
    let (_dir, store) = populated_store(StoreOptions::default());
    let session = store.write_session().unwrap();
    session
        .declare_field("subject", "retest_age", FieldType::INTEGER)
        .unwrap();
    session
        .update(
            "subject",
            &[Value::from("s1")],
            &Document::new().with("retest_age", 32i64),
        )
        .unwrap();
    session.commit().unwrap();
    assert_eq!(ids(&store, "retest_age > age"), vec!["s1"]);
    // s2 has no retest_age, the comparison is unknown
    assert_eq!(ids(&store, "retest_age == age"), Vec::<String>::new());
}

#[test]
fn test_compile_errors() {
    let (_dir, store) = populated_store(StoreOptions::default());
    let reader = store.read_session().unwrap();

    let err = reader.search("subject", "age >").unwrap_err();
    assert!(matches!(err, Error::ParseError { .. }), "{err}");

    let err = reader.search("subject", "height > 2").unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }), "{err}");

    let err = reader.search("ghost", "all").unwrap_err();
    assert!(matches!(err, Error::UnknownCollection(_)), "{err}");

    // ordering on json is not defined
    let err = reader.search("subject", "meta > 3").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)), "{err}");

    // IN needs a list on the right
    let err = reader.search("subject", "age in 30").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)), "{err}");

    // string literal against an integer field
    let err = reader.search("subject", "age == \"old\"").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)), "{err}");

    // like on a non-string field
    let err = reader.search("subject", "age like \"4%\"").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)), "{err}");
}

#[test]
fn test_compilation_is_deterministic() {
    let (_dir, store) = populated_store(StoreOptions::default());
    let first = ids(&store, "age > 40 or \"a\" in tags");
    for _ in 0..5 {
        assert_eq!(ids(&store, "age > 40 or \"a\" in tags"), first);
    }
}
