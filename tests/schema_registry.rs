//! Schema declaration, resolution and removal through sessions

use quilldb::{Error, FieldType, ScalarType, Store, Value};
use tempfile::TempDir;

fn open_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("store.db")).unwrap();
    (dir, store)
}

#[test]
fn test_declare_and_resolve_round_trip() {
    let (_dir, store) = open_store();
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
    session.commit().unwrap();

    let reader = store.read_session().unwrap();
    let fields = reader.fields("subject").unwrap();
    let by_name = |name: &str| fields.iter().find(|f| f.name == name).unwrap();
    assert_eq!(by_name("subject_id").field_type, FieldType::STRING);
    assert!(by_name("subject_id").primary_key);
    assert_eq!(by_name("age").field_type, FieldType::INTEGER);
    assert!(!by_name("age").primary_key);
    assert_eq!(
        by_name("tags").field_type,
        FieldType::list_of(ScalarType::String)
    );

    let info = reader.collection("subject").unwrap();
    assert_eq!(info.name, "subject");
    assert_eq!(info.primary_key, vec!["subject_id".to_string()]);
    // physical identifiers are digests, not user names
    assert!(info.table.starts_with("i1_"));
    assert_ne!(info.table, "subject");
}

#[test]
fn test_duplicate_collection_is_case_insensitive() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection("x", &[("id", FieldType::STRING)])
        .unwrap();
    let err = session
        .declare_collection("X", &[("id", FieldType::STRING)])
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateCollection(_)), "{err}");
}

#[test]
fn test_field_lookup_is_case_insensitive() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    session
        .declare_field("subject", "Age", FieldType::INTEGER)
        .unwrap();
    let err = session
        .declare_field("subject", "AGE", FieldType::FLOAT)
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateField { .. }), "{err}");
    session.commit().unwrap();

    let reader = store.read_session().unwrap();
    let fields = reader.fields("SUBJECT").unwrap();
    assert!(fields.iter().any(|f| f.name == "Age"));
}

#[test]
fn test_unknown_collection_and_field() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    let err = session
        .declare_field("ghost", "age", FieldType::INTEGER)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownCollection(_)), "{err}");

    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    let err = session.remove_field("subject", "ghost").unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }), "{err}");
}

#[test]
fn test_primary_key_is_immutable() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    let err = session.remove_field("subject", "subject_id").unwrap_err();
    assert!(matches!(err, Error::ImmutablePrimaryKey { .. }), "{err}");
}

#[test]
fn test_composite_primary_key() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection(
            "visit",
            &[("subject_id", FieldType::STRING), ("visit_no", FieldType::INTEGER)],
        )
        .unwrap();
    session
        .insert(
            "visit",
            &quilldb::Document::new()
                .with("subject_id", "s1")
                .with("visit_no", 1i64),
        )
        .unwrap();
    session.commit().unwrap();

    let reader = store.read_session().unwrap();
    assert!(reader
        .has_document("visit", &[Value::from("s1"), Value::from(1i64)])
        .unwrap());
    assert!(!reader
        .has_document("visit", &[Value::from("s1"), Value::from(2i64)])
        .unwrap());
}

#[test]
fn test_list_typed_primary_key_rejected() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    let err = session
        .declare_collection("bad", &[("k", FieldType::list_of(ScalarType::String))])
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)), "{err}");
    let err = session.declare_collection("bad", &[]).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)), "{err}");
}

#[test]
fn test_remove_collection_drops_everything() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    session.commit().unwrap();

    let session = store.write_session().unwrap();
    session.remove_collection("subject").unwrap();
    session.commit().unwrap();

    let reader = store.read_session().unwrap();
    assert!(!reader.has_collection("subject").unwrap());
    assert!(reader.collection_names().unwrap().is_empty());
    assert!(matches!(
        reader.fields("subject").unwrap_err(),
        Error::UnknownCollection(_)
    ));
}

#[test]
fn test_field_description_and_default_round_trip() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    session
        .declare_field_with(
            "subject",
            "site",
            FieldType::STRING,
            Some("acquisition site"),
            Some(&Value::from("unknown")),
        )
        .unwrap();
    session.commit().unwrap();

    let reader = store.read_session().unwrap();
    let fields = reader.fields("subject").unwrap();
    let site = fields.iter().find(|f| f.name == "site").unwrap();
    assert_eq!(site.description.as_deref(), Some("acquisition site"));
    assert_eq!(site.default, Some(Value::from("unknown")));
}

#[test]
fn test_default_must_match_declared_type() {
    let (_dir, store) = open_store();
    let session = store.write_session().unwrap();
    session
        .declare_collection("subject", &[("subject_id", FieldType::STRING)])
        .unwrap();
    let err = session
        .declare_field_with(
            "subject",
            "age",
            FieldType::INTEGER,
            None,
            Some(&Value::from("not a number")),
        )
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)), "{err}");
    // the failed declaration left nothing behind
    assert!(session.fields("subject").unwrap().iter().all(|f| f.name != "age"));
}
