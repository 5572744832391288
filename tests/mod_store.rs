use bson::{doc, Bson};
use docgate::store::memory::MemoryStore;
use docgate::store::{
    FindOptions, IndexOptions, ModifyOptions, Order, PipelineStage, SortSpec, Store, StoreError,
};

fn upsert_new() -> ModifyOptions {
    ModifyOptions { upsert: true, return_new: true }
}

#[test]
fn insert_assigns_an_identifier() {
    let store = MemoryStore::new();
    let doc = store.insert("notes", doc! { "text": "hi" }).unwrap();
    assert!(doc.get_object_id("_id").is_ok());
    assert_eq!(store.count("notes", &doc! {}).unwrap(), 1);
}

#[test]
fn duplicate_identifier_is_rejected_with_the_store_code() {
    let store = MemoryStore::new();
    let doc = store.insert("notes", doc! { "text": "hi" }).unwrap();
    let id = doc.get_object_id("_id").unwrap();
    let err = store.insert("notes", doc! { "_id": id }).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
    assert_eq!(err.code(), Some(11000));
}

#[test]
fn find_and_modify_updates_and_returns_the_new_document() {
    let store = MemoryStore::new();
    let doc = store.insert("notes", doc! { "n": 1_i64 }).unwrap();
    let id = doc.get_object_id("_id").unwrap();
    let out = store
        .find_and_modify(
            "notes",
            &doc! { "_id": id },
            &doc! { "$inc": { "n": 2_i64 }, "$set": { "label": "x" } },
            upsert_new(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(out.get_i64("n").unwrap(), 3);
    assert_eq!(out.get_str("label").unwrap(), "x");
}

#[test]
fn find_and_modify_without_upsert_returns_none_on_no_match() {
    let store = MemoryStore::new();
    let out = store
        .find_and_modify(
            "notes",
            &doc! { "_id": bson::oid::ObjectId::new() },
            &doc! { "$set": { "a": 1 } },
            ModifyOptions { upsert: false, return_new: true },
        )
        .unwrap();
    assert!(out.is_none());
}

#[test]
fn find_and_modify_upserts_seeding_from_the_filter() {
    let store = MemoryStore::new();
    let id = bson::oid::ObjectId::new();
    let out = store
        .find_and_modify("notes", &doc! { "_id": id }, &doc! { "$set": { "a": 1 } }, upsert_new())
        .unwrap()
        .unwrap();
    assert_eq!(out.get_object_id("_id").unwrap(), id);
    assert_eq!(out.get_i32("a").unwrap(), 1);
    assert_eq!(store.count("notes", &doc! {}).unwrap(), 1);
}

#[test]
fn array_operators_behave_like_the_store_contract() {
    let store = MemoryStore::new();
    let doc = store.insert("posts", doc! { "tags": ["a", "b"] }).unwrap();
    let id = doc.get_object_id("_id").unwrap();
    let filter = doc! { "_id": id };

    let out = store
        .find_and_modify(
            "posts",
            &filter,
            &doc! { "$pushAll": { "tags": ["c", "d"] } },
            upsert_new(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        out.get_array("tags").unwrap(),
        &vec![Bson::from("a"), Bson::from("b"), Bson::from("c"), Bson::from("d")]
    );

    let out = store
        .find_and_modify(
            "posts",
            &filter,
            &doc! { "$addToSet": { "tags": { "$each": ["a", "e"] } } },
            upsert_new(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(out.get_array("tags").unwrap().len(), 5); // "a" not re-added

    let out = store
        .find_and_modify("posts", &filter, &doc! { "$pop": { "tags": -1 } }, upsert_new())
        .unwrap()
        .unwrap();
    assert_eq!(out.get_array("tags").unwrap()[0], Bson::from("b"));

    let out = store
        .find_and_modify(
            "posts",
            &filter,
            &doc! { "$pullAll": { "tags": ["b", "d"] } },
            upsert_new(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(out.get_array("tags").unwrap(), &vec![Bson::from("c"), Bson::from("e")]);
}

#[test]
fn inc_keeps_integers_integral() {
    let store = MemoryStore::new();
    let doc = store.insert("counters", doc! { "n": 5_i64 }).unwrap();
    let id = doc.get_object_id("_id").unwrap();
    let out = store
        .find_and_modify(
            "counters",
            &doc! { "_id": id },
            &doc! { "$inc": { "n": 1_i64 } },
            upsert_new(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(out.get("n").unwrap(), &Bson::Int64(6));
}

#[test]
fn invalid_operator_payloads_are_rejected() {
    let store = MemoryStore::new();
    let doc = store.insert("notes", doc! { "label": "text" }).unwrap();
    let id = doc.get_object_id("_id").unwrap();
    let err = store
        .find_and_modify(
            "notes",
            &doc! { "_id": id },
            &doc! { "$inc": { "label": 1_i64 } },
            upsert_new(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidUpdate(_)));
}

#[test]
fn filters_support_combinators_comparisons_and_paths() {
    let store = MemoryStore::new();
    store.insert("people", doc! { "name": "alice", "age": 30, "addr": { "city": "rome" } }).unwrap();
    store.insert("people", doc! { "name": "bob", "age": 40 }).unwrap();

    assert_eq!(store.count("people", &doc! { "age": { "$gte": 40 } }).unwrap(), 1);
    assert_eq!(store.count("people", &doc! { "age": { "$in": [30, 99] } }).unwrap(), 1);
    assert_eq!(store.count("people", &doc! { "addr.city": "rome" }).unwrap(), 1);
    assert_eq!(store.count("people", &doc! { "addr": { "$exists": false } }).unwrap(), 1);
    assert_eq!(
        store
            .count("people", &doc! { "$or": [ { "name": "alice" }, { "name": "bob" } ] })
            .unwrap(),
        2
    );
    assert_eq!(
        store
            .count("people", &doc! { "$and": [ { "name": "bob" }, { "age": { "$lt": 35 } } ] })
            .unwrap(),
        0
    );
}

#[test]
fn find_sorts_before_slicing() {
    let store = MemoryStore::new();
    for (name, age) in [("alice", 30), ("bob", 40), ("carol", 35)] {
        store.insert("people", doc! { "name": name, "age": age }).unwrap();
    }
    let opts = FindOptions {
        sort: vec![SortSpec { field: "age".into(), order: Order::Desc }],
        skip: None,
        limit: Some(2),
    };
    let docs = store.find("people", &doc! {}, &opts).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].get_str("name").unwrap(), "bob");
    assert_eq!(docs[1].get_str("name").unwrap(), "carol");
}

#[test]
fn unique_index_rejects_duplicates_on_insert() {
    let store = MemoryStore::new();
    store.insert("users", doc! { "email": "a@x" }).unwrap();
    store
        .create_index("users", "email", IndexOptions { unique: true, drop_dups: false })
        .unwrap();
    let err = store.insert("users", doc! { "email": "a@x" }).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
}

#[test]
fn unique_index_creation_can_drop_existing_duplicates() {
    let store = MemoryStore::new();
    store.insert("users", doc! { "email": "a@x", "first": true }).unwrap();
    store.insert("users", doc! { "email": "a@x", "first": false }).unwrap();

    let err = store
        .create_index("users", "email", IndexOptions { unique: true, drop_dups: false })
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));

    store
        .create_index("users", "email", IndexOptions { unique: true, drop_dups: true })
        .unwrap();
    assert_eq!(store.count("users", &doc! {}).unwrap(), 1);
    let kept = store.find_one("users", &doc! {}, &[]).unwrap().unwrap();
    assert_eq!(kept.get_bool("first").unwrap(), true);
}

#[test]
fn sampling_pipeline_projects_to_identifiers() {
    let store = MemoryStore::new();
    for i in 0..6 {
        store.insert("pool", doc! { "n": i }).unwrap();
    }
    let out = store
        .aggregate(
            "pool",
            &[PipelineStage::RandomKey, PipelineStage::TakeSmallest { size: 2 }, PipelineStage::IdOnly],
        )
        .unwrap();
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|v| matches!(v, Bson::ObjectId(_))));
}

#[test]
fn drop_entity_removes_everything() {
    let store = MemoryStore::new();
    store.insert("tmp", doc! { "a": 1 }).unwrap();
    store.drop_entity("tmp").unwrap();
    assert_eq!(store.count("tmp", &doc! {}).unwrap(), 0);
}

#[test]
fn remove_reports_how_many_matched() {
    let store = MemoryStore::new();
    store.insert("notes", doc! { "kind": "memo" }).unwrap();
    store.insert("notes", doc! { "kind": "memo" }).unwrap();
    store.insert("notes", doc! { "kind": "todo" }).unwrap();
    assert_eq!(store.remove("notes", &doc! { "kind": "memo" }).unwrap(), 2);
    assert_eq!(store.count("notes", &doc! {}).unwrap(), 1);
}
