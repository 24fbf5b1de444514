//! End-to-end scenarios over `DocumentStore` bound to the in-memory
//! backend: conditional writes, predicate queries (inline and
//! parameterized), multi-mutator updates, transaction atomicity, and
//! batch independence.

mod fixtures;

use std::sync::Arc;

use serde_json::json;

use portadb::backends::MemoryAdapter;
use portadb::core::error::StoreError;
use portadb::core::key::Item;
use portadb::core::operation::{Batch, Operation, Response, Transaction, Verb};
use portadb::ql::Returning;
use portadb::store::{DocumentStore, StoreConfig};
use portadb::value::Value;

async fn open_store() -> DocumentStore {
    let adapter = Arc::new(MemoryAdapter::new());
    DocumentStore::open(adapter, StoreConfig::new("widgets")).await.unwrap()
}

fn key(pk: &str, id: &str) -> Value {
    json!({"pk": pk, "id": id}).into()
}

fn value_of(item: &Item) -> &Value {
    item.value.as_ref().expect("item carries a value")
}

// Conditional insert-replace cycle: put, re-put, etag-gated delete.
#[tokio::test]
async fn conditional_insert_replace_cycle() {
    let store = open_store().await;
    let d: Value = json!({"pk": "pk00", "id": "1", "v": 1}).into();
    let d2: Value = json!({"pk": "pk00", "id": "1", "v": 2}).into();

    store.put(d.clone(), None, None).await.unwrap();
    let got = store.get(key("pk00", "1"), None).await.unwrap().unwrap();
    assert_eq!(value_of(&got).get_field("v"), Some(&Value::Int(1)));
    let e1 = got.properties.etag.clone();

    store.put(d2.clone(), None, None).await.unwrap();
    let got2 = store.get(key("pk00", "1"), None).await.unwrap().unwrap();
    assert_eq!(value_of(&got2).get_field("v"), Some(&Value::Int(2)));
    let e2 = got2.properties.etag.clone();
    assert_ne!(e1, e2);

    let where_e1 = format!("$etag='{}'", e1);
    let err = store.delete(key("pk00", "1"), Some(&where_e1)).await.unwrap_err();
    assert!(matches!(err, StoreError::PreconditionFailed(_)));

    let where_e2 = format!("$etag='{}'", e2);
    store.delete(key("pk00", "1"), Some(&where_e2)).await.unwrap();
    assert!(store.get(key("pk00", "1"), None).await.unwrap().is_none());
}

async fn seed_canonical_documents(store: &DocumentStore) {
    for doc in fixtures::canonical_documents() {
        store.put(doc, None, None).await.unwrap();
    }
}

// Complex predicate query with ORDER BY and a matching COUNT.
#[tokio::test]
async fn complex_predicate_query_orders_and_counts() {
    let store = open_store().await;
    seed_canonical_documents(&store).await;

    let docs = store
        .query(
            Some("pk='pk00' and int between 1 and 3"),
            Some("int DESC"),
            None,
            None,
        )
        .await
        .unwrap();
    let ids: Vec<String> = docs
        .iter()
        .map(|d| d.get_field("id").and_then(Value::as_str).unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["3", "2", "1"]);

    let n = store.count(Some("pk='pk00' and int between 1 and 3")).await.unwrap();
    assert_eq!(n, 3);
}

// Scenario 3: the 28-parameter complex predicate must match its inline
// equivalent exactly, both selecting the sole document `pk='pk01'`/`id='9'`.
#[tokio::test]
async fn parameterized_predicate_matches_inline_equivalent() {
    let store = open_store().await;
    seed_canonical_documents(&store).await;

    let inline = store.query(Some(fixtures::COMPLEX_CONDITION_1), None, None, None).await.unwrap();

    let params = fixtures::complex_condition_1_params();
    let statement = format!("QUERY WHERE {}", fixtures::COMPLEX_CONDITION_1_WITH_PARAMS);
    let resp = store.execute(&statement, &params).await.unwrap();
    let parameterized = match resp {
        Response::Documents(docs) => docs,
        other => panic!("expected Documents, got {:?}", other.name()),
    };

    assert_eq!(inline.len(), 1);
    assert_eq!(parameterized.len(), 1);
    assert_eq!(
        inline[0].get_field("id").and_then(Value::as_str),
        parameterized[0].get_field("id").and_then(Value::as_str)
    );
    assert_eq!(inline[0].get_field("id").and_then(Value::as_str), Some("9"));
    assert_eq!(inline[0].get_field("pk").and_then(Value::as_str), Some("pk01"));
}

// Scenario 4: update with multiple mutators applied against a stable
// pre-image.
#[tokio::test]
async fn update_applies_every_mutator_against_the_pre_image() {
    let store = open_store().await;
    let d: Value = json!({
        "pk": "pk00", "id": "1",
        "int": 8, "str": "eight", "float": 1.4,
        "obj": {"nint": -800, "narr": [1,2,3]},
        "bool": true,
    })
    .into();
    store.put(d, None, None).await.unwrap();

    let set = "int=put(99), str=put('new nine'), obj.nstr=put('90'), float=insert(1.9), \
               newint=insert(999), obj.nnewstr=insert(null), bool=delete(), obj.narr=delete(), \
               arrint=put([1,2,3]), newobj=put({\"int\":90,\"str\":\"ninety\"})";
    store.update(key("pk00", "1"), set, None, None).await.unwrap();

    let got = store.get(key("pk00", "1"), None).await.unwrap().unwrap();
    let got = value_of(&got);
    assert_eq!(got.get_field("int"), Some(&Value::Int(99)));
    assert_eq!(got.get_field("str"), Some(&Value::String("new nine".to_string())));
    // float already had a value; insert() is a no-op when the path is present.
    assert_eq!(got.get_field("float"), Some(&Value::Float(1.4)));
    assert_eq!(got.get_field("newint"), Some(&Value::Int(999)));
    assert!(got.get_field("bool").is_none());
    let obj = got.get_field("obj").and_then(Value::as_object).unwrap();
    assert!(!obj.contains_key("narr"));
    assert_eq!(obj.get("nstr"), Some(&Value::String("90".to_string())));
    assert_eq!(obj.get("nnewstr"), Some(&Value::Null));
    assert_eq!(
        got.get_field("arrint"),
        Some(&Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
    );
    let newobj = got.get_field("newobj").and_then(Value::as_object).unwrap();
    assert_eq!(newobj.get("int"), Some(&Value::Int(90)));
}

// Scenario 5: transaction atomicity — one failing precondition aborts the
// whole block and leaves every document untouched.
#[tokio::test]
async fn transaction_aborts_wholly_on_one_failed_precondition() {
    let store = open_store().await;
    for id in ["7", "8", "9"] {
        let doc: Value = json!({"pk": "pk00", "id": id, "v": id}).into();
        store.put(doc, None, None).await.unwrap();
    }
    // "6" is intentionally absent so `put(6, where=not_exists())` would
    // otherwise have succeeded.

    let mut txn = Transaction::default();
    let mut put6 = Operation::new(Verb::Put);
    put6.value = Some(json!({"pk": "pk00", "id": "6", "v": "6"}).into());
    put6.where_ = Some("not_exists()".to_string());
    txn.ops.push(put6);

    let mut put7 = Operation::new(Verb::Put);
    put7.value = Some(json!({"pk": "pk00", "id": "7", "v": "seven"}).into());
    put7.where_ = Some("exists()".to_string());
    txn.ops.push(put7);

    let mut delete8 = Operation::new(Verb::Delete);
    delete8.key = Some(key("pk00", "8"));
    txn.ops.push(delete8);

    let mut update9 = Operation::new(Verb::Update);
    update9.key = Some(key("pk00", "9"));
    update9.set = Some("v=put('nine')".to_string());
    // A condition that cannot hold over document 9's actual state.
    update9.where_ = Some("v='not-actually-nine'".to_string());
    txn.ops.push(update9);

    let err = store.transact(txn).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    assert!(store.get(key("pk00", "6"), None).await.unwrap().is_none());
    let seven = store.get(key("pk00", "7"), None).await.unwrap().unwrap();
    assert_eq!(value_of(&seven).get_field("v"), Some(&Value::String("7".to_string())));
    assert!(store.get(key("pk00", "8"), None).await.unwrap().is_some());
    let nine = store.get(key("pk00", "9"), None).await.unwrap().unwrap();
    assert_eq!(value_of(&nine).get_field("v"), Some(&Value::String("9".to_string())));
}

// Scenario 6: batch independence — five PUTs into an empty collection
// each succeed with a distinct fresh etag and are all individually
// retrievable.
#[tokio::test]
async fn batch_applies_every_item_independently() {
    let store = open_store().await;
    let mut batch = Batch::default();
    for i in 0..5u32 {
        let mut put = Operation::new(Verb::Put);
        put.value = Some(json!({"pk": "pk00", "id": i.to_string(), "v": i}).into());
        put.returning = Some(Returning::New);
        batch.ops.push(put);
    }

    let results = store.batch(batch).await.unwrap();
    assert_eq!(results.len(), 5);
    for r in &results {
        assert!(
            matches!(r, portadb::core::operation::OperationResult::Ok { .. }),
            "expected every batch item to succeed, got {:?}",
            r
        );
    }

    let mut etags = std::collections::HashSet::new();
    for i in 0..5u32 {
        let item = store.get(key("pk00", &i.to_string()), None).await.unwrap().unwrap();
        etags.insert(item.properties.etag.clone());
    }
    assert_eq!(etags.len(), 5, "each item gets a distinct fresh etag");
}

// Boundary: `update` on an absent document is NotFound.
#[tokio::test]
async fn update_on_absent_document_is_not_found() {
    let store = open_store().await;
    let err = store
        .update(key("pk00", "ghost"), "v=put(1)", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// Boundary: operations on a closed store fail with a closed-store error.
#[tokio::test]
async fn operations_on_closed_store_fail() {
    let store = open_store().await;
    store.close().await.unwrap();
    let err = store
        .put(json!({"pk": "pk00", "id": "1"}).into(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Internal(_)));
}
