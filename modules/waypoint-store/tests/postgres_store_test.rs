//! Integration tests for PgDocumentStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use serde_json::json;
use waypoint_store::{Document, DocumentStore, PgDocumentStore};

async fn test_store(collection: &str) -> Option<PgDocumentStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = PgDocumentStore::connect(&url).await.ok()?;
    store.migrate().await.ok()?;
    store.clear(collection).await.ok()?;
    Some(store)
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn merge_is_shallow_and_right_biased() {
    let Some(store) = test_store("test_status").await else {
        eprintln!("DATABASE_TEST_URL not set, skipping");
        return;
    };

    store
        .set("test_status", "current", doc(json!({"city": "Austin", "isSleep": true})), false)
        .await
        .unwrap();
    store
        .set("test_status", "current", doc(json!({"city": "Dallas"})), true)
        .await
        .unwrap();

    let stored = store.get("test_status", "current").await.unwrap().unwrap();
    assert_eq!(stored["city"], "Dallas");
    assert_eq!(stored["isSleep"], true);

    store
        .set("test_status", "current", doc(json!({"city": "Tulsa"})), false)
        .await
        .unwrap();
    let stored = store.get("test_status", "current").await.unwrap().unwrap();
    assert!(stored.get("isSleep").is_none());
}

#[tokio::test]
async fn list_delete_and_clear() {
    let Some(store) = test_store("test_posts").await else {
        eprintln!("DATABASE_TEST_URL not set, skipping");
        return;
    };

    for key in ["tiktok:2", "instagram:1"] {
        store
            .set("test_posts", key, doc(json!({"likeCount": 1})), false)
            .await
            .unwrap();
    }

    let keys: Vec<String> = store
        .list("test_posts")
        .await
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec!["instagram:1", "tiktok:2"]);

    assert!(store.delete("test_posts", "instagram:1").await.unwrap());
    assert_eq!(store.clear("test_posts").await.unwrap(), 1);
    assert!(store.get("test_posts", "tiktok:2").await.unwrap().is_none());
}
