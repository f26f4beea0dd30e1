//! SQLite document persistence

use serde_json::json;
use stripes_common::db::{init_database, list_document_paths, load_document, merge_document};
use stripes_common::Error;

#[tokio::test]
async fn test_database_created_with_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("stripes.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_merge_upserts_shallowly() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("stripes.db")).await.unwrap();

    assert_eq!(load_document(&pool, "stripes/shared").await.unwrap(), None);

    merge_document(&pool, "stripes/shared", json!({ "students": [], "songs": [1] }))
        .await
        .unwrap();
    let merged = merge_document(&pool, "stripes/shared", json!({ "songs": [2] }))
        .await
        .unwrap();
    assert_eq!(merged, json!({ "students": [], "songs": [2] }));
    assert_eq!(load_document(&pool, "stripes/shared").await.unwrap(), Some(merged));

    assert_eq!(list_document_paths(&pool).await.unwrap(), vec!["stripes/shared".to_string()]);
}

#[tokio::test]
async fn test_non_object_patch_leaves_row_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("stripes.db")).await.unwrap();

    merge_document(&pool, "doc", json!({ "a": 1 })).await.unwrap();
    let err = merge_document(&pool, "doc", json!("oops")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(load_document(&pool, "doc").await.unwrap(), Some(json!({ "a": 1 })));
}

#[tokio::test]
async fn test_reopening_keeps_documents() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stripes.db");
    {
        let pool = init_database(&db_path).await.unwrap();
        merge_document(&pool, "doc", json!({ "kept": true })).await.unwrap();
        pool.close().await;
    }
    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(load_document(&pool, "doc").await.unwrap(), Some(json!({ "kept": true })));
}
