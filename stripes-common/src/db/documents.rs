//! Document rows: load and shallow-merge upsert

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use crate::store::shallow_merge;
use crate::Result;

pub async fn load_document(pool: &SqlitePool, path: &str) -> Result<Option<Value>> {
    let body: Option<String> = sqlx::query_scalar("SELECT body FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

/// Merge `patch` into the stored document (creating it if absent) and
/// return the merged result. Read and write share one transaction.
pub async fn merge_document(pool: &SqlitePool, path: &str, patch: Value) -> Result<Value> {
    let mut tx = pool.begin().await?;

    let body: Option<String> = sqlx::query_scalar("SELECT body FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut *tx)
        .await?;
    let mut document = match body {
        Some(body) => serde_json::from_str(&body)?,
        None => Value::Null,
    };
    shallow_merge(&mut document, patch)?;

    sqlx::query(
        r#"
        INSERT INTO documents (path, body, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(path)
    .bind(document.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(path, "Stored document");
    Ok(document)
}

/// Every stored document path, sorted
pub async fn list_document_paths(pool: &SqlitePool) -> Result<Vec<String>> {
    let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?;
    Ok(paths)
}
