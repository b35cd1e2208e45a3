use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

/// Document store for completed study sessions.
///
/// History is non-critical to the study-set flow: saving is best-effort and
/// a failed save yields no id instead of an error.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = HistoryStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS study_sessions (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a completed study session payload. Returns the new record id,
    /// or None when the write fails.
    pub async fn save(&self, payload: &Value) -> Option<String> {
        let id = Uuid::new_v4().to_string();
        let serialized = payload.to_string();

        let result = sqlx::query(
            "INSERT INTO study_sessions (id, payload, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&id)
        .bind(&serialized)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(session_id = %id, "Saved study session to history");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "Failed to save study session history");
                None
            }
        }
    }

    /// List stored sessions, newest first, each payload annotated with its
    /// record id and created-at timestamp.
    pub async fn list(&self, limit: u32) -> Result<Vec<Value>> {
        let rows = sqlx::query(
            "SELECT id, payload, created_at FROM study_sessions ORDER BY created_at DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let payload: String = row.get("payload");
            let created_at: String = row.get("created_at");

            let mut item: Value =
                serde_json::from_str(&payload).unwrap_or_else(|_| Value::Object(Default::default()));
            if let Value::Object(map) = &mut item {
                map.insert("id".to_string(), Value::String(id));
                map.insert("createdAt".to_string(), Value::String(created_at));
            }
            items.push(item);
        }

        Ok(items)
    }

    /// Delete all stored sessions, returning how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM study_sessions")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete one stored session by id. Returns false for unknown ids.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM study_sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
