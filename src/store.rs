//! Persistent request/result store.
//!
//! Status only moves forward: `PENDING → PROCESSING → COMPLETED | FAILED`.
//! Every update is guarded by the expected current status, so a late or
//! duplicate worker can never overwrite a terminal row.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::error::TransientInfraError;
use crate::migrate;
use crate::models::{AnalysisRequest, AnalysisResult, JobStatus};

pub const INTERRUPTED_ERROR: &str = "TransientInfraError: analysis interrupted before completion";

#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    /// Connect and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_request(
        &self,
        query: &str,
        file_path: &str,
    ) -> Result<AnalysisRequest, TransientInfraError> {
        let now = Utc::now().timestamp();
        let request = AnalysisRequest {
            id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            file_path: file_path.to_string(),
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO analysis_requests (id, status, query, file_path, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(request.status.as_str())
        .bind(&request.query)
        .bind(&request.file_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(request)
    }

    pub async fn get_request(&self, id: &str) -> Result<Option<AnalysisRequest>, TransientInfraError> {
        let row = sqlx::query(
            "SELECT id, status, query, file_path, error, created_at, updated_at FROM analysis_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| request_from_row(&r)).transpose()
    }

    /// Most recent requests first.
    pub async fn list_requests(&self, limit: i64) -> Result<Vec<AnalysisRequest>, TransientInfraError> {
        let rows = sqlx::query(
            "SELECT id, status, query, file_path, error, created_at, updated_at FROM analysis_requests ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// PENDING → PROCESSING. Returns false when the row was not PENDING.
    pub async fn mark_processing(&self, id: &str) -> Result<bool, TransientInfraError> {
        let result = sqlx::query(
            "UPDATE analysis_requests SET status = 'PROCESSING', updated_at = ? WHERE id = ? AND status = 'PENDING'",
        )
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Store the result and mark the request COMPLETED in one transaction.
    pub async fn complete(&self, id: &str, content: &str) -> Result<(), TransientInfraError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE analysis_requests SET status = 'COMPLETED', error = NULL, updated_at = ? WHERE id = ? AND status = 'PROCESSING'",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(TransientInfraError(format!(
                "request {} is not PROCESSING; result discarded",
                id
            )));
        }

        sqlx::query("INSERT INTO analysis_results (request_id, content, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark a non-terminal request FAILED. Returns false when it was already
    /// terminal.
    pub async fn fail(&self, id: &str, error: &str) -> Result<bool, TransientInfraError> {
        let result = sqlx::query(
            "UPDATE analysis_requests SET status = 'FAILED', error = ?, updated_at = ? WHERE id = ? AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(error)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_result(&self, request_id: &str) -> Result<Option<AnalysisResult>, TransientInfraError> {
        let row = sqlx::query(
            "SELECT id, request_id, content, created_at FROM analysis_results WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AnalysisResult {
            id: r.get("id"),
            request_id: r.get("request_id"),
            content: r.get("content"),
            created_at: r.get("created_at"),
        }))
    }

    /// PENDING requests, oldest first.
    pub async fn pending_ids(&self) -> Result<Vec<String>, TransientInfraError> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM analysis_requests WHERE status = 'PENDING' ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Fail every request left PROCESSING by a previous process.
    pub async fn fail_interrupted(&self) -> Result<u64, TransientInfraError> {
        let result = sqlx::query(
            "UPDATE analysis_requests SET status = 'FAILED', error = ?, updated_at = ? WHERE status = 'PROCESSING'",
        )
        .bind(INTERRUPTED_ERROR)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn request_from_row(row: &SqliteRow) -> Result<AnalysisRequest, TransientInfraError> {
    let status: String = row.get("status");
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| TransientInfraError(e.to_string()))?;

    Ok(AnalysisRequest {
        id: row.get("id"),
        query: row.get("query"),
        file_path: row.get("file_path"),
        status,
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_path(&dir.path().join("jobs.sqlite"))
            .await
            .unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        (dir, ResultStore::from_pool(pool))
    }

    #[tokio::test]
    async fn lifecycle_to_completed() {
        let (_dir, store) = store().await;
        let req = store.create_request("Summarise", "/tmp/r.pdf").await.unwrap();
        assert_eq!(req.status, JobStatus::Pending);

        assert!(store.mark_processing(&req.id).await.unwrap());
        assert!(!store.mark_processing(&req.id).await.unwrap());

        store.complete(&req.id, "## Report").await.unwrap();
        let loaded = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.error.is_none());

        let result = store.get_result(&req.id).await.unwrap().unwrap();
        assert_eq!(result.content, "## Report");
    }

    #[tokio::test]
    async fn terminal_rows_are_not_overwritten() {
        let (_dir, store) = store().await;
        let req = store.create_request("q", "/tmp/r.pdf").await.unwrap();
        store.mark_processing(&req.id).await.unwrap();
        assert!(store.fail(&req.id, "LoadError: boom").await.unwrap());

        assert!(!store.fail(&req.id, "again").await.unwrap());
        assert!(store.complete(&req.id, "late").await.is_err());
        assert!(store.get_result(&req.id).await.unwrap().is_none());

        let loaded = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("LoadError: boom"));
    }

    #[tokio::test]
    async fn complete_requires_processing() {
        let (_dir, store) = store().await;
        let req = store.create_request("q", "/tmp/r.pdf").await.unwrap();
        assert!(store.complete(&req.id, "too early").await.is_err());
        assert!(store.get_result(&req.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recovery_queries() {
        let (_dir, store) = store().await;
        let a = store.create_request("q", "/tmp/a.pdf").await.unwrap();
        let b = store.create_request("q", "/tmp/b.pdf").await.unwrap();
        store.mark_processing(&a.id).await.unwrap();

        assert_eq!(store.pending_ids().await.unwrap(), vec![b.id.clone()]);
        assert_eq!(store.fail_interrupted().await.unwrap(), 1);

        let a = store.get_request(&a.id).await.unwrap().unwrap();
        assert_eq!(a.status, JobStatus::Failed);
        assert_eq!(a.error.as_deref(), Some(INTERRUPTED_ERROR));
        assert_eq!(store.list_requests(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let (_dir, store) = store().await;
        assert!(store.get_request("nope").await.unwrap().is_none());
    }
}
