//! SQLite-backed [`InsightStore`].
//!
//! One row per path in the `insights` table. Writes are a single
//! `INSERT ... ON CONFLICT DO UPDATE` statement, so a record is either fully
//! replaced or untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::migrate;
use crate::models::{AnalysisResult, InsightRecord};

use super::{InsightStore, StoreError, StoreResult};

pub struct SqliteInsightStore {
    pool: SqlitePool,
}

impl SqliteInsightStore {
    /// Connect to the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_record(row: &SqliteRow) -> StoreResult<InsightRecord> {
    let path: String = row.get("path");
    let analysis_json: String = row.get("analysis_json");
    let analysis: AnalysisResult = serde_json::from_str(&analysis_json)
        .map_err(|e| StoreError::Corrupt(format!("analysis for {}: {}", path, e)))?;
    let updated_ms: i64 = row.get("updated_at");
    let updated_at = DateTime::<Utc>::from_timestamp_millis(updated_ms)
        .ok_or_else(|| StoreError::Corrupt(format!("bad timestamp for {}", path)))?;

    Ok(InsightRecord {
        fingerprint: row.get("fingerprint"),
        path,
        analysis,
        updated_at,
    })
}

#[async_trait]
impl InsightStore for SqliteInsightStore {
    async fn write(
        &self,
        path: &str,
        fingerprint: &str,
        analysis: &AnalysisResult,
    ) -> StoreResult<InsightRecord> {
        let analysis_json =
            serde_json::to_string(analysis).map_err(|e| StoreError::Write(e.to_string()))?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO insights (path, fingerprint, analysis_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                analysis_json = excluded.analysis_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(fingerprint)
        .bind(&analysis_json)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(InsightRecord {
            path: path.to_string(),
            fingerprint: fingerprint.to_string(),
            analysis: analysis.clone(),
            updated_at: now,
        })
    }

    async fn get(&self, path: &str) -> StoreResult<Option<InsightRecord>> {
        let row = sqlx::query(
            "SELECT path, fingerprint, analysis_json, updated_at FROM insights WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn all(&self) -> StoreResult<Vec<InsightRecord>> {
        let rows = sqlx::query(
            "SELECT path, fingerprint, analysis_json, updated_at FROM insights ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn remove(&self, path: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM insights WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> StoreResult<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insights")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
