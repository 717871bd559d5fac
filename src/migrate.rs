use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::StoreConfig;
use crate::store::JsonInsightStore;

/// Create the insight schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insights (
            path TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            analysis_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_insights_updated_at ON insights(updated_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize the configured store so later runs find it in place.
pub async fn init_store(config: &StoreConfig) -> Result<()> {
    match config.backend.as_str() {
        "sqlite" => {
            let pool = crate::db::connect(&config.path).await?;
            run_migrations(&pool).await?;
            pool.close().await;
        }
        "json" => {
            let store = JsonInsightStore::open(&config.path).await?;
            store.flush().await?;
        }
        _ => {}
    }
    Ok(())
}
