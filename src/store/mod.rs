//! Insight storage: the analysis cache.
//!
//! The [`InsightStore`] trait maps a file's relative path to its last-known
//! fingerprint and analysis. The batch orchestrator only reads through
//! [`check`](InsightStore::check) and requests writes through
//! [`write`](InsightStore::write); it never touches a backend directly.
//!
//! # Backends
//!
//! | Config value | Type | Persistence |
//! |--------------|------|-------------|
//! | `"memory"` | [`MemoryInsightStore`] | none |
//! | `"json"` | [`JsonInsightStore`] | one JSON document, rewritten atomically per write |
//! | `"sqlite"` | [`SqliteInsightStore`] | `insights` table, one upsert per write |
//!
//! # Cache Policy
//!
//! A file is analyzed iff the run is forced, no record exists for its path,
//! or the stored fingerprint differs from the current one (see
//! [`needs_analysis`]). Records are keyed by path only, so a file moved
//! without modification is treated as new.

pub mod json;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::models::{AnalysisResult, InsightRecord};

pub use json::JsonInsightStore;
pub use memory::MemoryInsightStore;
pub use sqlite::SqliteInsightStore;

/// Errors raised by insight store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read insight store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record could not be made durable.
    #[error("failed to persist insight record: {0}")]
    Write(String),

    #[error("insight store is corrupt: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of comparing a path's current fingerprint against the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheCheck {
    pub has_record: bool,
    pub fingerprint_matches: bool,
    pub record: Option<InsightRecord>,
}

impl CacheCheck {
    pub fn from_record(record: Option<InsightRecord>, fingerprint: &str) -> Self {
        match record {
            Some(record) => Self {
                has_record: true,
                fingerprint_matches: record.fingerprint == fingerprint,
                record: Some(record),
            },
            None => Self::default(),
        }
    }
}

/// The cache policy: analyze on force, missing record, or stale fingerprint.
pub fn needs_analysis(force: bool, check: &CacheCheck) -> bool {
    force || !check.has_record || !check.fingerprint_matches
}

/// Abstract insight storage backend.
///
/// Implementations must allow concurrent reads and writes on distinct paths
/// and must never expose a partially written record.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Compare `fingerprint` with the stored record for `path`. Never mutates.
    async fn check(&self, path: &str, fingerprint: &str) -> StoreResult<CacheCheck> {
        let record = self.get(path).await?;
        Ok(CacheCheck::from_record(record, fingerprint))
    }

    /// Insert or replace the record for `path`.
    async fn write(
        &self,
        path: &str,
        fingerprint: &str,
        analysis: &AnalysisResult,
    ) -> StoreResult<InsightRecord>;

    /// Fetch the record for `path`, if any.
    async fn get(&self, path: &str) -> StoreResult<Option<InsightRecord>>;

    /// All records, ordered by path.
    async fn all(&self) -> StoreResult<Vec<InsightRecord>>;

    /// Delete the record for `path`. Returns whether one existed.
    async fn remove(&self, path: &str) -> StoreResult<bool>;

    async fn count(&self) -> StoreResult<usize>;
}

/// Open the backend selected by `[store]`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn InsightStore>> {
    let store: Arc<dyn InsightStore> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryInsightStore::new()),
        "json" => Arc::new(JsonInsightStore::open(&config.path).await?),
        "sqlite" => Arc::new(SqliteInsightStore::open(&config.path).await?),
        other => anyhow::bail!("Unknown store backend: {}", other),
    };
    Ok(store)
}
