//! In-memory [`InsightStore`] built on a sharded concurrent map.
//!
//! Writes to different paths usually land in different shards and do not
//! contend. Writes to the same path serialize on the shard lock, and each
//! record is inserted whole, so readers see either the old or the new record.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::models::{AnalysisResult, InsightRecord};

use super::{InsightStore, StoreResult};

pub struct MemoryInsightStore {
    records: DashMap<String, InsightRecord>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Seed the store with previously persisted records.
    pub fn from_records(records: impl IntoIterator<Item = InsightRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.path.clone(), record);
        }
        store
    }

    pub(crate) fn upsert(
        &self,
        path: &str,
        fingerprint: &str,
        analysis: &AnalysisResult,
    ) -> InsightRecord {
        let record = InsightRecord {
            path: path.to_string(),
            fingerprint: fingerprint.to_string(),
            analysis: analysis.clone(),
            updated_at: Utc::now(),
        };
        self.records.insert(path.to_string(), record.clone());
        record
    }

    /// Put back `previous` for `path`, undoing an upsert that could not be
    /// persisted.
    pub(crate) fn restore(&self, path: &str, previous: Option<InsightRecord>) {
        match previous {
            Some(record) => {
                self.records.insert(path.to_string(), record);
            }
            None => {
                self.records.remove(path);
            }
        }
    }

    /// Copy of every record, ordered by path.
    pub(crate) fn snapshot(&self) -> Vec<InsightRecord> {
        let mut all: Vec<InsightRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }
}

impl Default for MemoryInsightStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn write(
        &self,
        path: &str,
        fingerprint: &str,
        analysis: &AnalysisResult,
    ) -> StoreResult<InsightRecord> {
        Ok(self.upsert(path, fingerprint, analysis))
    }

    async fn get(&self, path: &str) -> StoreResult<Option<InsightRecord>> {
        Ok(self.records.get(path).map(|r| r.value().clone()))
    }

    async fn all(&self) -> StoreResult<Vec<InsightRecord>> {
        Ok(self.snapshot())
    }

    async fn remove(&self, path: &str) -> StoreResult<bool> {
        Ok(self.records.remove(path).is_some())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }
}
