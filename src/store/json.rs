//! JSON document [`InsightStore`].
//!
//! The whole store is loaded once when opened and rewritten after every
//! successful write. Each rewrite goes to a sibling temp file that is then
//! renamed over the document, so a crash mid-batch leaves the last complete
//! document on disk and loses at most the record being written.
//!
//! Document shape:
//!
//! ```json
//! { "version": 1, "records": { "src/main.rs": { "path": "...", "fingerprint": "...", ... } } }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::models::{AnalysisResult, InsightRecord};

use super::memory::MemoryInsightStore;
use super::{InsightStore, StoreError, StoreResult};

const DOCUMENT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    records: BTreeMap<String, InsightRecord>,
}

pub struct JsonInsightStore {
    path: PathBuf,
    records: MemoryInsightStore,
    /// Held across upsert, rewrite and rollback, so a rewrite never
    /// persists a record that a failed write is about to roll back. Reads do
    /// not wait on it.
    flush_lock: Mutex<()>,
}

impl JsonInsightStore {
    /// Load the document at `path`, or start empty if it does not exist yet.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let records = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::Corrupt(format!("{}: {}", path.display(), e))
                })?;
                if doc.version != DOCUMENT_VERSION {
                    return Err(StoreError::Corrupt(format!(
                        "{}: unsupported document version {}",
                        path.display(),
                        doc.version
                    )));
                }
                MemoryInsightStore::from_records(doc.records.into_values())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryInsightStore::new(),
            Err(e) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        tracing::debug!(
            path = %path.display(),
            records = records.snapshot().len(),
            "opened json insight store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            records,
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current records to disk.
    pub async fn flush(&self) -> StoreResult<()> {
        let _guard = self.flush_lock.lock().await;
        self.write_document().await
    }

    /// Rewrite the document. Callers hold `flush_lock`.
    async fn write_document(&self) -> StoreResult<()> {
        let doc = StoreDocument {
            version: DOCUMENT_VERSION,
            records: self
                .records
                .snapshot()
                .into_iter()
                .map(|r| (r.path.clone(), r))
                .collect(),
        };
        let bytes =
            serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Write(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Write(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", self.path.display(), e)))?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "insights.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl InsightStore for JsonInsightStore {
    async fn write(
        &self,
        path: &str,
        fingerprint: &str,
        analysis: &AnalysisResult,
    ) -> StoreResult<InsightRecord> {
        let _guard = self.flush_lock.lock().await;
        let previous = self.records.get(path).await?;
        let record = self.records.upsert(path, fingerprint, analysis);
        if let Err(e) = self.write_document().await {
            self.records.restore(path, previous);
            return Err(e);
        }
        Ok(record)
    }

    async fn get(&self, path: &str) -> StoreResult<Option<InsightRecord>> {
        self.records.get(path).await
    }

    async fn all(&self) -> StoreResult<Vec<InsightRecord>> {
        self.records.all().await
    }

    async fn remove(&self, path: &str) -> StoreResult<bool> {
        let _guard = self.flush_lock.lock().await;
        let removed = self.records.remove(path).await?;
        if removed {
            self.write_document().await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> StoreResult<usize> {
        self.records.count().await
    }
}
