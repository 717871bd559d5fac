//! Core data models used throughout Review Harness.
//!
//! These types represent the candidate files, analysis results, insight
//! records, and batch reports that flow through the analysis pipeline.
//! Types that cross the HTTP boundary serialize with camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Severity tag attached to every finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Parse a severity label as emitted by a model. Unknown labels map to `Info`.
    pub fn parse_lossy(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Severity::Critical,
            "high" | "error" | "major" => Severity::High,
            "medium" | "moderate" | "warning" => Severity::Medium,
            "low" | "minor" => Severity::Low,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

/// A single review finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Result of analyzing one file with a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub findings: Vec<Finding>,
    pub analyzed_at: DateTime<Utc>,
    /// Provider that produced this result (e.g. `"openai"`).
    #[serde(default)]
    pub provider: String,
    /// Model identifier reported by the provider.
    #[serde(default)]
    pub model: String,
}

/// Durable cache entry for one file, keyed by its relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRecord {
    pub path: String,
    /// Hex SHA-256 of the file bytes the analysis was computed from.
    pub fingerprint: String,
    pub analysis: AnalysisResult,
    pub updated_at: DateTime<Utc>,
}

/// A file selected by discovery for possible analysis.
///
/// Produced fresh on every batch run; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub absolute_path: PathBuf,
    /// Root-relative path with `/` separators. This is the insight store key.
    pub relative_path: String,
    pub size: u64,
}

/// Caller-supplied knobs for one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchAnalysisOptions {
    /// Bypass the insight cache and analyze every file.
    pub force: bool,
    /// Maximum simultaneous provider calls. `None` uses `[batch].concurrency`.
    pub concurrency: Option<i64>,
    /// Override of the configured analyzable extensions.
    pub extensions: Option<Vec<String>>,
    /// Override of the per-file provider deadline.
    pub timeout_secs: Option<u64>,
}

/// Upper bound on workers per batch, whatever the request asks for.
pub const MAX_CONCURRENCY: usize = 256;

impl BatchAnalysisOptions {
    /// Resolve the worker count, clamped to `1..=MAX_CONCURRENCY`.
    pub fn effective_concurrency(&self, configured: i64) -> usize {
        self.concurrency
            .unwrap_or(configured)
            .clamp(1, MAX_CONCURRENCY as i64) as usize
    }
}

/// Terminal state of one file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Cache hit; no provider call was made.
    Skipped,
    Succeeded,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Failed => "failed",
        }
    }
}

/// Why a file ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Timeout,
    Auth,
    RateLimited,
    Malformed,
    Unavailable,
    /// The file could not be read from disk.
    Read,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Auth => "auth",
            FailureKind::RateLimited => "rateLimited",
            FailureKind::Malformed => "malformed",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Read => "read",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: FailureKind,
    pub message: String,
}

/// Per-file entry in a [`BatchAnalysisResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub path: String,
    pub status: OutcomeStatus,
    /// `true` when a provider call completed successfully for this file in this run.
    pub analyzed: bool,
    /// Fresh analysis for `Succeeded`, cached analysis for `Skipped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

/// Finding counts per severity.
///
/// In a batch report this covers every outcome that carries an analysis:
/// fresh results of `Succeeded` files and cached results of `Skipped` ones.
/// `Failed` outcomes contribute nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub info: u64,
}

impl SeveritySummary {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn add_findings(&mut self, findings: &[Finding]) {
        for f in findings {
            self.add(f.severity);
        }
    }

    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// A directory or entry that discovery could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryIssue {
    pub path: String,
    pub message: String,
}

/// Aggregate report of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnalysisResult {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Every non-ignored regular file seen by discovery.
    pub total_files: u64,
    /// Files that passed extension and size filtering.
    pub analyzable_files: u64,
    pub analyzed_count: u64,
    pub skipped_count: u64,
    pub error_count: u64,
    /// Files excluded for exceeding `max_file_size`.
    pub too_large_count: u64,
    pub results: Vec<FileOutcome>,
    pub discovery_errors: Vec<DiscoveryIssue>,
    /// Wall-clock duration of the whole batch.
    #[serde(rename = "totalDuration")]
    pub total_duration_ms: u64,
    pub summary: SeveritySummary,
}
