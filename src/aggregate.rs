//! Folding per-file outcomes into a [`BatchAnalysisResult`].

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::discovery::DiscoveryStats;
use crate::models::{BatchAnalysisResult, FileOutcome, OutcomeStatus, SeveritySummary};

/// Build the batch report.
///
/// `outcomes` must already be in discovery order and hold exactly one entry
/// per analyzable file. Severity buckets include every outcome that carries
/// an analysis, so a fully cached run reports the same summary as the run
/// that populated the cache. `total_duration` is the batch's wall-clock time.
pub fn aggregate(
    batch_id: Uuid,
    started_at: DateTime<Utc>,
    outcomes: Vec<FileOutcome>,
    stats: DiscoveryStats,
    total_duration: Duration,
) -> BatchAnalysisResult {
    let mut analyzed_count = 0;
    let mut skipped_count = 0;
    let mut error_count = 0;
    let mut summary = SeveritySummary::default();

    for outcome in &outcomes {
        match outcome.status {
            OutcomeStatus::Succeeded => analyzed_count += 1,
            OutcomeStatus::Skipped => skipped_count += 1,
            OutcomeStatus::Failed => error_count += 1,
        }
        if let Some(analysis) = &outcome.analysis {
            summary.add_findings(&analysis.findings);
        }
    }

    debug_assert_eq!(
        analyzed_count + skipped_count + error_count,
        stats.analyzable_files
    );

    BatchAnalysisResult {
        batch_id,
        started_at,
        total_files: stats.total_files,
        analyzable_files: stats.analyzable_files,
        analyzed_count,
        skipped_count,
        error_count,
        too_large_count: stats.too_large,
        results: outcomes,
        discovery_errors: stats.errors,
        total_duration_ms: total_duration.as_millis() as u64,
        summary,
    }
}
