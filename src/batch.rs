//! Batch analysis orchestration.
//!
//! Coordinates one full run over a project: discovery → cache check →
//! provider call → insight write → aggregation. Only files whose content
//! fingerprint changed (or every file, when forced) reach the provider.
//!
//! # Scheduling
//!
//! ```text
//!  spawn_blocking                 bounded channel            N workers
//! ┌──────────────┐  (index, file)  ┌─────────┐   recv   ┌──────────────┐
//! │  Discovery   │ ───────────────▶│ cap = N │ ───────▶ │ read → hash  │
//! │  (producer)  │                 └─────────┘          │ check → call │
//! └──────────────┘                                      │ → write      │
//!                                                       └──────┬───────┘
//!                                   sort by index  ◀───────────┘
//! ```
//!
//! Exactly `N` workers exist, with `N` being the requested concurrency
//! clamped to `1..=MAX_CONCURRENCY`, so at most `N` provider calls are in
//! flight. Files are admitted in discovery order and the report
//! is reassembled in that order regardless of completion timing. A failing
//! or timed-out file produces a `Failed` outcome and frees its worker; it
//! never aborts the batch.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::config::{Config, ReviewConfig};
use crate::discovery::{Discovery, DiscoveryEvent, DiscoveryStats};
use crate::hasher::fingerprint;
use crate::models::{
    BatchAnalysisOptions, BatchAnalysisResult, CandidateFile, FailureKind, FileOutcome,
    OutcomeError, OutcomeStatus,
};
use crate::progress::{BatchProgressEvent, BatchProgressReporter};
use crate::provider::{
    language_for_path, AnalysisProvider, AnalyzeOptions, ProviderError, ProviderHandle,
};
use crate::store::{needs_analysis, CacheCheck, InsightStore};

/// State shared by every worker of one batch.
struct WorkerContext {
    store: Arc<dyn InsightStore>,
    provider: Arc<dyn AnalysisProvider>,
    progress: Arc<dyn BatchProgressReporter>,
    checks: ReviewConfig,
    timeout: Duration,
    force: bool,
    done: AtomicU64,
}

/// Run a batch using the provider held by `handle`, building it first if
/// needed. A provider that cannot be built fails the call before any file
/// is scheduled.
pub async fn run_batch_with_handle(
    root: &Path,
    config: &Config,
    store: Arc<dyn InsightStore>,
    handle: &ProviderHandle,
    options: &BatchAnalysisOptions,
    progress: Arc<dyn BatchProgressReporter>,
) -> Result<BatchAnalysisResult> {
    let provider = handle
        .get_or_build(&config.provider)
        .context("No usable analysis provider configured")?;
    run_batch_analysis(root, config, store, provider, options, progress).await
}

/// Analyze every discoverable file under `root`.
///
/// # Errors
///
/// Only configuration problems are returned as errors (missing root,
/// invalid ignore glob, empty extension set). Per-file failures are
/// reported inside the result.
pub async fn run_batch_analysis(
    root: &Path,
    config: &Config,
    store: Arc<dyn InsightStore>,
    provider: Arc<dyn AnalysisProvider>,
    options: &BatchAnalysisOptions,
    progress: Arc<dyn BatchProgressReporter>,
) -> Result<BatchAnalysisResult> {
    let batch_id = Uuid::new_v4();
    let started_at = Utc::now();
    let clock = Instant::now();

    let discovery = Arc::new(Discovery::new(
        root,
        &config.project,
        options.extensions.as_deref(),
    )?);

    let concurrency = options.effective_concurrency(config.batch.concurrency);
    let timeout_secs = match options.timeout_secs {
        Some(secs) if secs > 0 => secs,
        _ => config.provider.timeout_secs,
    };

    tracing::info!(
        %batch_id,
        root = %root.display(),
        concurrency,
        force = options.force,
        provider = provider.name(),
        "batch analysis started"
    );
    progress.report(BatchProgressEvent::Discovering {
        root: root.display().to_string(),
    });

    let (tx, rx) = mpsc::channel::<(usize, CandidateFile)>(concurrency);

    // Single producer: discovery runs on a blocking thread and blocks on the
    // bounded channel until a worker frees up.
    let producer = {
        let discovery = discovery.clone();
        tokio::task::spawn_blocking(move || {
            let mut stats = DiscoveryStats::default();
            let mut index = 0usize;
            for event in discovery.walk() {
                stats.record(&event);
                match event {
                    DiscoveryEvent::Candidate(file) => {
                        if tx.blocking_send((index, file)).is_err() {
                            break;
                        }
                        index += 1;
                    }
                    DiscoveryEvent::TooLarge { path, size } => {
                        tracing::debug!(%path, size, "skipping file above max_file_size");
                    }
                    DiscoveryEvent::Error(issue) => {
                        tracing::warn!(path = %issue.path, error = %issue.message, "discovery error");
                    }
                    DiscoveryEvent::Unsupported { .. } => {}
                }
            }
            stats
        })
    };

    let ctx = Arc::new(WorkerContext {
        store,
        provider,
        progress: progress.clone(),
        checks: config.review,
        timeout: Duration::from_secs(timeout_secs),
        force: options.force,
        done: AtomicU64::new(0),
    });
    let rx = Arc::new(Mutex::new(rx));

    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        let ctx = ctx.clone();
        let rx = rx.clone();
        workers.spawn(async move {
            let mut finished = Vec::new();
            loop {
                let next = rx.lock().await.recv().await;
                let Some((index, file)) = next else { break };
                let outcome = process_file(&ctx, &file).await;
                let n = ctx.done.fetch_add(1, Ordering::Relaxed) + 1;
                ctx.progress.report(BatchProgressEvent::FileDone {
                    n,
                    path: outcome.path.clone(),
                    status: outcome.status,
                });
                finished.push((index, outcome));
            }
            finished
        });
    }

    let mut indexed = Vec::new();
    while let Some(joined) = workers.join_next().await {
        indexed.extend(joined.context("batch worker panicked")?);
    }
    let stats = producer.await.context("discovery task panicked")?;

    indexed.sort_by_key(|(index, _)| *index);
    if indexed.len() as u64 != stats.analyzable_files {
        bail!(
            "batch lost outcomes: {} of {} files reported",
            indexed.len(),
            stats.analyzable_files
        );
    }
    let outcomes: Vec<FileOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

    let result = aggregate(batch_id, started_at, outcomes, stats, clock.elapsed());

    progress.report(BatchProgressEvent::Finished {
        analyzed: result.analyzed_count,
        skipped: result.skipped_count,
        errors: result.error_count,
    });
    tracing::info!(
        %batch_id,
        analyzable = result.analyzable_files,
        analyzed = result.analyzed_count,
        skipped = result.skipped_count,
        errors = result.error_count,
        duration_ms = result.total_duration_ms,
        "batch analysis finished"
    );

    Ok(result)
}

/// Drive one file to a terminal state.
async fn process_file(ctx: &WorkerContext, file: &CandidateFile) -> FileOutcome {
    let start = Instant::now();
    let path = file.relative_path.clone();

    let bytes = match tokio::fs::read(&file.absolute_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%path, error = %e, "failed to read file");
            return failed(path, FailureKind::Read, e.to_string(), start);
        }
    };
    let current = fingerprint(&bytes);

    let check = match ctx.store.check(&path, &current).await {
        Ok(check) => check,
        Err(e) => {
            tracing::warn!(%path, error = %e, "insight lookup failed; treating as cache miss");
            CacheCheck::default()
        }
    };

    if !needs_analysis(ctx.force, &check) {
        tracing::debug!(%path, "cache hit");
        return FileOutcome {
            path,
            status: OutcomeStatus::Skipped,
            analyzed: false,
            analysis: check.record.map(|r| r.analysis),
            error: None,
            duration_ms: elapsed_ms(start),
        };
    }

    let code = String::from_utf8_lossy(&bytes);
    let options = AnalyzeOptions {
        language: language_for_path(&path),
        file_path: path.clone(),
        checks: ctx.checks,
        timeout: ctx.timeout,
    };

    let result = match tokio::time::timeout(ctx.timeout, ctx.provider.analyze(&code, &options))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(ctx.timeout)),
    };

    match result {
        Ok(analysis) => {
            if let Err(e) = ctx.store.write(&path, &current, &analysis).await {
                tracing::warn!(
                    %path,
                    error = %e,
                    "insight record not persisted; file will be re-analyzed next run"
                );
            }
            FileOutcome {
                path,
                status: OutcomeStatus::Succeeded,
                analyzed: true,
                analysis: Some(analysis),
                error: None,
                duration_ms: elapsed_ms(start),
            }
        }
        Err(e) => {
            tracing::warn!(%path, kind = ?e.kind, error = %e.message, "analysis failed");
            failed(path, e.kind.into(), e.message, start)
        }
    }
}

fn failed(path: String, kind: FailureKind, message: String, start: Instant) -> FileOutcome {
    FileOutcome {
        path,
        status: OutcomeStatus::Failed,
        analyzed: false,
        analysis: None,
        error: Some(OutcomeError { kind, message }),
        duration_ms: elapsed_ms(start),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
