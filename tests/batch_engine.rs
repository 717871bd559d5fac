use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use review_harness::batch::{run_batch_analysis, run_batch_with_handle};
use review_harness::config::{parse_config, Config};
use review_harness::models::{
    AnalysisResult, BatchAnalysisOptions, FailureKind, Finding, InsightRecord, OutcomeStatus,
    Severity, MAX_CONCURRENCY,
};
use review_harness::progress::{BatchProgressEvent, BatchProgressReporter, NoProgress};
use review_harness::provider::{
    AnalysisProvider, AnalyzeOptions, ProviderError, ProviderErrorKind, ProviderHandle,
};
use review_harness::store::{
    InsightStore, JsonInsightStore, MemoryInsightStore, StoreError, StoreResult,
};

// ============ Mock provider ============

/// Records call counts and peak concurrency; returns one finding per file,
/// `critical` when the source mentions "unsafe".
#[derive(Default)]
struct MockProvider {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    slow: HashSet<String>,
    failing: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl MockProvider {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-1"
    }

    async fn analyze(
        &self,
        code: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(options.file_path.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.slow.contains(&options.file_path) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        } else if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.contains(&options.file_path) {
            return Err(ProviderError::new(
                ProviderErrorKind::RateLimited,
                "too many requests",
            ));
        }

        let severity = if code.contains("unsafe") {
            Severity::Critical
        } else {
            Severity::Low
        };
        Ok(AnalysisResult {
            summary: format!("reviewed {}", options.file_path),
            findings: vec![Finding {
                severity,
                title: "finding".into(),
                description: String::new(),
                line: Some(1),
                suggestion: None,
            }],
            analyzed_at: Utc::now(),
            provider: "mock".into(),
            model: "mock-1".into(),
        })
    }
}

#[derive(Default)]
struct RecordingProgress {
    done: AtomicUsize,
    finished: AtomicUsize,
}

impl BatchProgressReporter for RecordingProgress {
    fn report(&self, event: BatchProgressEvent) {
        match event {
            BatchProgressEvent::FileDone { .. } => {
                self.done.fetch_add(1, Ordering::SeqCst);
            }
            BatchProgressEvent::Finished { .. } => {
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
            BatchProgressEvent::Discovering { .. } => {}
        }
    }
}

/// Reads through to memory; every write fails.
#[derive(Default)]
struct ReadOnlyStore {
    inner: MemoryInsightStore,
}

#[async_trait]
impl InsightStore for ReadOnlyStore {
    async fn write(
        &self,
        _path: &str,
        _fingerprint: &str,
        _analysis: &AnalysisResult,
    ) -> StoreResult<InsightRecord> {
        Err(StoreError::Write("disk full".into()))
    }

    async fn get(&self, path: &str) -> StoreResult<Option<InsightRecord>> {
        self.inner.get(path).await
    }

    async fn all(&self) -> StoreResult<Vec<InsightRecord>> {
        self.inner.all().await
    }

    async fn remove(&self, path: &str) -> StoreResult<bool> {
        self.inner.remove(path).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

// ============ Fixtures ============

fn config(concurrency: i64) -> Config {
    parse_config(&format!(
        r#"
[project]
extensions = ["rs", "py"]
max_file_size = 4096

[provider]
kind = "custom"
endpoint = "http://127.0.0.1:9/v1"
model = "mock-1"
timeout_secs = 30

[batch]
concurrency = {}

[store]
backend = "memory"
"#,
        concurrency
    ))
    .unwrap()
}

/// Three analyzable files plus one unsupported file.
fn three_file_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::write(root.join("a.rs"), "fn a() { unsafe { } }").unwrap();
    fs::write(root.join("b.py"), "def b():\n    return 1\n").unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/c.rs"), "pub fn c() {}").unwrap();
    fs::write(root.join("README.md"), "# readme").unwrap();
    tmp
}

async fn run(
    root: &Path,
    cfg: &Config,
    store: Arc<dyn InsightStore>,
    provider: Arc<MockProvider>,
    options: BatchAnalysisOptions,
) -> review_harness::models::BatchAnalysisResult {
    run_batch_analysis(root, cfg, store, provider, &options, Arc::new(NoProgress))
        .await
        .unwrap()
}

fn forced() -> BatchAnalysisOptions {
    BatchAnalysisOptions {
        force: true,
        ..Default::default()
    }
}

// ============ Cache gating ============

#[tokio::test]
async fn first_run_analyzes_every_file_then_second_run_skips_all() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());

    let first = run(project.path(), &cfg, store.clone(), provider.clone(), Default::default()).await;
    assert_eq!(first.total_files, 4);
    assert_eq!(first.analyzable_files, 3);
    assert_eq!(first.analyzed_count, 3);
    assert_eq!(first.skipped_count, 0);
    assert_eq!(first.error_count, 0);
    assert_eq!(provider.calls(), 3);
    assert_eq!(store.count().await.unwrap(), 3);
    assert!(first.results.iter().all(|o| o.analyzed));

    let second =
        run(project.path(), &cfg, store.clone(), provider.clone(), Default::default()).await;
    assert_eq!(second.analyzed_count, 0);
    assert_eq!(second.skipped_count, 3);
    assert_eq!(provider.calls(), 3, "cache hits must not reach the provider");
    assert!(second
        .results
        .iter()
        .all(|o| o.status == OutcomeStatus::Skipped && !o.analyzed && o.analysis.is_some()));

    // Cached analyses keep the summary stable across runs.
    assert_eq!(first.summary, second.summary);
    assert_eq!(second.summary.critical, 1);
    assert_eq!(second.summary.low, 2);
}

#[tokio::test]
async fn force_reanalyzes_every_file() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());

    run(project.path(), &cfg, store.clone(), provider.clone(), Default::default()).await;
    let forced_run = run(project.path(), &cfg, store.clone(), provider.clone(), forced()).await;

    assert_eq!(forced_run.analyzed_count, 3);
    assert_eq!(forced_run.skipped_count, 0);
    assert_eq!(provider.calls(), 6);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn only_the_changed_file_is_reanalyzed() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());

    run(project.path(), &cfg, store.clone(), provider.clone(), Default::default()).await;
    let before = store.get("b.py").await.unwrap().unwrap();

    fs::write(project.path().join("b.py"), "def b():\n    return 2\n").unwrap();
    let result = run(project.path(), &cfg, store.clone(), provider.clone(), Default::default()).await;

    assert_eq!(result.analyzed_count, 1);
    assert_eq!(result.skipped_count, 2);
    assert_eq!(provider.calls(), 4);

    let changed = result.results.iter().find(|o| o.path == "b.py").unwrap();
    assert_eq!(changed.status, OutcomeStatus::Succeeded);

    let after = store.get("b.py").await.unwrap().unwrap();
    assert_ne!(before.fingerprint, after.fingerprint);
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn results_follow_discovery_order() {
    let project = three_file_project();
    let cfg = config(3);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::with_delay(Duration::from_millis(20)));

    let result = run(project.path(), &cfg, store, provider, Default::default()).await;
    let paths: Vec<_> = result.results.iter().map(|o| o.path.as_str()).collect();
    assert_eq!(paths, vec!["a.rs", "b.py", "src/c.rs"]);
}

// ============ Failure isolation ============

#[tokio::test]
async fn provider_failure_is_isolated_to_its_file() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider {
        failing: HashSet::from(["b.py".to_string()]),
        ..Default::default()
    });

    let result = run(project.path(), &cfg, store.clone(), provider, Default::default()).await;

    assert_eq!(result.analyzed_count, 2);
    assert_eq!(result.error_count, 1);
    assert_eq!(
        result.analyzed_count + result.skipped_count + result.error_count,
        result.analyzable_files
    );

    let failed = result.results.iter().find(|o| o.path == "b.py").unwrap();
    assert_eq!(failed.status, OutcomeStatus::Failed);
    assert!(failed.analysis.is_none());
    assert_eq!(failed.error.as_ref().unwrap().kind, FailureKind::RateLimited);

    // Failed files leave no record and are retried next run.
    assert!(store.get("b.py").await.unwrap().is_none());
    assert!(store.get("a.rs").await.unwrap().is_some());
}

#[tokio::test]
async fn slow_file_times_out_without_stalling_the_batch() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider {
        slow: HashSet::from(["a.rs".to_string()]),
        ..Default::default()
    });
    let options = BatchAnalysisOptions {
        timeout_secs: Some(1),
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let result = run(project.path(), &cfg, store, provider, options).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(result.error_count, 1);
    assert_eq!(result.analyzed_count, 2);
    let slow = &result.results[0];
    assert_eq!(slow.path, "a.rs");
    assert_eq!(slow.error.as_ref().unwrap().kind, FailureKind::Timeout);
}

#[tokio::test]
async fn failed_reanalysis_keeps_the_prior_record() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());

    run(
        project.path(),
        &cfg,
        store.clone(),
        Arc::new(MockProvider::default()),
        Default::default(),
    )
    .await;
    let before = store.get("b.py").await.unwrap().unwrap();

    fs::write(project.path().join("b.py"), "def b():\n    return 2\n").unwrap();
    let failing = Arc::new(MockProvider {
        failing: HashSet::from(["b.py".to_string()]),
        ..Default::default()
    });
    let result = run(project.path(), &cfg, store.clone(), failing, Default::default()).await;

    assert_eq!(result.error_count, 1);
    assert_eq!(result.skipped_count, 2);
    let after = store.get("b.py").await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn unpersisted_result_still_succeeds_and_is_retried() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(ReadOnlyStore::default());
    let provider = Arc::new(MockProvider::default());

    let first = run(project.path(), &cfg, store.clone(), provider.clone(), Default::default()).await;
    assert_eq!(first.analyzed_count, 3);
    assert_eq!(first.error_count, 0);
    assert!(first
        .results
        .iter()
        .all(|o| o.status == OutcomeStatus::Succeeded && o.analysis.is_some()));

    let second = run(project.path(), &cfg, store, provider.clone(), Default::default()).await;
    assert_eq!(second.analyzed_count, 3);
    assert_eq!(second.skipped_count, 0);
    assert_eq!(provider.calls(), 6);
}

// ============ Scheduling ============

#[tokio::test]
async fn in_flight_calls_never_exceed_concurrency() {
    let tmp = TempDir::new().unwrap();
    for i in 0..12 {
        fs::write(tmp.path().join(format!("f{:02}.rs", i)), format!("fn f{}() {{}}", i)).unwrap();
    }
    let cfg = config(1);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::with_delay(Duration::from_millis(40)));
    let options = BatchAnalysisOptions {
        concurrency: Some(3),
        ..Default::default()
    };

    let result = run(tmp.path(), &cfg, store, provider.clone(), options).await;
    assert_eq!(result.analyzed_count, 12);
    assert_eq!(provider.calls(), 12);
    let peak = provider.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight calls was {}", peak);
    assert!(peak >= 2, "workers never overlapped (peak {})", peak);
}

#[tokio::test]
async fn non_positive_concurrency_runs_sequentially() {
    let project = three_file_project();
    let cfg = config(4);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::with_delay(Duration::from_millis(20)));
    let options = BatchAnalysisOptions {
        concurrency: Some(0),
        ..Default::default()
    };

    let result = run(project.path(), &cfg, store, provider.clone(), options).await;
    assert_eq!(result.analyzed_count, 3);
    assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_concurrency_is_capped() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::with_delay(Duration::from_millis(20)));
    let options = BatchAnalysisOptions {
        concurrency: Some(i64::MAX),
        ..Default::default()
    };
    assert_eq!(options.effective_concurrency(cfg.batch.concurrency), MAX_CONCURRENCY);

    let result = run(project.path(), &cfg, store, provider.clone(), options).await;
    assert_eq!(result.analyzed_count, 3);
    assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn progress_sees_every_file_once() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());
    let progress = Arc::new(RecordingProgress::default());

    run_batch_analysis(
        project.path(),
        &cfg,
        store,
        provider,
        &BatchAnalysisOptions::default(),
        progress.clone(),
    )
    .await
    .unwrap();

    assert_eq!(progress.done.load(Ordering::SeqCst), 3);
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
}

// ============ Discovery interplay ============

#[tokio::test]
async fn extension_override_and_size_limit() {
    let project = three_file_project();
    fs::write(project.path().join("big.py"), "x = 1\n".repeat(2000)).unwrap();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());
    let options = BatchAnalysisOptions {
        extensions: Some(vec![".py".into()]),
        ..Default::default()
    };

    let result = run(project.path(), &cfg, store, provider.clone(), options).await;
    assert_eq!(result.analyzable_files, 1);
    assert_eq!(result.too_large_count, 1);
    assert_eq!(result.results[0].path, "b.py");
    assert_eq!(*provider.seen.lock().unwrap(), vec!["b.py".to_string()]);
}

#[tokio::test]
async fn empty_project_yields_empty_report() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());

    let result = run(tmp.path(), &cfg, store, provider.clone(), Default::default()).await;
    assert_eq!(result.analyzable_files, 0);
    assert!(result.results.is_empty());
    assert_eq!(result.summary.total(), 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn missing_root_fails_before_scheduling() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());

    let err = run_batch_analysis(
        &tmp.path().join("nope"),
        &cfg,
        store,
        provider.clone(),
        &BatchAnalysisOptions::default(),
        Arc::new(NoProgress),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not a directory"));
    assert_eq!(provider.calls(), 0);
}

// ============ Provider handle ============

#[tokio::test]
async fn missing_credential_fails_before_any_file_is_touched() {
    let project = three_file_project();
    let mut cfg = config(2);
    cfg.provider.kind = "openai".into();
    cfg.provider.api_key_env = Some("RVW_TEST_KEY_THAT_IS_NEVER_SET".into());
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let handle = ProviderHandle::new();

    let err = run_batch_with_handle(
        project.path(),
        &cfg,
        store.clone(),
        &handle,
        &BatchAnalysisOptions::default(),
        Arc::new(NoProgress),
    )
    .await
    .unwrap_err();

    assert!(format!("{:#}", err).contains("RVW_TEST_KEY_THAT_IS_NEVER_SET environment variable not set"));
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(handle.current().is_none());
}

#[tokio::test]
async fn handle_reuses_the_installed_provider() {
    let project = three_file_project();
    let cfg = config(2);
    let store: Arc<dyn InsightStore> = Arc::new(MemoryInsightStore::new());
    let provider = Arc::new(MockProvider::default());
    let handle = ProviderHandle::with_provider(provider.clone());

    let result = run_batch_with_handle(
        project.path(),
        &cfg,
        store,
        &handle,
        &BatchAnalysisOptions::default(),
        Arc::new(NoProgress),
    )
    .await
    .unwrap();
    assert_eq!(result.analyzed_count, 3);
    assert_eq!(provider.calls(), 3);
}

// ============ Persistence ============

#[tokio::test]
async fn json_store_keeps_insights_across_processes() {
    let project = three_file_project();
    let cache = TempDir::new().unwrap();
    let cache_path = cache.path().join("nested/insights.json");
    let cfg = config(2);
    let provider = Arc::new(MockProvider::default());

    let store: Arc<dyn InsightStore> = Arc::new(JsonInsightStore::open(&cache_path).await.unwrap());
    run(project.path(), &cfg, store, provider.clone(), Default::default()).await;
    assert!(cache_path.exists());

    let reopened: Arc<dyn InsightStore> =
        Arc::new(JsonInsightStore::open(&cache_path).await.unwrap());
    let result = run(project.path(), &cfg, reopened, provider.clone(), Default::default()).await;
    assert_eq!(result.skipped_count, 3);
    assert_eq!(provider.calls(), 3);
}
