//! Rendering a [`BatchAnalysisResult`] as JSON, CSV, or plain text.
//!
//! Pure formatting: nothing here touches the cache or the scheduler.

use anyhow::{bail, Result};
use std::fmt::Write as _;
use std::path::Path;

use crate::models::{BatchAnalysisResult, FileOutcome, SeveritySummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "text" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unknown format: '{}'. Must be text, json, or csv.", other),
        }
    }
}

pub fn to_json(result: &BatchAnalysisResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn to_csv(result: &BatchAnalysisResult) -> String {
    let mut out =
        String::from("path,status,duration_ms,critical,high,medium,low,info,summary,error\n");
    for outcome in &result.results {
        let counts = outcome_counts(outcome);
        let summary = outcome
            .analysis
            .as_ref()
            .map(|a| a.summary.as_str())
            .unwrap_or("");
        let error = outcome
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.kind.as_str(), e.message))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            csv_field(&outcome.path),
            outcome.status.as_str(),
            outcome.duration_ms,
            counts.critical,
            counts.high,
            counts.medium,
            counts.low,
            counts.info,
            csv_field(summary),
            csv_field(&error),
        );
    }
    out
}

pub fn to_text(result: &BatchAnalysisResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "analyze {}", result.batch_id);
    let _ = writeln!(out, "  total files: {}", result.total_files);
    let _ = writeln!(out, "  analyzable files: {}", result.analyzable_files);
    let _ = writeln!(out, "  analyzed: {}", result.analyzed_count);
    let _ = writeln!(out, "  skipped (cached): {}", result.skipped_count);
    let _ = writeln!(out, "  failed: {}", result.error_count);
    if result.too_large_count > 0 {
        let _ = writeln!(out, "  skipped (too large): {}", result.too_large_count);
    }
    let s = &result.summary;
    let _ = writeln!(
        out,
        "  findings: {} critical, {} high, {} medium, {} low, {} info",
        s.critical, s.high, s.medium, s.low, s.info
    );
    let _ = writeln!(out, "  duration: {} ms", result.total_duration_ms);

    let failures: Vec<_> = result
        .results
        .iter()
        .filter_map(|o| o.error.as_ref().map(|e| (o, e)))
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "  failures:");
        for (outcome, err) in failures {
            let _ = writeln!(
                out,
                "    {} ({}): {}",
                outcome.path,
                err.kind.as_str(),
                err.message
            );
        }
    }
    for issue in &result.discovery_errors {
        let _ = writeln!(out, "  unreadable: {} ({})", issue.path, issue.message);
    }
    out.push_str(if result.error_count == 0 { "ok\n" } else { "done with errors\n" });
    out
}

/// Render `result` and write it to `output`, or stdout when `None`.
pub fn write_export(
    result: &BatchAnalysisResult,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let rendered = match format {
        ExportFormat::Json => to_json(result)?,
        ExportFormat::Csv => to_csv(result),
        ExportFormat::Text => to_text(result),
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!("Exported {} results to {}", result.results.len(), path.display());
        }
        None => {
            print!("{}", rendered);
        }
    }
    Ok(())
}

fn outcome_counts(outcome: &FileOutcome) -> SeveritySummary {
    let mut counts = SeveritySummary::default();
    if let Some(analysis) = &outcome.analysis {
        counts.add_findings(&analysis.findings);
    }
    counts
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
