use anyhow::Result;

use crate::config::Config;
use crate::models::{InsightRecord, SeveritySummary};
use crate::store::open_store;

/// Print one insight record, or a table of all records when `path` is `None`.
pub async fn run_insights(config: &Config, path: Option<&str>) -> Result<()> {
    let store = open_store(&config.store).await?;

    match path {
        Some(path) => match store.get(path).await? {
            Some(record) => print_record(&record),
            None => anyhow::bail!("No insight recorded for: {}", path),
        },
        None => {
            let records = store.all().await?;
            if records.is_empty() {
                println!("No insights recorded yet. Run `rvw analyze` first.");
                return Ok(());
            }
            println!(
                "{:<60} {:>4} {:>4} {:>4} {:>4} {:>4}  UPDATED",
                "PATH", "CRIT", "HIGH", "MED", "LOW", "INFO"
            );
            for record in &records {
                let s = severity_counts(record);
                println!(
                    "{:<60} {:>4} {:>4} {:>4} {:>4} {:>4}  {}",
                    record.path,
                    s.critical,
                    s.high,
                    s.medium,
                    s.low,
                    s.info,
                    record.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("{} records", records.len());
        }
    }
    Ok(())
}

fn severity_counts(record: &InsightRecord) -> SeveritySummary {
    let mut s = SeveritySummary::default();
    s.add_findings(&record.analysis.findings);
    s
}

fn print_record(record: &InsightRecord) {
    println!("{}", record.path);
    println!("  fingerprint: {}", record.fingerprint);
    println!(
        "  analyzed: {} by {}/{}",
        record.analysis.analyzed_at.to_rfc3339(),
        record.analysis.provider,
        record.analysis.model
    );
    if !record.analysis.summary.is_empty() {
        println!("  summary: {}", record.analysis.summary);
    }
    if record.analysis.findings.is_empty() {
        println!("  no findings");
    }
    for finding in &record.analysis.findings {
        let line = finding
            .line
            .map(|l| format!(":{}", l))
            .unwrap_or_default();
        println!(
            "  [{}]{} {}",
            finding.severity.as_str(),
            line,
            finding.title
        );
        if !finding.description.is_empty() {
            println!("      {}", finding.description);
        }
        if let Some(suggestion) = &finding.suggestion {
            println!("      suggestion: {}", suggestion);
        }
    }
}
