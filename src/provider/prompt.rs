//! Review prompt construction and response parsing.
//!
//! Every backend sends the same two prompts and expects the model to answer
//! with one JSON object:
//!
//! ```json
//! {
//!   "summary": "One paragraph overview",
//!   "findings": [
//!     { "severity": "high", "title": "...", "description": "...", "line": 42, "suggestion": "..." }
//!   ]
//! }
//! ```
//!
//! [`parse_review`] accepts the object bare, wrapped in a fenced code block,
//! or surrounded by prose.

use serde::Deserialize;
use serde_json::Value;

use crate::config::ReviewConfig;
use crate::models::{Finding, Severity};

use super::{AnalyzeOptions, ProviderError};

/// Summary and findings extracted from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub summary: String,
    pub findings: Vec<Finding>,
}

#[derive(Deserialize)]
struct RawReview {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    findings: Vec<RawFinding>,
}

#[derive(Deserialize)]
struct RawFinding {
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "message")]
    description: Option<String>,
    #[serde(default)]
    line: Option<Value>,
    #[serde(default, alias = "fix")]
    suggestion: Option<String>,
}

fn focus_areas(checks: &ReviewConfig) -> Vec<&'static str> {
    let mut areas = Vec::new();
    if checks.bugs {
        areas.push("correctness bugs and unhandled edge cases");
    }
    if checks.security {
        areas.push("security vulnerabilities");
    }
    if checks.performance {
        areas.push("performance problems");
    }
    if checks.style {
        areas.push("readability, naming and maintainability");
    }
    if areas.is_empty() {
        areas.push("any significant problem");
    }
    areas
}

pub fn system_prompt(checks: &ReviewConfig) -> String {
    let areas = focus_areas(checks)
        .iter()
        .map(|a| format!("- {}", a))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a meticulous senior code reviewer.\n\
         Review the single file you are given and report concrete, actionable problems.\n\
         Focus on:\n{areas}\n\n\
         Respond with exactly one JSON object and no other text:\n\
         {{\"summary\": string, \"findings\": [{{\"severity\": \"critical\"|\"high\"|\"medium\"|\"low\"|\"info\", \
         \"title\": string, \"description\": string, \"line\": number|null, \"suggestion\": string|null}}]}}\n\
         Use an empty findings array when the file has no problems."
    )
}

pub fn user_prompt(code: &str, options: &AnalyzeOptions) -> String {
    format!(
        "File: {}\nLanguage: {}\n\n```\n{}\n```",
        options.file_path, options.language, code
    )
}

/// Extract the review object from a model reply.
pub fn parse_review(reply: &str) -> Result<ParsedReview, ProviderError> {
    let candidate = extract_json(reply)
        .ok_or_else(|| ProviderError::malformed("reply does not contain a JSON object"))?;

    let raw: RawReview = serde_json::from_str(candidate)
        .map_err(|e| ProviderError::malformed(format!("invalid review JSON: {}", e)))?;

    let findings = raw
        .findings
        .into_iter()
        .filter_map(|f| {
            let title = f
                .title
                .filter(|t| !t.trim().is_empty())
                .or_else(|| f.description.clone())?;
            Some(Finding {
                severity: Severity::parse_lossy(f.severity.as_deref().unwrap_or("info")),
                title,
                description: f.description.unwrap_or_default(),
                line: f.line.as_ref().and_then(line_number),
                suggestion: f.suggestion.filter(|s| !s.trim().is_empty()),
            })
        })
        .collect();

    Ok(ParsedReview {
        summary: raw.summary.unwrap_or_default(),
        findings,
    })
}

fn line_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extract_json(reply: &str) -> Option<&str> {
    let text = reply.trim();

    // Prefer a fenced block when present.
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close > open).then(|| &text[open..=close])
}
