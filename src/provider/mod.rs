//! Analysis provider abstraction and implementations.
//!
//! Defines the [`AnalysisProvider`] trait and the closed set of backends:
//! - **[`OpenAiProvider`]**: hosted OpenAI chat completions.
//! - **[`AnthropicProvider`]**: hosted Anthropic messages API.
//! - **[`CustomEndpointProvider`]**: any self-hosted OpenAI-compatible endpoint
//!   (Ollama, vLLM, LM Studio, an internal gateway).
//!
//! # Provider Selection
//!
//! The backend is chosen once, when the provider is built from
//! `[provider]` configuration via [`create_provider`]. Callers keep the
//! result in a [`ProviderHandle`] and rebuild it explicitly when the
//! configuration changes.
//!
//! # Error Contract
//!
//! Every backend reports failures as a [`ProviderError`] with one of five
//! [`ProviderErrorKind`]s:
//! - transport deadline exceeded → `Timeout`
//! - HTTP 401 / 403 → `Auth`
//! - HTTP 429 → `RateLimited`
//! - body not in the expected review shape → `Malformed`
//! - connection failures, 5xx, anything else → `Unavailable`
//!
//! Providers never retry; retry decisions belong to the caller.

mod anthropic;
mod custom;
mod openai;
pub mod prompt;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ProviderConfig, ReviewConfig};
use crate::models::{AnalysisResult, FailureKind};

pub use anthropic::AnthropicProvider;
pub use custom::CustomEndpointProvider;
pub use openai::OpenAiProvider;

/// Uniform failure classes for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    Auth,
    RateLimited,
    Malformed,
    Unavailable,
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Timeout => FailureKind::Timeout,
            ProviderErrorKind::Auth => FailureKind::Auth,
            ProviderErrorKind::RateLimited => FailureKind::RateLimited,
            ProviderErrorKind::Malformed => FailureKind::Malformed,
            ProviderErrorKind::Unavailable => FailureKind::Unavailable,
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("analysis timed out after {}s", after.as_secs_f64()),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, message)
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => ProviderErrorKind::Auth,
            429 => ProviderErrorKind::RateLimited,
            _ => ProviderErrorKind::Unavailable,
        };
        Self::new(kind, format!("{} API error {}: {}", provider, status, truncate(body, 300)))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_decode() {
            ProviderErrorKind::Malformed
        } else {
            ProviderErrorKind::Unavailable
        };
        Self::new(kind, err.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Per-call inputs besides the source text.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Human-readable language name (e.g. `"Rust"`).
    pub language: String,
    /// Root-relative path, shown to the model for context.
    pub file_path: String,
    pub checks: ReviewConfig,
    /// Deadline for the whole call.
    pub timeout: Duration,
}

/// A backend that reviews one file of source text.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Provider identifier (`"openai"`, `"anthropic"`, `"custom"`).
    fn name(&self) -> &str;
    /// Model identifier sent to the backend.
    fn model(&self) -> &str;

    async fn analyze(
        &self,
        code: &str,
        options: &AnalyzeOptions,
    ) -> std::result::Result<AnalysisResult, ProviderError>;
}

/// Build the provider selected by `config`, reading credentials from the
/// process environment.
///
/// # Errors
///
/// Fails for unknown kinds, a missing endpoint or model where one is
/// required, or a missing API key.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn AnalysisProvider>> {
    create_provider_with(config, |name| std::env::var(name).ok())
}

/// Like [`create_provider`], with an explicit credential lookup.
pub fn create_provider_with<F>(config: &ProviderConfig, lookup: F) -> Result<Arc<dyn AnalysisProvider>>
where
    F: Fn(&str) -> Option<String>,
{
    let key = match config.key_env() {
        Some(name) => match lookup(name).filter(|v| !v.trim().is_empty()) {
            Some(value) => Some(value),
            None => bail!("{} environment variable not set", name),
        },
        None => None,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let provider: Arc<dyn AnalysisProvider> = match config.kind.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(client, config, key.unwrap_or_default())),
        "anthropic" => Arc::new(AnthropicProvider::new(client, config, key.unwrap_or_default())),
        "custom" => Arc::new(CustomEndpointProvider::new(client, config, key)?),
        other => bail!("Unknown provider kind: {}", other),
    };

    tracing::debug!(
        provider = provider.name(),
        model = provider.model(),
        "analysis provider ready"
    );
    Ok(provider)
}

/// Caller-owned slot holding the active provider.
///
/// Built lazily on first use; replaced only through [`rebuild`](Self::rebuild)
/// or cleared through [`invalidate`](Self::invalidate).
#[derive(Default)]
pub struct ProviderHandle {
    current: RwLock<Option<Arc<dyn AnalysisProvider>>>,
}

impl ProviderHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle pre-populated with `provider`.
    pub fn with_provider(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            current: RwLock::new(Some(provider)),
        }
    }

    pub fn current(&self) -> Option<Arc<dyn AnalysisProvider>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Return the active provider, building it from `config` if the slot is empty.
    pub fn get_or_build(&self, config: &ProviderConfig) -> Result<Arc<dyn AnalysisProvider>> {
        if let Some(provider) = self.current() {
            return Ok(provider);
        }
        self.rebuild(config)
    }

    /// Replace the active provider with one built from `config`.
    ///
    /// On failure the slot is left empty so a stale provider is never used.
    pub fn rebuild(&self, config: &ProviderConfig) -> Result<Arc<dyn AnalysisProvider>> {
        let built = create_provider(config);
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match built {
            Ok(provider) => {
                *slot = Some(provider.clone());
                Ok(provider)
            }
            Err(e) => {
                *slot = None;
                Err(e)
            }
        }
    }

    pub fn invalidate(&self) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Language name for a path, derived from its extension.
pub fn language_for_path(path: &str) -> String {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let name = match ext {
        "rs" => "Rust",
        "py" | "pyi" => "Python",
        "js" | "mjs" | "cjs" => "JavaScript",
        "jsx" => "JavaScript (JSX)",
        "ts" | "mts" | "cts" => "TypeScript",
        "tsx" => "TypeScript (TSX)",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "scala" => "Scala",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",
        "" => "text",
        other => other,
    };
    name.to_string()
}
