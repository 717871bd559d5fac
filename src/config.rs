use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Glob patterns matched against an entry's name or its relative path.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            ignore: Vec::new(),
            extensions: default_extensions(),
            max_file_size: default_max_file_size(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_extensions() -> Vec<String> {
    [
        "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "hpp", "cs", "rb",
        "php", "swift", "kt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_file_size() -> u64 {
    1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// `openai`, `anthropic`, or `custom`.
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL. Required for `custom`; overrides the default for hosted kinds.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    2048
}

/// Which categories of issues the reviewer is asked to look for.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ReviewConfig {
    #[serde(default = "default_true")]
    pub security: bool,
    #[serde(default = "default_true")]
    pub performance: bool,
    #[serde(default = "default_true")]
    pub style: bool,
    #[serde(default = "default_true")]
    pub bugs: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            security: true,
            performance: true,
            style: true,
            bugs: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> i64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `json`, `sqlite`, or `memory`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

fn default_store_backend() -> String {
    "json".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".review/insights.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl ProviderConfig {
    /// Environment variable consulted for the API key, if any.
    pub fn key_env(&self) -> Option<&str> {
        match (self.api_key_env.as_deref(), self.kind.as_str()) {
            (Some(name), _) => Some(name),
            (None, "openai") => Some("OPENAI_API_KEY"),
            (None, "anthropic") => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate provider
    match config.provider.kind.as_str() {
        "openai" | "anthropic" => {}
        "custom" => {
            if config.provider.endpoint.as_deref().unwrap_or("").is_empty() {
                bail!("provider.endpoint must be set when provider.kind is 'custom'");
            }
        }
        other => bail!(
            "Unknown provider kind: '{}'. Must be openai, anthropic, or custom.",
            other
        ),
    }
    if config.provider.timeout_secs == 0 {
        bail!("provider.timeout_secs must be > 0");
    }

    // Validate project
    if config.project.max_file_size == 0 {
        bail!("project.max_file_size must be > 0");
    }
    if config.project.extensions.is_empty() {
        bail!("project.extensions must not be empty");
    }

    match config.store.backend.as_str() {
        "json" | "sqlite" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be json, sqlite, or memory.",
            other
        ),
    }

    Ok(config)
}
