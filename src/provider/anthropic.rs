use async_trait::async_trait;
use chrono::Utc;

use crate::config::ProviderConfig;
use crate::models::AnalysisResult;

use super::prompt::{parse_review, system_prompt, user_prompt};
use super::{AnalysisProvider, AnalyzeOptions, ProviderError};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

/// Hosted Anthropic messages API.
///
/// Requires an API key (default variable `ANTHROPIC_API_KEY`).
pub struct AnthropicProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig, api_key: String) -> Self {
        let base = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        Self {
            client,
            url: format!("{}/messages", base.trim_end_matches('/')),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl AnalysisProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn analyze(
        &self,
        code: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt(&options.checks),
            "messages": [
                { "role": "user", "content": user_prompt(code, options) },
            ],
        });

        let response = self
            .client
            .post(&self.url)
            .timeout(options.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(self.name(), status, &body_text));
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            })
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| ProviderError::malformed("response has no text content block"))?;

        let review = parse_review(text)?;
        Ok(AnalysisResult {
            summary: review.summary,
            findings: review.findings,
            analyzed_at: Utc::now(),
            provider: self.name().to_string(),
            model: self.model.clone(),
        })
    }
}
