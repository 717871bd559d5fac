use async_trait::async_trait;
use chrono::Utc;

use crate::config::ProviderConfig;
use crate::models::AnalysisResult;

use super::prompt::{parse_review, system_prompt, user_prompt};
use super::{AnalysisProvider, AnalyzeOptions, ProviderError};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Client for any `POST {base}/chat/completions` API.
///
/// Shared by the hosted OpenAI provider and custom endpoints, which differ
/// only in URL, credentials and labelling.
pub(crate) struct ChatCompletions {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl ChatCompletions {
    pub(crate) fn new(
        client: reqwest::Client,
        base: &str,
        api_key: Option<String>,
        model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            model,
            max_tokens,
        }
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    /// Send the review prompts and return the parsed result.
    pub(crate) async fn review(
        &self,
        provider: &str,
        code: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system_prompt(&options.checks) },
                { "role": "user", "content": user_prompt(code, options) },
            ],
        });

        let mut request = self
            .client
            .post(&self.url)
            .timeout(options.timeout)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(provider, status, &body_text));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::malformed("response missing choices[0].message.content"))?;

        let review = parse_review(content)?;
        Ok(AnalysisResult {
            summary: review.summary,
            findings: review.findings,
            analyzed_at: Utc::now(),
            provider: provider.to_string(),
            model: self.model.clone(),
        })
    }
}

/// Hosted OpenAI chat completions.
///
/// Requires an API key (default variable `OPENAI_API_KEY`).
pub struct OpenAiProvider {
    chat: ChatCompletions,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig, api_key: String) -> Self {
        let base = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            chat: ChatCompletions::new(client, base, Some(api_key), model, config.max_tokens),
        }
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        self.chat.model()
    }

    async fn analyze(
        &self,
        code: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, ProviderError> {
        self.chat.review(self.name(), code, options).await
    }
}
