use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::models::AnalysisResult;

use super::openai::ChatCompletions;
use super::{AnalysisProvider, AnalyzeOptions, ProviderError};

/// Self-hosted, OpenAI-compatible endpoint (Ollama, vLLM, LM Studio, ...).
///
/// `provider.endpoint` is the API base, e.g. `http://localhost:11434/v1`.
/// An API key is sent only when `provider.api_key_env` is configured.
pub struct CustomEndpointProvider {
    chat: ChatCompletions,
}

impl CustomEndpointProvider {
    pub fn new(
        client: reqwest::Client,
        config: &ProviderConfig,
        api_key: Option<String>,
    ) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow!("provider.endpoint required for custom provider"))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("provider.model required for custom provider"))?;

        Ok(Self {
            chat: ChatCompletions::new(client, endpoint, api_key, model, config.max_tokens),
        })
    }
}

#[async_trait]
impl AnalysisProvider for CustomEndpointProvider {
    fn name(&self) -> &str {
        "custom"
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
