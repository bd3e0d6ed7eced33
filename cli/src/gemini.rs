use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use calori_core::advice::{GenerationError, GenerationParams, TextGenerator};
use calori_core::gemini::{API_BASE, DEFAULT_MODEL, GenerateRequest, GenerateResponse, error_for_status};

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("calori-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, "requesting advice");
        let resp = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&GenerateRequest::new(prompt, params))
            .send()
            .await
            .map_err(|e| GenerationError::Other(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GenerationError::Other(e.to_string()))?;
        if !status.is_success() {
            return Err(error_for_status(status.as_u16(), &body));
        }
        serde_json::from_str::<GenerateResponse>(&body)
            .map_err(|_| GenerationError::InvalidResponse)?
            .into_text()
    }
}
