//! External API providers for LLM
//! Supports Google Gemini, OpenAI-compatible endpoints, and Anthropic

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ApiProvider, GenerationConfig, LLMProvider, ProviderInfo};

/// External API provider
pub struct ExternalProvider {
    provider: ApiProvider,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalProvider {
    /// Parse a response body as JSON, returning a clear error if the server returned HTML.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}). Response: {}",
                endpoint,
                status,
                preview
            ));
        }
        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }

    /// Create new external provider
    pub fn new(provider: ApiProvider, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            provider,
            api_key,
            model,
            client,
        })
    }

    fn get_endpoint(&self) -> String {
        match &self.provider {
            ApiProvider::Google => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            ),
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            ApiProvider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    fn map_send_error(endpoint: &str, e: reqwest::Error) -> anyhow::Error {
        if e.is_timeout() {
            anyhow!("Request to {} timed out, check network connectivity", endpoint)
        } else if e.is_connect() {
            anyhow!("Failed to connect to {}: {}", endpoint, e)
        } else {
            anyhow!("Request to {} failed: {}", endpoint, e)
        }
    }
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let text = match &self.provider {
            ApiProvider::Google => self.google_generate(prompt, config).await?,
            ApiProvider::Anthropic => self.anthropic_generate(prompt, config).await?,
            ApiProvider::OpenAI
            | ApiProvider::OpenRouter
            | ApiProvider::Ollama
            | ApiProvider::Custom { .. } => self.openai_compatible_generate(prompt, config).await?,
        };

        if text.trim().is_empty() {
            return Err(anyhow!("{:?} returned an empty completion", self.provider));
        }
        Ok(text)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("{:?}", self.provider),
            model: self.model.clone(),
            context_window: match &self.provider {
                ApiProvider::Google => 1_000_000,
                ApiProvider::OpenAI => 128_000,
                ApiProvider::Anthropic => 200_000,
                ApiProvider::OpenRouter => 200_000,
                ApiProvider::Ollama => 32_768,
                ApiProvider::Custom { .. } => 4_096,
            },
            is_local: matches!(self.provider, ApiProvider::Ollama),
        }
    }
}

impl ExternalProvider {
    /// Google Gemini API generation
    async fn google_generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = self.get_endpoint();
        let request = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": config.temperature,
                "topP": config.top_p,
                "topK": config.top_k,
                "maxOutputTokens": config.max_tokens,
            }
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&endpoint, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await?;
            return Err(anyhow!("Google API error ({}): {}", status, error));
        }

        let result: GoogleResponse = Self::parse_json_response(response, &endpoint).await?;
        let text: String = result
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(anyhow!("No response from Google Gemini"));
        }
        Ok(text)
    }

    /// OpenAI-compatible generation (OpenAI, OpenRouter, Ollama, custom)
    async fn openai_compatible_generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        let endpoint = self.get_endpoint();
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": false
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&endpoint, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await?;
            return Err(anyhow!("API error ({}): {}", status, error));
        }

        let result: OpenAIResponse = Self::parse_json_response(response, &endpoint).await?;
        result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("OpenAI returned empty choices array"))
    }

    /// Anthropic generation
    async fn anthropic_generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = self.get_endpoint();
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&endpoint, e))?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(anyhow!("Anthropic API error: {}", error));
        }

        let result: AnthropicResponse = Self::parse_json_response(response, &endpoint).await?;
        result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| anyhow!("Anthropic returned empty content array"))
    }
}

/// Response structures
#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_endpoint_embeds_model() {
        let provider =
            ExternalProvider::new(ApiProvider::Google, "k".into(), "gemini-1.5-flash".into())
                .unwrap();
        assert_eq!(
            provider.get_endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(provider.info().model, "gemini-1.5-flash");
    }

    #[test]
    fn test_google_response_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let parsed: GoogleResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        assert_eq!(text, "{\"a\":1}");
    }

    #[test]
    fn test_custom_endpoint_is_used_verbatim() {
        let provider = ExternalProvider::new(
            ApiProvider::Custom {
                endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            },
            String::new(),
            "local".into(),
        )
        .unwrap();
        assert_eq!(provider.get_endpoint(), "http://127.0.0.1:9/v1/chat/completions");
        assert!(!provider.info().is_local);
    }
}
