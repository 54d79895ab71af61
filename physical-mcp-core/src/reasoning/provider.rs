//! Vision provider abstraction: all LLM backends implement this trait over
//! plain HTTP via `reqwest`, matching each provider's public REST API
//! rather than pulling in a provider-specific SDK crate.

use serde_json::{json, Value};

use crate::error::ProviderError;

use super::json_extract::extract_json;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_TOKENS: u32 = 500;

/// Abstract interface for vision-capable LLM providers.
#[allow(async_fn_in_trait)]
pub trait VisionProvider: Send + Sync {
    async fn analyze_image(&self, image_b64: &str, prompt: &str) -> Result<String, ProviderError>;

    async fn analyze_image_json(&self, image_b64: &str, prompt: &str) -> Result<Value, ProviderError> {
        let text = self.analyze_image(image_b64, prompt).await?;
        extract_json(&text).map_err(ProviderError::Other)
    }

    /// Multiple images in one call; default implementation uses only the
    /// most recent frame since not every provider's HTTP API multiplexes
    /// images into one request the same way.
    async fn analyze_images(&self, images_b64: &[String], prompt: &str) -> Result<String, ProviderError> {
        let last = images_b64.last().ok_or_else(|| ProviderError::Other("no frames provided".into()))?;
        self.analyze_image(last, prompt).await
    }

    async fn analyze_images_json(&self, images_b64: &[String], prompt: &str) -> Result<Value, ProviderError> {
        let text = self.analyze_images(images_b64, prompt).await?;
        extract_json(&text).map_err(ProviderError::Other)
    }

    async fn warmup(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn provider_name(&self) -> String;
    fn model_name(&self) -> String;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("static client config is valid")
}

fn classify_http_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    ProviderError::classify(&format!("{status} {body}"))
}

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        AnthropicProvider {
            api_key: api_key.into(),
            model: model.into(),
            client: http_client(),
        }
    }
}

impl VisionProvider for AnthropicProvider {
    async fn analyze_image(&self, image_b64: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": image_b64}},
                    {"type": "text", "text": prompt},
                ],
            }],
        });

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_http_error(status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Other(format!("malformed response: {e}")))?;
        value["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Other("missing content[0].text in response".into()))
    }

    fn provider_name(&self) -> String {
        "anthropic".to_string()
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Covers OpenAI itself plus any OpenAI-compatible chat-completions API
/// (Kimi, DeepSeek, Together, Groq, ...) selected via `base_url`.
pub struct OpenAiCompatProvider {
    api_key: String,
    model: String,
    base_url: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<String>) -> Self {
        OpenAiCompatProvider {
            api_key: api_key.into(),
            model: model.into(),
            base_url,
            client: http_client(),
        }
    }

    fn endpoint(&self) -> String {
        match &self.base_url {
            Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
            None => "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

impl VisionProvider for OpenAiCompatProvider {
    async fn analyze_image(&self, image_b64: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{image_b64}"), "detail": "low"}},
                    {"type": "text", "text": prompt},
                ],
            }],
        });

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_http_error(status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Other(format!("malformed response: {e}")))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Other("missing choices[0].message.content in response".into()))
    }

    fn provider_name(&self) -> String {
        match &self.base_url {
            Some(base) => format!("openai-compatible ({base})"),
            None => "openai".to_string(),
        }
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

pub struct GoogleProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        GoogleProvider {
            api_key: api_key.into(),
            model: model.into(),
            client: http_client(),
        }
    }
}

impl VisionProvider for GoogleProvider {
    async fn analyze_image(&self, image_b64: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = json!({
            "contents": [{
                "parts": [
                    {"inline_data": {"mime_type": "image/jpeg", "data": image_b64}},
                    {"text": prompt},
                ],
            }],
            "generationConfig": {"maxOutputTokens": MAX_TOKENS},
        });

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_http_error(status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Other(format!("malformed response: {e}")))?;
        value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Other("missing candidates[0].content.parts[0].text in response".into()))
    }

    fn provider_name(&self) -> String {
        "google".to_string()
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Enum dispatch over all supported providers, avoiding `dyn VisionProvider`
/// (not object-safe, since its methods are `async fn` in trait).
pub enum AnyProvider {
    Anthropic(AnthropicProvider),
    OpenAiCompat(OpenAiCompatProvider),
    Google(GoogleProvider),
}

impl VisionProvider for AnyProvider {
    async fn analyze_image(&self, image_b64: &str, prompt: &str) -> Result<String, ProviderError> {
        match self {
            AnyProvider::Anthropic(p) => p.analyze_image(image_b64, prompt).await,
            AnyProvider::OpenAiCompat(p) => p.analyze_image(image_b64, prompt).await,
            AnyProvider::Google(p) => p.analyze_image(image_b64, prompt).await,
        }
    }

    fn provider_name(&self) -> String {
        match self {
            AnyProvider::Anthropic(p) => p.provider_name(),
            AnyProvider::OpenAiCompat(p) => p.provider_name(),
            AnyProvider::Google(p) => p.provider_name(),
        }
    }

    fn model_name(&self) -> String {
        match self {
            AnyProvider::Anthropic(p) => p.model_name(),
            AnyProvider::OpenAiCompat(p) => p.model_name(),
            AnyProvider::Google(p) => p.model_name(),
        }
    }
}

/// Builds the configured provider, or `None` if no provider/api_key is set.
pub fn create_provider(config: &crate::config::ReasoningConfig) -> Option<AnyProvider> {
    if config.provider.is_empty() || config.api_key.is_empty() {
        return None;
    }

    match config.provider.as_str() {
        "anthropic" => {
            let model = if config.model.is_empty() {
                "claude-haiku-4-20250414".to_string()
            } else {
                config.model.clone()
            };
            Some(AnyProvider::Anthropic(AnthropicProvider::new(&config.api_key, model)))
        }
        "openai" => {
            let model = if config.model.is_empty() { "gpt-4o-mini".to_string() } else { config.model.clone() };
            Some(AnyProvider::OpenAiCompat(OpenAiCompatProvider::new(&config.api_key, model, None)))
        }
        "openai-compatible" => {
            let model = if config.model.is_empty() { "gpt-4o-mini".to_string() } else { config.model.clone() };
            Some(AnyProvider::OpenAiCompat(OpenAiCompatProvider::new(
                &config.api_key,
                model,
                Some(config.base_url.clone()),
            )))
        }
        "google" => {
            let model = if config.model.is_empty() { "gemini-2.0-flash".to_string() } else { config.model.clone() };
            Some(AnyProvider::Google(GoogleProvider::new(&config.api_key, model)))
        }
        other => {
            log::warn!("Unknown provider: {other}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReasoningConfig;

    fn base_config() -> ReasoningConfig {
        ReasoningConfig {
            provider: String::new(),
            api_key: String::new(),
            model: String::new(),
            base_url: String::new(),
            image_quality: 60,
            max_thumbnail_dim: 640,
        }
    }

    #[test]
    fn create_provider_returns_none_without_api_key() {
        let mut config = base_config();
        config.provider = "anthropic".to_string();
        assert!(create_provider(&config).is_none());
    }

    #[test]
    fn create_provider_returns_none_for_unknown_provider() {
        let mut config = base_config();
        config.provider = "made-up".to_string();
        config.api_key = "key".to_string();
        assert!(create_provider(&config).is_none());
    }

    #[test]
    fn create_provider_builds_anthropic_with_default_model() {
        let mut config = base_config();
        config.provider = "anthropic".to_string();
        config.api_key = "key".to_string();
        let provider = create_provider(&config).expect("should build");
        assert_eq!(provider.provider_name(), "anthropic");
        assert_eq!(provider.model_name(), "claude-haiku-4-20250414");
    }

    #[test]
    fn create_provider_openai_compatible_reports_base_url_in_name() {
        let mut config = base_config();
        config.provider = "openai-compatible".to_string();
        config.api_key = "key".to_string();
        config.base_url = "https://example.com/v1".to_string();
        let provider = create_provider(&config).expect("should build");
        assert!(provider.provider_name().contains("example.com"));
    }
}
