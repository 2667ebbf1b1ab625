use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::OpenAiConfig;
use crate::errors::GenerationError;

const SYSTEM_PROMPT: &str = "You are a professional LinkedIn content creator.";

/// Chat-completions and image-generation client with bounded retries.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(GenerationError::MissingApiKey)?;
        info!(
            "OpenAI client initialized (text={}, image={})",
            config.text_model, config.image_model
        );
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GenerationError::Http(err.to_string()))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn from_env() -> Result<Self, GenerationError> {
        Self::new(OpenAiConfig::from_env())
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.config.text_model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 1000,
            "temperature": 0.7,
        });
        let response: ChatCompletionResponse =
            self.post_with_retry("chat/completions", &body).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyResponse)?;
        info!("text generated with model: {}", self.config.text_model);
        Ok(content)
    }

    /// Returns the decoded PNG bytes of one generated image.
    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        let mut body = json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "size": self.config.image_size,
            "n": 1,
            "response_format": "b64_json",
        });
        if self.config.image_model == "dall-e-3" {
            body["quality"] = Value::String(self.config.image_quality.clone());
        }
        let response: ImagesResponse = self.post_with_retry("images/generations", &body).await?;

        let encoded = response
            .data
            .into_iter()
            .next()
            .and_then(|image| image.b64_json)
            .ok_or(GenerationError::EmptyResponse)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| GenerationError::Decode(err.to_string()))?;
        info!("image generated with model: {}", self.config.image_model);
        Ok(bytes)
    }

    /// Rate limits back off linearly with the attempt number; server errors
    /// and transport failures wait a fixed delay. Anything else fails at once.
    async fn post_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, GenerationError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt: u32 = 1;

        loop {
            let err = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|err| GenerationError::Decode(err.to_string()));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    GenerationError::Status { status, body }
                }
                Err(err) => GenerationError::Http(err.to_string()),
            };

            let delay = match &err {
                GenerationError::Status { status: 429, .. } => {
                    Some(self.config.retry_delay * attempt)
                }
                GenerationError::Status { status, .. } if *status >= 500 => {
                    Some(self.config.retry_delay)
                }
                GenerationError::Http(_) => Some(self.config.retry_delay),
                _ => None,
            };

            match delay {
                Some(delay) if attempt < max_attempts => {
                    warn!(
                        "OpenAI {} attempt {}/{} failed, retrying in {:?}: {}",
                        path, attempt, max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    error!("OpenAI {} failed on attempt {}: {}", path, attempt, err);
                    return Err(err);
                }
            }
        }
    }
}
