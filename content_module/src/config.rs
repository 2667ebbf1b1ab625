use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-2";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
pub const DEFAULT_IMAGE_QUALITY: &str = "standard";
pub const DEFAULT_IMAGES_DIR: &str = "assets/media/generated";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for the text/image generation provider.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub image_size: String,
    /// Only sent for `dall-e-3`.
    pub image_quality: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Upper bound on each provider request, retries included separately.
    pub request_timeout: Duration,
    pub images_dir: PathBuf,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            image_quality: DEFAULT_IMAGE_QUALITY.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            images_dir: PathBuf::from(DEFAULT_IMAGES_DIR),
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_non_empty("OPENAI_API_KEY"),
            base_url: env_non_empty("OPENAI_API_BASE_URL").unwrap_or(defaults.base_url),
            text_model: env_non_empty("TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: env_non_empty("IMAGE_MODEL").unwrap_or(defaults.image_model),
            image_size: env_non_empty("IMAGE_SIZE").unwrap_or(defaults.image_size),
            image_quality: env_non_empty("IMAGE_QUALITY").unwrap_or(defaults.image_quality),
            max_retries: env_non_empty("MAX_RETRIES")
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_retries),
            retry_delay: env_non_empty("OPENAI_RETRY_DELAY_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            request_timeout: env_non_empty("OPENAI_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            images_dir: env_non_empty("IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
