use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.linkedin.com/v2";

#[derive(Debug, Clone)]
pub struct LinkedInApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LinkedInApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl LinkedInApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("LINKEDIN_API_BASE_URL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.base_url),
            ..defaults
        }
    }
}
