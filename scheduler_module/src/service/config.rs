use std::env;

use content_module::OpenAiConfig;
use publish_module::LinkedInApiConfig;

use crate::linkedin_auth::LinkedInAuthConfig;
use crate::scheduler::SchedulerConfig;

use super::BoxError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8001;

#[derive(Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token every API route except the health check requires.
    pub api_token: Option<String>,
    pub scheduler: SchedulerConfig,
    pub linkedin_auth: LinkedInAuthConfig,
    pub linkedin_api: LinkedInApiConfig,
    pub openai: OpenAiConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_token: None,
            scheduler: SchedulerConfig::default(),
            linkedin_auth: LinkedInAuthConfig::default(),
            linkedin_api: LinkedInApiConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        let port = match env::var("APP_PORT") {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse::<u16>()
                .map_err(|_| format!("invalid APP_PORT: {}", value))?,
            _ => DEFAULT_PORT,
        };
        Ok(Self {
            host: env::var("APP_HOST")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            api_token: env::var("BASIC_AUTH_TOKEN")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            scheduler: SchedulerConfig::from_env(),
            linkedin_auth: LinkedInAuthConfig::from_env(),
            linkedin_api: LinkedInApiConfig::from_env(),
            openai: OpenAiConfig::from_env(),
        })
    }
}
