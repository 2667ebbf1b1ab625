use std::sync::Arc;

use content_module::{ContentWriter, ImageStore, OpenAiClient};
use publish_module::LinkedInClient;
use tracing::{info, warn};

use crate::linkedin_auth::{LinkedInAuth, TokenSource};
use crate::pipeline::PostCreationPipeline;
use crate::scheduler::{Scheduler, POST_CREATION_TASK};

use super::config::ServiceConfig;
use super::BoxError;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub auth: Arc<LinkedInAuth>,
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(scheduler: Scheduler, auth: Arc<LinkedInAuth>, api_token: Option<String>) -> Self {
        Self {
            scheduler,
            auth,
            api_token: api_token.map(Arc::from),
        }
    }

    /// Wires the scheduler, token manager and post pipeline from config.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, BoxError> {
        let auth = Arc::new(LinkedInAuth::new(config.linkedin_auth.clone()));
        if !config.linkedin_auth.is_valid() {
            warn!("LinkedIn OAuth is not configured; only LINKEDIN_ACCESS_TOKEN can be used");
        }

        let writer = match OpenAiClient::new(config.openai.clone()) {
            Ok(client) => Some(ContentWriter::new(client)),
            Err(err) => {
                warn!("content generation disabled: {}", err);
                None
            }
        };
        let pipeline = PostCreationPipeline::new(
            writer,
            ImageStore::new(config.openai.images_dir.clone()),
            LinkedInClient::new(config.linkedin_api.clone())?,
            TokenSource::from_auth(auth.clone()),
        );

        let scheduler = Scheduler::new(config.scheduler.clone());
        scheduler.register_callback(POST_CREATION_TASK, pipeline);
        if config.api_token.is_none() {
            warn!("BASIC_AUTH_TOKEN is not set; API routes will reject every request");
        }
        info!("application state initialized");
        Ok(Self::new(scheduler, auth, config.api_token.clone()))
    }
}
