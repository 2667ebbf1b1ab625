//! The `post_creation` task callback: write, illustrate and publish a post.

use async_trait::async_trait;
use content_module::{validate_post_content, ContentWriter, ImageStore};
use publish_module::LinkedInClient;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::linkedin_auth::TokenSource;
use crate::scheduler::{PipelineError, TaskCallback, TaskPayload};

const IMAGE_HINT_CHARS: usize = 100;

/// Payload keys understood by the pipeline. All are optional.
#[derive(Debug, Default, Deserialize)]
struct PostRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default = "default_true")]
    generate_image: bool,
}

fn default_true() -> bool {
    true
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub struct PostCreationPipeline {
    writer: Option<ContentWriter>,
    images: ImageStore,
    publisher: LinkedInClient,
    tokens: TokenSource,
}

impl PostCreationPipeline {
    /// `writer` is optional: without it only payloads that carry their own
    /// content can be published.
    pub fn new(
        writer: Option<ContentWriter>,
        images: ImageStore,
        publisher: LinkedInClient,
        tokens: TokenSource,
    ) -> Self {
        Self {
            writer,
            images,
            publisher,
            tokens,
        }
    }

    async fn resolve_content(&self, request: &PostRequest) -> Result<(String, String), PipelineError> {
        if let Some(content) = non_empty(request.content.clone()) {
            let hint = non_empty(request.topic.clone())
                .unwrap_or_else(|| content.chars().take(IMAGE_HINT_CHARS).collect());
            return Ok((content, hint));
        }

        let writer = self.writer.as_ref().ok_or_else(|| {
            PipelineError::Rejected(
                "payload has no content and no text generator is configured".to_string(),
            )
        })?;
        let topic = match non_empty(request.topic.clone()) {
            Some(topic) => topic,
            None => {
                let idea = writer.generate_idea().await;
                let verdict = writer
                    .score_idea(&idea)
                    .await
                    .map_err(|err| PipelineError::External(err.to_string()))?;
                if !verdict.valid {
                    return Err(PipelineError::Rejected(format!(
                        "generated idea scored {}/10, below the publishing threshold",
                        verdict.score
                    )));
                }
                debug!("generated idea accepted with score {}/10", verdict.score);
                idea
            }
        };
        info!("generating post for topic: {}", topic);

        let content = writer
            .generate_post(&topic, request.style.as_deref())
            .await
            .map_err(|err| PipelineError::External(err.to_string()))?;
        let stats = validate_post_content(&content)
            .map_err(|err| PipelineError::Rejected(format!("generated content rejected: {err}")))?;
        debug!(
            "generated post accepted ({} words, {} chars)",
            stats.word_count, stats.char_count
        );
        Ok((content, topic))
    }

    /// Image failures never fail the post; it goes out text-only instead.
    async fn generate_image(&self, writer: &ContentWriter, hint: &str, style: Option<&str>) -> Option<String> {
        let prompt = writer.create_image_prompt(hint, style).await;
        let bytes = match writer.client().generate_image(&prompt).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("image generation failed, posting text only: {}", err);
                return None;
            }
        };
        match self.images.save(&bytes, hint) {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(err) => {
                warn!("could not store generated image, posting text only: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl TaskCallback for PostCreationPipeline {
    async fn run(&self, payload: &TaskPayload) -> Result<(), PipelineError> {
        let request: PostRequest = serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|err| PipelineError::Rejected(format!("invalid post payload: {err}")))?;

        let (content, hint) = self.resolve_content(&request).await?;

        let image = match non_empty(request.image.clone()) {
            Some(image) => Some(image),
            None if request.generate_image => match &self.writer {
                Some(writer) => {
                    self.generate_image(writer, &hint, request.style.as_deref())
                        .await
                }
                None => {
                    debug!("no image generator configured; posting text only");
                    None
                }
            },
            None => None,
        };

        let token = self.tokens.access_token().await.ok_or_else(|| {
            PipelineError::Rejected(
                "no LinkedIn access token available; re-authorization required".to_string(),
            )
        })?;

        let result = self
            .publisher
            .post_content(&token, &content, image.as_deref())
            .await
            .map_err(|err| {
                if let Some(category) = err.category() {
                    warn!(
                        "LinkedIn publish failed ({}): {}",
                        category.category, category.recommended_action
                    );
                }
                PipelineError::External(err.to_string())
            })?;
        info!(
            "post published to LinkedIn: {}",
            result.post_id.as_deref().unwrap_or("<no id>")
        );
        Ok(())
    }
}
