use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{error, info};

use crate::config::LinkedInApiConfig;
use crate::errors::PublishError;

const UPLOAD_MECHANISM: &str = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest";

/// The member a token belongs to, from the OpenID userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostResult {
    pub post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadResponse {
    value: RegisterUploadValue,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadValue {
    asset: String,
    #[serde(rename = "uploadMechanism")]
    upload_mechanism: Value,
}

struct RegisteredUpload {
    asset: String,
    upload_url: String,
}

/// Client for the LinkedIn member posting API.
#[derive(Debug, Clone)]
pub struct LinkedInClient {
    base_url: String,
    client: reqwest::Client,
}

impl LinkedInClient {
    pub fn new(config: LinkedInApiConfig) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| PublishError::Http(err.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_env() -> Result<Self, PublishError> {
        Self::new(LinkedInApiConfig::from_env())
    }

    pub async fn validate_credentials(&self, token: &str) -> Result<Identity, PublishError> {
        let identity = self.user_info(token).await?;
        info!("LinkedIn credentials validated");
        Ok(identity)
    }

    /// Publishes `text`, with the image at `image` (local path or http(s)
    /// URL) attached when given.
    pub async fn post_content(
        &self,
        token: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<PostResult, PublishError> {
        let identity = self.user_info(token).await?;
        let author = format!("urn:li:person:{}", identity.sub);

        let content = match image {
            Some(image) => {
                let upload = self.register_upload(token, &author).await?;
                let (bytes, content_type) = self.load_image(image).await?;
                self.upload_image(token, &upload.upload_url, bytes, &content_type)
                    .await?;
                json!({
                    "shareCommentary": {"text": text},
                    "shareMediaCategory": "IMAGE",
                    "media": [{
                        "status": "READY",
                        "description": {"text": "Generated image for LinkedIn post"},
                        "media": upload.asset,
                        "title": {"text": "LinkedIn Post Image"},
                    }],
                })
            }
            None => json!({
                "shareCommentary": {"text": text},
                "shareMediaCategory": "NONE",
            }),
        };

        let payload = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": {"com.linkedin.ugc.ShareContent": content},
            "visibility": {"com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"},
        });
        self.create_post(token, &payload).await
    }

    async fn user_info(&self, token: &str) -> Result<Identity, PublishError> {
        let response = self
            .client
            .get(format!("{}/userinfo", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| PublishError::Http(err.to_string()))?;
        let response = check_status("userinfo", response).await?;
        response
            .json::<Identity>()
            .await
            .map_err(|err| PublishError::Decode {
                step: "userinfo",
                message: err.to_string(),
            })
    }

    async fn register_upload(
        &self,
        token: &str,
        owner: &str,
    ) -> Result<RegisteredUpload, PublishError> {
        let payload = json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": owner,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent",
                }],
            }
        });
        let response = self
            .client
            .post(format!("{}/assets?action=registerUpload", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| PublishError::Http(err.to_string()))?;
        let response = check_status("registerUpload", response).await?;
        let registered: RegisterUploadResponse =
            response.json().await.map_err(|err| PublishError::Decode {
                step: "registerUpload",
                message: err.to_string(),
            })?;

        let upload_url = registered
            .value
            .upload_mechanism
            .get(UPLOAD_MECHANISM)
            .and_then(|mechanism| mechanism.get("uploadUrl"))
            .and_then(Value::as_str)
            .ok_or_else(|| PublishError::Decode {
                step: "registerUpload",
                message: "missing uploadUrl".to_string(),
            })?
            .to_string();
        info!("image upload registered: {}", registered.value.asset);
        Ok(RegisteredUpload {
            asset: registered.value.asset,
            upload_url,
        })
    }

    async fn upload_image(
        &self,
        token: &str,
        upload_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PublishError> {
        let response = self
            .client
            .put(upload_url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|err| PublishError::Http(err.to_string()))?;
        check_status("image upload", response).await?;
        info!("image uploaded");
        Ok(())
    }

    async fn create_post(&self, token: &str, payload: &Value) -> Result<PostResult, PublishError> {
        let response = self
            .client
            .post(format!("{}/ugcPosts", self.base_url))
            .bearer_auth(token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(payload)
            .send()
            .await
            .map_err(|err| PublishError::Http(err.to_string()))?;
        let response = check_status("ugcPosts", response).await?;

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let post_id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(header_id);
        info!("LinkedIn post created: {}", post_id.as_deref().unwrap_or("<no id>"));
        Ok(PostResult { post_id })
    }

    async fn load_image(&self, image: &str) -> Result<(Vec<u8>, String), PublishError> {
        let read_error = |message: String| PublishError::ImageRead {
            source_ref: image.to_string(),
            message,
        };
        let content_type = mime_guess::from_path(image)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "image/png".to_string());

        if image.starts_with("http://") || image.starts_with("https://") {
            let response = self
                .client
                .get(image)
                .send()
                .await
                .map_err(|err| read_error(err.to_string()))?;
            if !response.status().is_success() {
                return Err(read_error(format!("download returned {}", response.status())));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|err| read_error(err.to_string()))?;
            return Ok((bytes.to_vec(), content_type));
        }

        let bytes = tokio::fs::read(Path::new(image))
            .await
            .map_err(|err| read_error(err.to_string()))?;
        Ok((bytes, content_type))
    }
}

async fn check_status(
    step: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("LinkedIn {} failed: {} - {}", step, status, body);
    Err(PublishError::Status {
        step,
        status: status.as_u16(),
        body,
    })
}
