//! LinkedIn OAuth 2.0 token lifecycle management.
//!
//! Exchanges authorization codes for tokens, persists the credential record
//! to disk so restarts keep the latest token, and refreshes it before expiry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const DEFAULT_OAUTH_BASE_URL: &str = "https://www.linkedin.com/oauth/v2";
pub const DEFAULT_TOKEN_PATH: &str = "assets/linkedin_tokens.json";
pub const DEFAULT_SCOPES: &str = "openid profile w_member_social";
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Tokens are treated as expired this long before the provider says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Configuration for the LinkedIn OAuth flow.
#[derive(Debug, Clone)]
pub struct LinkedInAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_path: PathBuf,
    pub oauth_base_url: String,
    pub scopes: Vec<String>,
    /// Statically configured token used when no OAuth token is available.
    pub legacy_access_token: Option<String>,
    /// Upper bound on each token endpoint request. Refreshes hold the
    /// refresh lock for the whole request.
    pub request_timeout: StdDuration,
}

impl Default for LinkedInAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            scopes: split_scopes(DEFAULT_SCOPES),
            legacy_access_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl LinkedInAuthConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: env_non_empty("LINKEDIN_CLIENT_ID"),
            client_secret: env_non_empty("LINKEDIN_CLIENT_SECRET"),
            redirect_uri: env_non_empty("LINKEDIN_CALLBACK_URL"),
            token_path: env_non_empty("LINKEDIN_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.token_path),
            oauth_base_url: env_non_empty("LINKEDIN_OAUTH_BASE_URL")
                .unwrap_or(defaults.oauth_base_url),
            scopes: env_non_empty("LINKEDIN_SCOPES")
                .map(|value| split_scopes(&value))
                .unwrap_or(defaults.scopes),
            legacy_access_token: env_non_empty("LINKEDIN_ACCESS_TOKEN"),
            request_timeout: env_non_empty("LINKEDIN_OAUTH_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// True when the OAuth client identity is fully configured.
    pub fn is_valid(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.redirect_uri.is_some()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_scopes(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    #[error("token endpoint rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("http error: {0}")]
    Http(String),
    #[error("json error: {0}")]
    Json(String),
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("credential store error at {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },
}

/// Persisted access/refresh token pair. `expires_at` already includes the
/// safety margin.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CredentialRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn from_response(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let lifetime = response.expires_in.unwrap_or(0);
        let expires_at = lifetime
            .checked_sub(EXPIRY_MARGIN_SECS)
            .and_then(Duration::try_seconds)
            .and_then(|valid_for| now.checked_add_signed(valid_for))
            .ok_or_else(|| AuthError::Json(format!("expires_in out of range: {lifetime}")))?;
        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh_token),
            expires_at,
            expires_in: response.expires_in,
            scope: response.scope,
        })
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// JSON file holding the current credential record.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<CredentialRecord>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|err| self.storage_error(err))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| self.storage_error(err))
    }

    /// Writes to a sibling temp file and renames it over the target so a
    /// crash never leaves a truncated record behind.
    pub fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.storage_error(err))?;
            }
        }
        let json = serde_json::to_string_pretty(record).map_err(|err| self.storage_error(err))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|err| self.storage_error(err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| self.storage_error(err))?;
        Ok(())
    }

    fn storage_error(&self, err: impl fmt::Display) -> AuthError {
        AuthError::Storage {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

/// Keeps the LinkedIn access token valid across calls and restarts.
pub struct LinkedInAuth {
    config: LinkedInAuthConfig,
    client: reqwest::Client,
    store: CredentialStore,
    record: RwLock<Option<CredentialRecord>>,
    refresh_lock: Mutex<()>,
}

impl LinkedInAuth {
    pub fn new(config: LinkedInAuthConfig) -> Self {
        let store = CredentialStore::new(config.token_path.clone());
        let record = match store.load() {
            Ok(record) => record,
            Err(err) => {
                warn!("ignoring unreadable credential file: {}", err);
                None
            }
        };
        if record.is_some() {
            info!("loaded LinkedIn credentials from {}", store.path().display());
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            store,
            record: RwLock::new(record),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(LinkedInAuthConfig::from_env())
    }

    pub fn config(&self) -> &LinkedInAuthConfig {
        &self.config
    }

    /// Whether a credential record (possibly expired) is held.
    pub fn has_credentials(&self) -> bool {
        self.current_record().is_some()
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let (client_id, _, redirect_uri) = self.client_identity()?;
        Ok(format!(
            "{}/authorization?response_type=code&client_id={}&redirect_uri={}&state={}&scope={}",
            self.config.oauth_base_url.trim_end_matches('/'),
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(&self.config.scopes.join(" ")),
        ))
    }

    /// Trades a one-time authorization code for a credential record. Codes
    /// are single use, so failures are not retried.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<CredentialRecord, AuthError> {
        let (client_id, client_secret, redirect_uri) = self.client_identity()?;
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .await?;

        let record = CredentialRecord::from_response(response, None, Utc::now())?;
        self.persist(record.clone())?;
        info!("LinkedIn authorization code exchanged; token valid until {}", record.expires_at);
        Ok(record)
    }

    /// Returns a usable access token, refreshing once if the stored one has
    /// expired. `None` means the caller must re-authenticate or fall back.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        match self.current_record() {
            None => {
                debug!("no LinkedIn credentials stored");
                return None;
            }
            Some(record) if !record.is_expired(Utc::now()) => return Some(record.access_token),
            Some(_) => {}
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(record) = self.current_record() {
            if !record.is_expired(Utc::now()) {
                return Some(record.access_token);
            }
        }

        match self.refresh_locked().await {
            Ok(record) => Some(record.access_token),
            Err(err) => {
                warn!("LinkedIn token refresh failed: {}", err);
                None
            }
        }
    }

    /// Forces a refresh regardless of the current expiry.
    pub async fn refresh_access_token(&self) -> Result<CredentialRecord, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<CredentialRecord, AuthError> {
        let (client_id, client_secret, _) = self.client_identity()?;
        let refresh_token = self
            .current_record()
            .and_then(|record| record.refresh_token)
            .ok_or(AuthError::MissingRefreshToken)?;

        debug!("refreshing LinkedIn access token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .await?;

        let record = CredentialRecord::from_response(response, Some(refresh_token), Utc::now())?;
        self.persist(record.clone())?;
        info!("LinkedIn access token refreshed; valid until {}", record.expires_at);
        Ok(record)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let url = format!(
            "{}/accessToken",
            self.config.oauth_base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|err| AuthError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LinkedIn token request failed: {} - {}", status, body);
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|err| AuthError::Json(err.to_string()))
    }

    fn client_identity(&self) -> Result<(&str, &str, &str), AuthError> {
        match (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
            self.config.redirect_uri.as_deref(),
        ) {
            (Some(id), Some(secret), Some(redirect)) => Ok((id, secret, redirect)),
            _ => Err(AuthError::MissingConfig(
                "LINKEDIN_CLIENT_ID, LINKEDIN_CLIENT_SECRET and LINKEDIN_CALLBACK_URL must be set"
                    .to_string(),
            )),
        }
    }

    fn current_record(&self) -> Option<CredentialRecord> {
        self.record
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Saves before updating the cache so memory never runs ahead of disk.
    fn persist(&self, record: CredentialRecord) -> Result<(), AuthError> {
        self.store.save(&record)?;
        *self
            .record
            .write()
            .unwrap_or_else(|poison| poison.into_inner()) = Some(record);
        Ok(())
    }
}

/// Bearer token lookup: OAuth credentials first, then the legacy token.
#[derive(Clone, Default)]
pub struct TokenSource {
    oauth: Option<Arc<LinkedInAuth>>,
    legacy_token: Option<String>,
}

impl TokenSource {
    pub fn new(oauth: Option<Arc<LinkedInAuth>>, legacy_token: Option<String>) -> Self {
        Self {
            oauth,
            legacy_token,
        }
    }

    pub fn from_auth(auth: Arc<LinkedInAuth>) -> Self {
        let legacy_token = auth.config().legacy_access_token.clone();
        Self::new(Some(auth), legacy_token)
    }

    pub async fn access_token(&self) -> Option<String> {
        if let Some(oauth) = &self.oauth {
            if let Some(token) = oauth.get_valid_access_token().await {
                return Some(token);
            }
        }
        if self.legacy_token.is_some() {
            debug!("falling back to legacy LinkedIn access token");
        }
        self.legacy_token.clone()
    }
}
