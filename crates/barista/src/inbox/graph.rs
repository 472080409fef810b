//! Shared Microsoft Graph plumbing: HTTP client construction, app-only
//! token acquisition and response checking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::GraphConfig;

use super::error::{InboxError, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 512;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

pub(crate) fn create_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| InboxError::Transport(format!("Failed to create HTTP client: {}", e)))
}

/// One HTTP client and token cache for every Graph consumer in the process.
#[derive(Clone)]
pub struct GraphSession {
    pub(crate) client: Client,
    pub(crate) auth: Arc<GraphAuth>,
    pub(crate) base_url: String,
}

impl GraphSession {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = create_http_client()?;
        let auth = Arc::new(GraphAuth::new(client.clone(), config)?);
        Ok(Self {
            client,
            auth,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

/// Client-credentials token source with an in-memory cache.
pub struct GraphAuth {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl GraphAuth {
    pub fn new(client: Client, config: &GraphConfig) -> Result<Self> {
        Ok(Self {
            client,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret()?,
            cached: Mutex::new(None),
        })
    }

    /// Returns a bearer token, requesting a new one when the cached token
    /// is missing or close to expiry.
    pub async fn access_token(&self) -> Result<SecretString> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.refresh_at {
                return Ok(entry.token.clone());
            }
        }

        debug!("Requesting Graph access token");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| InboxError::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InboxError::Auth(format!(
                "Token request failed ({}): {}",
                status,
                truncate(&body)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| InboxError::Auth(format!("Failed to parse token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let secret = SecretString::from(token.access_token);
        *cached = Some(CachedToken {
            token: secret.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(secret)
    }
}

/// Passes 2xx responses through; anything else becomes [`InboxError::Api`].
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InboxError::Api {
        status: status.as_u16(),
        body: truncate(&body),
    })
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        let mut cut: String = body.chars().take(MAX_ERROR_BODY).collect();
        cut.push_str("...");
        cut
    }
}
