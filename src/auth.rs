//! OAuth2 access tokens for the Google Analytics Data API.
//!
//! Three sources are supported: a static token from the config, a service
//! account key (signed JWT bearer grant) and an authorized user key
//! (refresh token grant). Fetched tokens are cached until shortly before
//! they expire.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::AuthError;

/// Read-only scope required by the Data API.
const ANALYTICS_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for signed assertions (Google caps this at one hour).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// OAuth2 token response from Google.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: String,
    expires_in: i64,
}

/// Cached token with expiration tracking.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Check if token is expired (with buffer).
    fn is_expired(&self, buffer: Duration) -> bool {
        Utc::now() + buffer >= self.expires_at
    }
}

/// Only the discriminator of a key file, read before the full parse.
#[derive(Deserialize)]
struct KeyKind {
    #[serde(rename = "type")]
    kind: String,
}

/// Service account key file (`"type": "service_account"`).
#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Claims of the JWT bearer assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// Sign an RS256 assertion valid from `now` for one hour.
    fn build_assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let header = Header {
            alg: Algorithm::RS256,
            kid: self.private_key_id.clone(),
            ..Default::default()
        };
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: ANALYTICS_SCOPE,
            aud: self.token_uri(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }
}

/// Authorized user key file (`"type": "authorized_user"`), as written by gcloud.
#[derive(Clone, Deserialize)]
struct AuthorizedUserKey {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl AuthorizedUserKey {
    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Clone)]
enum TokenSource {
    Static(String),
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

impl TokenSource {
    /// Parse a Google credentials file.
    fn from_key_file(path: &Path) -> Result<Self, AuthError> {
        let credentials_error = |reason: String| AuthError::Credentials {
            path: path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| credentials_error(e.to_string()))?;
        let kind: KeyKind =
            serde_json::from_str(&content).map_err(|e| credentials_error(e.to_string()))?;

        match kind.kind.as_str() {
            "service_account" => serde_json::from_str(&content)
                .map(TokenSource::ServiceAccount)
                .map_err(|e| credentials_error(e.to_string())),
            "authorized_user" => serde_json::from_str(&content)
                .map(TokenSource::AuthorizedUser)
                .map_err(|e| credentials_error(e.to_string())),
            other => Err(AuthError::UnsupportedCredentials(other.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TokenSource::Static(_) => "static",
            TokenSource::ServiceAccount(_) => "service_account",
            TokenSource::AuthorizedUser(_) => "authorized_user",
        }
    }
}

/// Access token provider shared by all Data API calls.
#[derive(Clone)]
pub struct TokenProvider {
    source: TokenSource,
    http_client: Client,
    token_buffer: Duration,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenProvider {
    /// Create a token provider from the configuration.
    ///
    /// A static `access_token` takes precedence; otherwise the credentials
    /// file is read and parsed eagerly so a bad key fails at startup.
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let source = match config.access_token.as_deref() {
            Some(token) if !token.is_empty() => TokenSource::Static(token.to_string()),
            _ => {
                let path = config.credentials_path().ok_or_else(|| AuthError::Credentials {
                    path: String::new(),
                    reason: "no credentials file configured".to_string(),
                })?;
                TokenSource::from_key_file(&path)?
            }
        };

        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            source,
            http_client,
            token_buffer: config.token_buffer(),
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if let TokenSource::Static(ref token) = self.source {
            return Ok(token.clone());
        }

        // Check cache first
        {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                if !cached.is_expired(self.token_buffer) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        self.fetch_token().await
    }

    /// Exchange the configured credentials for a fresh token.
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let (token_uri, body) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount(key) => {
                let assertion = key.build_assertion(Utc::now())?;
                (
                    key.token_uri().to_string(),
                    format!(
                        "grant_type={}&assertion={}",
                        urlencoding::encode("urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        urlencoding::encode(&assertion)
                    ),
                )
            }
            TokenSource::AuthorizedUser(key) => (
                key.token_uri().to_string(),
                format!(
                    "grant_type=refresh_token&client_id={}&client_secret={}&refresh_token={}",
                    urlencoding::encode(&key.client_id),
                    urlencoding::encode(&key.client_secret),
                    urlencoding::encode(&key.refresh_token)
                ),
            ),
        };

        tracing::debug!(token_uri = %token_uri, source = self.source.kind(), "Fetching access token");

        let response = self
            .http_client
            .post(&token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Token request failed");
            return Err(AuthError::TokenRequestFailed { status, body });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::TokenParse(format!("Failed to parse token response: {}", e))
        })?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);
        tracing::debug!(
            expires_at = %expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            "Access token acquired"
        );

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                access_token: token_response.access_token.clone(),
                expires_at,
            });
        }

        Ok(token_response.access_token)
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("TokenProvider");
        s.field("source", &self.source.kind());
        if let TokenSource::ServiceAccount(ref key) = self.source {
            s.field("client_email", &key.client_email);
        }
        s.finish()
    }
}
