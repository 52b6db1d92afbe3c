use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::AppConfig;
use crate::errors::SyncError;

/// Supplies a valid bearer credential on demand.
///
/// Refresh and caching policy belongs to the implementation; callers
/// acquire one token per sync cycle and reuse it for every call in
/// that cycle.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, SyncError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    token: String,
    acquired_at: Instant,
}

/// OAuth2 password-grant token provider with in-memory caching.
pub struct OAuthTokenProvider {
    http: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    ttl: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl OAuthTokenProvider {
    pub fn new(cfg: &AppConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout())
            .build()?;
        Ok(Self {
            http,
            auth_url: cfg.auth_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            ttl: cfg.token_ttl(),
            cached: RwLock::new(None),
        })
    }

    #[instrument(skip(self))]
    async fn request_token(&self) -> Result<String, SyncError> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let response = self.http.post(&self.auth_url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SyncError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| SyncError::Auth(format!("malformed token response: {}", e)))?;

        info!("Acquired new CRM access token");
        Ok(parsed.access_token)
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<String, SyncError> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.acquired_at.elapsed() < self.ttl {
                    debug!("Reusing cached CRM access token");
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut guard = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.acquired_at.elapsed() < self.ttl {
                return Ok(cached.token.clone());
            }
        }

        let token = self.request_token().await?;
        *guard = Some(CachedToken {
            token: token.clone(),
            acquired_at: Instant::now(),
        });
        Ok(token)
    }
}
