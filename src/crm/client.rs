use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::AppConfig;
use crate::crm::types::UpsertOutcome;
use crate::errors::SyncError;

/// Connection settings for the CRM REST surface.
#[derive(Debug, Clone)]
pub struct CrmSettings {
    /// Base URL of the upsert target object (`…/sobjects/OrderItem`)
    pub sobject_base_url: String,
    /// External id field carried in the upsert URL
    pub external_id_field: String,
    /// REST base (`…/services/data/vXX.X`)
    pub rest_base_url: String,
    pub timeout: Duration,
    /// Additional attempts for reads; writes never retry
    pub query_retry_attempts: u32,
}

impl CrmSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, SyncError> {
        let rest_base_url = cfg
            .rest_base()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(Self {
            sobject_base_url: cfg.sobject_base_url.trim_end_matches('/').to_string(),
            external_id_field: cfg.external_id_field.clone(),
            rest_base_url,
            timeout: cfg.http_timeout(),
            query_retry_attempts: cfg.query_retry_attempts,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    records: Vec<Value>,
}

/// HTTP client for the CRM-side object store: `query`,
/// `upsert-by-external-id` and `patch-by-id`.
///
/// Owns its transport client; constructed once at startup and shared
/// read-only across the run loop.
pub struct CrmClient {
    http: reqwest::Client,
    sobject_base: Url,
    rest_base: Url,
    external_id_field: String,
    query_retry_attempts: u32,
}

impl CrmClient {
    pub fn new(settings: CrmSettings) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        let sobject_base = Url::parse(&settings.sobject_base_url)
            .map_err(|e| SyncError::Config(format!("invalid sobject base URL: {}", e)))?;
        let rest_base = Url::parse(&settings.rest_base_url)
            .map_err(|e| SyncError::Config(format!("invalid REST base URL: {}", e)))?;
        Ok(Self {
            http,
            sobject_base,
            rest_base,
            external_id_field: settings.external_id_field,
            query_retry_attempts: settings.query_retry_attempts,
        })
    }

    pub fn external_id_field(&self) -> &str {
        &self.external_id_field
    }

    /// Escapes a value for inclusion in a single-quoted query literal.
    pub fn soql_escape(value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = base.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| SyncError::Config("CRM base URL cannot be a base".into()))?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    /// Runs a query and returns the first record, or `None` when the
    /// result set is empty. Retries transport faults and 5xx responses
    /// up to the configured attempt limit; this call is idempotent.
    #[instrument(skip(self, token, soql))]
    pub async fn query_single(&self, token: &str, soql: &str) -> Result<Option<Value>, SyncError> {
        let mut url = Self::join_segments(&self.rest_base, &["query"])?;
        url.query_pairs_mut().append_pair("q", soql);

        let mut attempt: u32 = 0;
        let body = loop {
            let attempts_left = attempt < self.query_retry_attempts;
            let result = self
                .http
                .get(url.clone())
                .bearer_auth(token)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await?;
                    if status.is_success() {
                        break body;
                    }
                    if !status.is_server_error() || !attempts_left {
                        return Err(SyncError::CrmApi {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    warn!(
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "Query returned server error; retrying"
                    );
                }
                Err(err) => {
                    if !attempts_left {
                        return Err(SyncError::Http(err));
                    }
                    warn!(error = %err, attempt = attempt + 1, "Query transport error; retrying");
                }
            }

            tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt))).await;
            attempt += 1;
        };

        let parsed: QueryResponse = serde_json::from_str(&body)?;
        Ok(parsed.records.into_iter().next())
    }

    /// Conditional create-or-update keyed by the external id carried in
    /// the URL; the id is never part of the body. Exactly one HTTP call
    /// per invocation, never retried: the write is side-effecting.
    #[instrument(skip(self, token, body), fields(external_id = %external_id))]
    pub async fn upsert_by_external_id(
        &self,
        token: &str,
        external_id: &str,
        body: &Value,
    ) -> Result<UpsertOutcome, SyncError> {
        let url = Self::join_segments(&self.sobject_base, &[&self.external_id_field, external_id])?;

        let response = self
            .http
            .patch(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let raw_body = response.text().await?;

        if status.is_success() {
            debug!(status = status.as_u16(), "Upsert accepted");
            Ok(UpsertOutcome::classify(status.as_u16(), raw_body))
        } else {
            Err(SyncError::CrmApi {
                status: status.as_u16(),
                body: raw_body,
            })
        }
    }

    /// Partial update of one object by id. Success is any 2xx. Not
    /// retried; callers decide whether a failure skips the row or is
    /// swallowed as best-effort.
    #[instrument(skip(self, token, body), fields(object = %object_type, id = %id))]
    pub async fn patch_object(
        &self,
        token: &str,
        object_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<(), SyncError> {
        let url = Self::join_segments(&self.rest_base, &["sobjects", object_type, id])?;

        let response = self
            .http
            .patch(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await?;
            Err(SyncError::CrmApi {
                status: status.as_u16(),
                body,
            })
        }
    }
}
