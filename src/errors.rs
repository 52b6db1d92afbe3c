use thiserror::Error;

/// Errors produced by the sync agent.
///
/// Run-level setup failures (`Auth`, `Source`) abort the whole cycle;
/// everything else is caught at the row boundary by the orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Source query failed: {0}")]
    Source(#[from] sea_orm::DbErr),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CRM API error (HTTP {status}): {body}")]
    CrmApi { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// True when the CRM rejected a write because a validation rule
    /// blocked the edit, as opposed to a transport or server fault.
    pub fn is_validation_block(&self) -> bool {
        match self {
            Self::CrmApi { body, .. } => body.contains("FIELD_CUSTOM_VALIDATION_EXCEPTION"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_block_detected_from_body() {
        let err = SyncError::CrmApi {
            status: 400,
            body: r#"[{"errorCode":"FIELD_CUSTOM_VALIDATION_EXCEPTION","message":"no edits"}]"#
                .to_string(),
        };
        assert!(err.is_validation_block());

        let other = SyncError::CrmApi {
            status: 500,
            body: "server blew up".to_string(),
        };
        assert!(!other.is_validation_block());
    }
}
