//! Error taxonomy for the location importer.

use thiserror::Error;

/// Errors raised by the importer stages.
///
/// Everything except [`SyncError::Configuration`] is recovered at the unit
/// level by the orchestrator and recorded in the run summary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upstream unavailable ({url}): {message}")]
    UpstreamUnavailable { url: String, message: String },

    #[error("unexpected upstream payload ({url}): {message}")]
    UpstreamBadResponse { url: String, message: String },

    #[error("malformed {entity} record: missing `{field}`")]
    MalformedRecord {
        entity: &'static str,
        field: &'static str,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Whether another attempt against the upstream API could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::UpstreamBadResponse { .. }
        )
    }

    /// Short machine-friendly label used in logs and the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::UpstreamBadResponse { .. } => "upstream_bad_response",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_are_retryable() {
        let unavailable = SyncError::UpstreamUnavailable {
            url: "http://x/p/".into(),
            message: "503".into(),
        };
        let bad = SyncError::UpstreamBadResponse {
            url: "http://x/p/".into(),
            message: "eof".into(),
        };
        assert!(unavailable.is_retryable());
        assert!(bad.is_retryable());
        assert!(!SyncError::Persistence("boom".into()).is_retryable());
        assert!(!SyncError::Configuration("no db".into()).is_retryable());
    }

    #[test]
    fn malformed_record_names_the_field() {
        let err = SyncError::MalformedRecord {
            entity: "ward",
            field: "codename",
        };
        assert_eq!(err.to_string(), "malformed ward record: missing `codename`");
        assert_eq!(err.kind(), "malformed_record");
    }
}
