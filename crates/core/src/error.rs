use thiserror::Error;

/// Failures the top-items pipeline reports to its callers.
///
/// I/O layers wrap these into `anyhow::Error`; the HTTP boundary recovers them with
/// `downcast_ref` to pick a status code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TopItemsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream request failed (status={status:?}): {detail}")]
    UpstreamRequest { status: Option<u16>, detail: String },

    #[error("data consistency violation: {0}")]
    DataConsistency(String),
}

impl TopItemsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn upstream(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::UpstreamRequest {
            status,
            detail: detail.into(),
        }
    }

    pub fn consistency(detail: impl Into<String>) -> Self {
        Self::DataConsistency(detail.into())
    }

    /// Upstream rejected the caller's credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::UpstreamRequest {
                status: Some(401 | 403),
                ..
            }
        )
    }
}
