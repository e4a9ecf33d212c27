//! Error types for cloud access.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl CloudError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Decode(_) => false,
        }
    }
}

/// 5xx, 408 and 429 are worth retrying; any other status is final.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Failure surfaced to the caller of a roster write.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("{op} rejected: {source}")]
    Rejected {
        op: &'static str,
        #[source]
        source: CloudError,
    },

    #[error("{op} failed after {attempts} attempts: {source}")]
    Exhausted {
        op: &'static str,
        attempts: u32,
        #[source]
        source: CloudError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        for status in [500, 502, 503, 408, 429] {
            assert!(is_retryable_status(status), "{status}");
        }
        for status in [400, 401, 403, 404, 409, 422] {
            assert!(!is_retryable_status(status), "{status}");
        }
    }

    #[test]
    fn timeout_is_transient_decode_is_not() {
        assert!(CloudError::Timeout(4000).is_transient());
        assert!(!CloudError::Decode("bad".into()).is_transient());
        assert!(
            !CloudError::Status {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn write_error_display_names_op() {
        let err = WriteError::Exhausted {
            op: "upsert_location",
            attempts: 2,
            source: CloudError::Timeout(300),
        };
        let msg = err.to_string();
        assert!(msg.contains("upsert_location"));
        assert!(msg.contains("2 attempts"));
    }
}
