//! Typed errors for the commitment pipeline.
//!
//! Oracle failures are split into transient ones (worth retrying) and
//! definitive ones. [`PipelineError`] is the taxonomy every run reports
//! against: only [`PipelineError::Configuration`] and
//! [`PipelineError::Storage`] are fatal to a whole run.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by a single oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Caller-side timeout elapsed before the oracle answered.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// Network or connection failure.
    #[error("oracle transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("oracle returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Response arrived but is not the JSON shape the contract requires.
    #[error("malformed oracle response: {0}")]
    Malformed(String),

    /// No oracle provider is configured.
    #[error("oracle provider is disabled")]
    Disabled,
}

impl OracleError {
    /// Timeouts, transport errors, rate limits and server errors may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Timeout(_) | OracleError::Transport(_) => true,
            OracleError::Status { code, .. } => *code == 429 || *code >= 500,
            OracleError::Malformed(_) | OracleError::Disabled => false,
        }
    }
}

/// Error taxonomy for extraction, dedup and tracking runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Oracle kept failing transiently until retries ran out. The unit is skipped.
    #[error("transient failure after {attempts} attempt(s): {source}")]
    TransientIo {
        attempts: u32,
        #[source]
        source: OracleError,
    },

    /// Oracle answered, but the answer is unusable. The unit is rejected.
    #[error("malformed oracle response: {0}")]
    MalformedOracleResponse(String),

    /// Invalid settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document's subject leaves no room for a content window. The document is skipped.
    #[error("document cannot be segmented: {0}")]
    Unsegmentable(String),

    /// A referenced record is missing or inconsistent. The candidate is skipped.
    #[error("storage inconsistency: {0}")]
    StorageInconsistency(String),

    /// The store itself failed. Fatal to the run.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl PipelineError {
    /// Whether this error must abort the whole run rather than one unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::Storage(_)
        )
    }
}

impl From<OracleError> for PipelineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Malformed(msg) => PipelineError::MalformedOracleResponse(msg),
            OracleError::Disabled => {
                PipelineError::Configuration("oracle provider is disabled".to_string())
            }
            other => PipelineError::TransientIo {
                attempts: 1,
                source: other,
            },
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Storage(err)
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(OracleError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(OracleError::Transport("reset".into()).is_transient());
        assert!(OracleError::Status {
            code: 429,
            body: String::new()
        }
        .is_transient());
        assert!(OracleError::Status {
            code: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!OracleError::Status {
            code: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!OracleError::Malformed("x".into()).is_transient());
    }

    #[test]
    fn malformed_maps_to_rejection_not_fatal() {
        let err: PipelineError = OracleError::Malformed("no commitments key".into()).into();
        assert!(matches!(err, PipelineError::MalformedOracleResponse(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unsegmentable_document_is_not_fatal() {
        let err = PipelineError::Unsegmentable("subject too long".into());
        assert!(!err.is_fatal());
    }

    #[test]
    fn disabled_oracle_is_a_configuration_error() {
        let err: PipelineError = OracleError::Disabled.into();
        assert!(err.is_fatal());
    }
}
