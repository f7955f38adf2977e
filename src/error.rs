//! Error taxonomy for the fetch and publish pipeline
//!
//! Per-asset absence is not an error: it is carried as a
//! [`FetchFailure`](crate::entry::FetchFailure) value. Everything here is fatal
//! for the operation that raised it.

use thiserror::Error;

/// Argument outside the accepted domain of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    #[error("'{0}' does not fit in a 31-byte short string")]
    StringTooLong(String),

    #[error("short string must not be empty")]
    EmptyString,

    #[error("pair id must be a symbol string or an unsigned integer, got {0}")]
    PairIdType(String),

    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// Fatal failure of a single fetch call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source answered with a shape or content type it does not document.
    #[error("{source_name}: unexpected protocol: {message}")]
    UnexpectedProtocol {
        source_name: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("{source_name}: transport error: {message}")]
    Transport {
        source_name: String,
        message: String,
    },

    #[error("{source_name}: request for {pair} timed out after {timeout_ms} ms")]
    Timeout {
        source_name: String,
        pair: String,
        timeout_ms: u64,
    },

    /// A price or timestamp could not be turned into its canonical form.
    #[error("{source_name}: cannot normalize {pair}: {message}")]
    Normalization {
        source_name: String,
        pair: String,
        message: String,
    },
}

impl FetchError {
    pub fn unexpected_protocol(source_name: &str, message: impl Into<String>) -> Self {
        Self::UnexpectedProtocol {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(source_name: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn normalization(source_name: &str, pair: &str, message: impl Into<String>) -> Self {
        Self::Normalization {
            source_name: source_name.to_string(),
            pair: pair.to_string(),
            message: message.into(),
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            Self::UnexpectedProtocol { source_name, .. }
            | Self::Transport { source_name, .. }
            | Self::Timeout { source_name, .. }
            | Self::Normalization { source_name, .. } => source_name,
        }
    }
}

/// Failure reported by the oracle contract backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("oracle call '{operation}' failed: {message}")]
pub struct ContractError {
    pub operation: String,
    pub message: String,
}

impl ContractError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Failure of a write path (entries or checkpoints).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Raised before any network call when no signing account is configured.
    #[error("write authorization is not configured; set up a signing account before publishing")]
    Unauthorized,

    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Failure of a read path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_reports_its_source() {
        let error = FetchError::unexpected_protocol("OKX", "content type text/html");
        assert_eq!(error.source_name(), "OKX");
        assert_eq!(
            error.to_string(),
            "OKX: unexpected protocol: content type text/html"
        );
    }

    #[test]
    fn publish_error_wraps_contract_failures() {
        let error: PublishError = ContractError::new("publish_data_entries", "nonce too low").into();
        assert!(matches!(error, PublishError::Contract(_)));
        assert!(error.to_string().contains("nonce too low"));
    }
}
