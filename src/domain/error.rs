//! Lending Errors - Shared Failure Taxonomy
//!
//! Every workflow, hook and port in the crate reports failures through
//! `LendError`. Client-facing variants (validation, authorization,
//! missing references, conflicts) are never retried; external and
//! persistence failures are logged by the caller and mapped to server
//! errors at the HTTP edge.

use std::fmt::Display;

use thiserror::Error;

/// Result alias used across ports and use cases.
pub type LendResult<T> = Result<T, LendError>;

/// Failure taxonomy for the lending core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LendError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Recovered signer differs from the claimed party.
    #[error("signature mismatch: expected {expected}, recovered {recovered}")]
    SignatureMismatch {
        /// Address the caller claimed signed the message.
        expected: String,
        /// Address recovered from the signature.
        recovered: String,
    },

    /// No signature scheme or chain client for the network.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Referenced currency, loan, offer or asset does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate active loan, duplicate offer nonce or illegal transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Marketplace, metadata host or chain RPC failure.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Storage or transaction failure.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl LendError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Wrap any displayable upstream failure as an external service error.
    pub fn external(err: impl Display) -> Self {
        Self::ExternalService(err.to_string())
    }

    /// Wrap any displayable storage failure as a persistence error.
    pub fn persistence(err: impl Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Errors caused by the caller's input or authorization.
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::ExternalService(_) | Self::Persistence(_))
    }

    /// Only upstream failures are worth retrying on a later cycle.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_))
    }

    /// HTTP status used by the server edge.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnsupportedNetwork(_) => 400,
            Self::SignatureMismatch { .. } => 401,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::ExternalService(_) => 502,
            Self::Persistence(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::UnsupportedNetwork(_) => "unsupported_network",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ExternalService(_) => "external_service_error",
            Self::Persistence(_) => "persistence_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_not_retryable() {
        let errors = [
            LendError::validation("x"),
            LendError::SignatureMismatch {
                expected: "0xa".into(),
                recovered: "0xb".into(),
            },
            LendError::UnsupportedNetwork("DOGE".into()),
            LendError::not_found("loan 1"),
            LendError::conflict("dup"),
        ];
        for err in errors {
            assert!(err.is_client_error(), "{err} should be a client error");
            assert!(!err.is_retryable());
            assert!(err.status_code() < 500);
        }
    }

    #[test]
    fn test_server_errors() {
        let ext = LendError::external("timeout");
        assert!(!ext.is_client_error());
        assert!(ext.is_retryable());
        assert_eq!(ext.status_code(), 502);

        let db = LendError::persistence("lock poisoned");
        assert!(!db.is_retryable());
        assert_eq!(db.error_code(), "persistence_error");
    }
}
