use thiserror::Error;

use crate::types::ErrorCode;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failure reported by a capability provider.
///
/// `Refused` is a deliberate decision of the provider (the user may not
/// sign, the certificate is revoked, ...) and ends the exchange with the
/// carried error code. `Internal` is a fault of the provider itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("refused ({code}): {reason}")]
    Refused { code: ErrorCode, reason: String },

    #[error("provider failure: {0}")]
    Internal(String),
}

impl ProviderError {
    pub fn authorization(reason: impl Into<String>) -> Self {
        ProviderError::Refused {
            code: ErrorCode::Authorization,
            reason: reason.into(),
        }
    }

    pub fn refused(code: ErrorCode, reason: impl Into<String>) -> Self {
        ProviderError::Refused {
            code,
            reason: reason.into(),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
