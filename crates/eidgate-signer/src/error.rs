use eidgate_core::{CoreError, ErrorCode, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("unsupported container format: {0}")]
    UnsupportedContainerFormat(String),

    #[error("container has no signable content")]
    NoSignableContent,

    #[error("no pending digest for request {0}")]
    NoPendingDigest(String),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    #[error("malformed signature block: {0}")]
    MalformedSignatureBlock(String),

    #[error("artifact store error: {0}")]
    ArtifactStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<zip::result::ZipError> for SignerError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => SignerError::Io(io),
            other => SignerError::UnsupportedContainerFormat(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SignerError {
    fn from(e: serde_json::Error) -> Self {
        SignerError::Serialization(e.to_string())
    }
}

impl From<CoreError> for SignerError {
    fn from(e: CoreError) -> Self {
        SignerError::Serialization(e.to_string())
    }
}

/// Signing failures seen by the protocol. A missing pending digest means
/// the client answered a sign request this service never issued; every
/// other failure is internal and its detail stays in the logs.
impl From<SignerError> for ProviderError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::NoPendingDigest(_) => {
                ProviderError::refused(ErrorCode::Authorization, e.to_string())
            }
            other => ProviderError::Internal(other.to_string()),
        }
    }
}

pub type SignerResult<T> = Result<T, SignerError>;
