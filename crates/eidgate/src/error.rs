use thiserror::Error;

/// Error type of the gateway binary, aggregating the errors of every
/// workspace crate.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("protocol error: {0}")]
    Protocol(#[from] eidgate_protocol::ProtocolError),

    #[error("signer error: {0}")]
    Signer(#[from] eidgate_signer::SignerError),

    #[error("core error: {0}")]
    Core(#[from] eidgate_core::CoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(e: toml::de::Error) -> Self {
        GatewayError::Config(format!("TOML parse error: {}", e))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
