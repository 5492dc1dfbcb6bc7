//! Protocol error types.
//!
//! Protocol violations are always fatal to the current exchange and are
//! returned to the caller as rejections. Display impls never contain
//! challenge, digest or signature bytes.

use eidgate_core::{ErrorCode, ProviderError};
use thiserror::Error;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    // -- Catalog --
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("a session-start message is already registered: {existing}, rejecting {rejected}")]
    DuplicateStartMessage { existing: String, rejected: String },

    #[error("message type registered twice: {0}")]
    DuplicateDescriptor(String),

    #[error("{message} allows unregistered response type {response}")]
    UnregisteredResponse { message: String, response: String },

    // -- Dispatch --
    #[error("{message} not allowed in protocol state {actual} (requires {expected})")]
    IllegalProtocolState {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("session already started (state {0})")]
    SessionAlreadyStarted(String),

    #[error("session busy: concurrent request on the same session")]
    SessionBusy,

    // -- Transport contract --
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    // -- Infrastructure --
    #[error("session store error: {0}")]
    SessionStore(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// True for rejections that indicate a client trying to step outside
    /// the protocol, as opposed to merely malformed input.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            ProtocolError::IllegalProtocolState { .. } | ProtocolError::SessionAlreadyStarted(_)
        )
    }

    /// Numeric class of the rejection, for transports and metrics.
    pub fn rejection_code(&self) -> u16 {
        match self {
            ProtocolError::IllegalProtocolState { .. }
            | ProtocolError::SessionAlreadyStarted(_) => 403,
            ProtocolError::UnknownMessageType(_) | ProtocolError::MalformedMessage(_) => 400,
            ProtocolError::SessionBusy => 409,
            ProtocolError::DuplicateStartMessage { .. }
            | ProtocolError::DuplicateDescriptor(_)
            | ProtocolError::UnregisteredResponse { .. }
            | ProtocolError::SessionStore(_)
            | ProtocolError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::MalformedMessage(e.to_string())
    }
}

/// Outcome of a failed handler.
///
/// `Refused` ends the exchange with a FinishedMessage carrying the code and
/// moves the session to the failed state. `Internal` ends the exchange with
/// a generic error code and leaves the protocol state untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("refused ({code}): {reason}")]
    Refused { code: ErrorCode, reason: String },

    #[error("internal handler failure: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn authorization(reason: impl Into<String>) -> Self {
        HandlerError::Refused {
            code: ErrorCode::Authorization,
            reason: reason.into(),
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            HandlerError::Refused { code, .. } => *code,
            HandlerError::Internal(_) => ErrorCode::Generic,
        }
    }
}

impl From<ProviderError> for HandlerError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Refused { code, reason } => HandlerError::Refused { code, reason },
            ProviderError::Internal(msg) => HandlerError::Internal(msg),
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;
