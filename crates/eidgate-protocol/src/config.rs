//! Static per-deployment protocol settings.
//!
//! These are the defaults handlers fall back on when no identity provider
//! is configured, plus the channel-binding and secure-reader settings that
//! only the deployment decides.

use eidgate_core::base64_opt;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Challenges older than this are rejected.
pub const DEFAULT_CHALLENGE_MAX_MATURITY_SECS: u64 = 300;

/// Longest transaction message a secure pinpad reader can display.
pub const DEFAULT_TRANSACTION_MESSAGE_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub include_identity: bool,
    pub include_address: bool,
    pub include_photo: bool,
    pub include_certificates: bool,
    pub remove_card: bool,
    pub logoff: bool,
    pub pre_logoff: bool,
    pub change_pin: bool,
    pub unblock_pin: bool,
    pub require_secure_reader: bool,

    /// Service hostname the client mixes into the authentication contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Service address the client mixes into the authentication contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inet_address: Option<String>,

    pub session_id_channel_binding: bool,
    pub server_certificate_channel_binding: bool,
    /// Encoded server certificate expected back under channel binding.
    #[serde(skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub server_certificate: Option<Vec<u8>>,

    pub challenge_max_maturity_secs: u64,
    pub transaction_message_max_len: usize,
    /// When the environment check fails, let the user continue anyway.
    pub insecure_client_warn_only: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            include_identity: false,
            include_address: false,
            include_photo: false,
            include_certificates: false,
            remove_card: false,
            logoff: false,
            pre_logoff: false,
            change_pin: false,
            unblock_pin: false,
            require_secure_reader: false,
            hostname: None,
            inet_address: None,
            session_id_channel_binding: false,
            server_certificate_channel_binding: false,
            server_certificate: None,
            challenge_max_maturity_secs: DEFAULT_CHALLENGE_MAX_MATURITY_SECS,
            transaction_message_max_len: DEFAULT_TRANSACTION_MESSAGE_MAX_LEN,
            insecure_client_warn_only: false,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.challenge_max_maturity_secs == 0 {
            return Err(ProtocolError::Internal(
                "challenge_max_maturity_secs must be > 0".into(),
            ));
        }
        if self.transaction_message_max_len == 0 {
            return Err(ProtocolError::Internal(
                "transaction_message_max_len must be > 0".into(),
            ));
        }
        if self.server_certificate_channel_binding && self.server_certificate.is_none() {
            return Err(ProtocolError::Internal(
                "server_certificate_channel_binding requires server_certificate".into(),
            ));
        }
        Ok(())
    }

    /// Cut a display text to the configured maximum, counted in characters.
    pub fn truncate_transaction_message(&self, message: &str) -> String {
        message
            .chars()
            .take(self.transaction_message_max_len)
            .collect()
    }
}
