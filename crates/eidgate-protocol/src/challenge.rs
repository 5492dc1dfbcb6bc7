//! Authentication challenges and the authentication contract.
//!
//! A challenge is generated once per authentication request, stored on the
//! session and consumed by the first AuthenticationDataMessage. The client
//! never signs the bare challenge; it signs the authentication contract
//! that binds the challenge to the service and the transport session.

use eidgate_core::{random_bytes, Timestamp};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{HandlerError, HandlerResult};

/// Size of a freshly generated challenge in bytes.
pub const CHALLENGE_SIZE: usize = 20;

/// Fixed preamble of every authentication contract.
pub const LEGAL_NOTICE: &str = "Declaration of authentication intension.\n\
    The following data should be interpreted as an authentication challenge.\n";

// ---------------------------------------------------------------------------
// AuthenticationChallenge
// ---------------------------------------------------------------------------

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthenticationChallenge {
    value: Vec<u8>,
    #[zeroize(skip)]
    issued_at: Timestamp,
}

impl std::fmt::Debug for AuthenticationChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationChallenge")
            .field("value", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl AuthenticationChallenge {
    /// Draw a new challenge from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            value: random_bytes(CHALLENGE_SIZE).to_vec(),
            issued_at: Timestamp::now(),
        }
    }

    pub fn with_issue_time(value: Vec<u8>, issued_at: Timestamp) -> Self {
        Self { value, issued_at }
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    /// Check the challenge's age at `now`. Consumes the challenge so it can
    /// never be checked twice.
    pub fn into_fresh_value(self, now: &Timestamp, max_maturity_secs: u64) -> HandlerResult<Vec<u8>> {
        let age = self.issued_at.seconds_until(now);
        if age > max_maturity_secs {
            return Err(HandlerError::authorization(format!(
                "challenge expired ({}s old, maximum {}s)",
                age, max_maturity_secs
            )));
        }
        Ok(self.value.clone())
    }

    /// Constant-time comparison against bytes received from the client.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        self.value.ct_eq(candidate).into()
    }
}

// ---------------------------------------------------------------------------
// AuthenticationContract
// ---------------------------------------------------------------------------

/// The byte string an authentication signature covers.
///
/// `salt ‖ hostname? ‖ inet_address? ‖ legal notice ‖ challenge ‖
/// session_id? ‖ server_certificate?`
#[derive(Debug, Default)]
pub struct AuthenticationContract<'a> {
    pub salt: &'a [u8],
    pub hostname: Option<&'a str>,
    pub inet_address: Option<&'a str>,
    pub challenge: &'a [u8],
    pub session_id: Option<&'a [u8]>,
    pub server_certificate: Option<&'a [u8]>,
}

impl AuthenticationContract<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.salt.len() + LEGAL_NOTICE.len() + self.challenge.len() + 64,
        );
        out.extend_from_slice(self.salt);
        if let Some(hostname) = self.hostname {
            out.extend_from_slice(hostname.as_bytes());
        }
        if let Some(inet_address) = self.inet_address {
            out.extend_from_slice(inet_address.as_bytes());
        }
        out.extend_from_slice(LEGAL_NOTICE.as_bytes());
        out.extend_from_slice(self.challenge);
        if let Some(session_id) = self.session_id {
            out.extend_from_slice(session_id);
        }
        if let Some(server_certificate) = self.server_certificate {
            out.extend_from_slice(server_certificate);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_size_and_uniqueness() {
        let a = AuthenticationChallenge::generate();
        let b = AuthenticationChallenge::generate();
        assert_eq!(a.value().len(), CHALLENGE_SIZE);
        assert!(!a.matches(b.value()));
        assert!(a.matches(&a.value().to_vec()));
    }

    #[test]
    fn test_matches_rejects_different_length() {
        let c = AuthenticationChallenge::with_issue_time(vec![1; 20], Timestamp::from_seconds(0));
        assert!(!c.matches(&[1; 19]));
    }

    #[test]
    fn test_fresh_challenge_accepted() {
        let c = AuthenticationChallenge::with_issue_time(vec![7; 20], Timestamp::from_seconds(1_000));
        let value = c
            .into_fresh_value(&Timestamp::from_seconds(1_300), 300)
            .unwrap();
        assert_eq!(value, vec![7; 20]);
    }

    #[test]
    fn test_mature_challenge_rejected() {
        let c = AuthenticationChallenge::with_issue_time(vec![7; 20], Timestamp::from_seconds(1_000));
        let err = c
            .into_fresh_value(&Timestamp::from_seconds(1_301), 300)
            .unwrap_err();
        assert_eq!(err.error_code(), eidgate_core::ErrorCode::Authorization);
    }

    #[test]
    fn test_debug_redacts_value() {
        let c = AuthenticationChallenge::generate();
        assert!(format!("{:?}", c).contains("REDACTED"));
    }

    #[test]
    fn test_contract_layout() {
        let contract = AuthenticationContract {
            salt: b"SALT",
            hostname: Some("host"),
            inet_address: None,
            challenge: b"CHAL",
            session_id: Some(b"SID"),
            server_certificate: None,
        };
        let mut expected = b"SALThost".to_vec();
        expected.extend_from_slice(LEGAL_NOTICE.as_bytes());
        expected.extend_from_slice(b"CHALSID");
        assert_eq!(contract.to_bytes(), expected);
    }
}
