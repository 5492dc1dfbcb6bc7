use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::crypto::verify_ed25519;
use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Timestamp: canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        chrono::Utc::now().into()
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    pub fn to_rfc3339(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_else(|| "invalid".to_string())
    }

    /// Whole seconds elapsed between `self` and `later` (zero if `later` is earlier).
    pub fn seconds_until(&self, later: &Timestamp) -> u64 {
        later
            .seconds_since_epoch
            .saturating_sub(self.seconds_since_epoch)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp() as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed identifiers
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(
    SessionId,
    "Opaque identifier of one transport session between a client and the service."
);
define_id!(
    RequestId,
    "Request-scoped identifier bridging a pre-sign and its matching post-sign."
);

impl From<&SessionId> for RequestId {
    fn from(session_id: &SessionId) -> Self {
        RequestId(session_id.0.clone())
    }
}

// ---------------------------------------------------------------------------
// ErrorCode: error codes carried by a terminal FinishedMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The relying party refused the operation.
    Authorization,
    /// The certificate chain was rejected for an unspecified reason.
    Certificate,
    CertificateExpired,
    CertificateRevoked,
    CertificateNotTrusted,
    /// Internal failure; no detail is disclosed to the client.
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Authorization => "AUTHORIZATION",
            ErrorCode::Certificate => "CERTIFICATE",
            ErrorCode::CertificateExpired => "CERTIFICATE_EXPIRED",
            ErrorCode::CertificateRevoked => "CERTIFICATE_REVOKED",
            ErrorCode::CertificateNotTrusted => "CERTIFICATE_NOT_TRUSTED",
            ErrorCode::Generic => "GENERIC",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// DigestInfo: output of pre-sign, input of the remote signing step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestInfo {
    pub description: String,
    pub digest_algorithm: String,
    #[serde(with = "base64_bytes")]
    pub digest_value: Vec<u8>,
}

/// Digest of one client-side file, sent in a FileDigestsDataMessage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub description: String,
    pub digest_algorithm: String,
    #[serde(with = "base64_bytes")]
    pub digest_value: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Certificate: signer/authentication certificate
// ---------------------------------------------------------------------------

/// A certificate binding a subject to an Ed25519 public key.
///
/// Chains are ordered leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub not_before: Timestamp,
    pub not_after: Timestamp,
}

impl Certificate {
    pub fn is_valid_at(&self, at: &Timestamp) -> bool {
        *at >= self.not_before && *at <= self.not_after
    }

    /// Verify an Ed25519 signature made with this certificate's key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_ed25519(&self.public_key, message, signature)
    }

    /// Stable binary encoding, used wherever a certificate is embedded.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let certificate: Certificate = serde_json::from_slice(bytes)?;
        if certificate.public_key.len() != 32 {
            return Err(CoreError::InvalidCertificate(format!(
                "expected a 32-byte public key, got {} bytes",
                certificate.public_key.len()
            )));
        }
        Ok(certificate)
    }

    /// SHA-256 over the encoded certificate.
    pub fn fingerprint(&self) -> CoreResult<[u8; 32]> {
        let encoded = self.encode()?;
        Ok(Sha256::digest(&encoded).into())
    }
}

// ---------------------------------------------------------------------------
// Identity request and client environment
// ---------------------------------------------------------------------------

/// What an identity provider wants read from the card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRequest {
    pub include_identity: bool,
    pub include_address: bool,
    pub include_photo: bool,
    pub include_certificates: bool,
    pub remove_card: bool,
}

/// Environment reported by the client before any card operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvironment {
    pub java_version: String,
    pub java_vendor: String,
    pub os_name: String,
    pub os_version: String,
    pub os_arch: String,
    #[serde(default)]
    pub navigator_user_agent: Option<String>,
    #[serde(default)]
    pub readers: Vec<String>,
}

// ---------------------------------------------------------------------------
// serde helpers
// ---------------------------------------------------------------------------

pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

pub mod base64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate(public_key: Vec<u8>) -> Certificate {
        Certificate {
            subject: "CN=Alice".into(),
            issuer: "CN=Citizen CA".into(),
            public_key,
            not_before: Timestamp::from_seconds(1_000),
            not_after: Timestamp::from_seconds(2_000),
        }
    }

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::from_seconds(100);
        let t2 = Timestamp::from_seconds(200);
        assert!(t1 < t2);
        assert_eq!(t1.seconds_until(&t2), 100);
        assert_eq!(t2.seconds_until(&t1), 0);
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let t = Timestamp::from_seconds(0);
        assert_eq!(t.to_rfc3339(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_error_code_display_and_serde() {
        assert_eq!(ErrorCode::CertificateExpired.to_string(), "CERTIFICATE_EXPIRED");
        let json = serde_json::to_string(&ErrorCode::CertificateNotTrusted).unwrap();
        assert_eq!(json, "\"CERTIFICATE_NOT_TRUSTED\"");
    }

    #[test]
    fn test_certificate_validity_window() {
        let cert = certificate(vec![0u8; 32]);
        assert!(cert.is_valid_at(&Timestamp::from_seconds(1_500)));
        assert!(!cert.is_valid_at(&Timestamp::from_seconds(999)));
        assert!(!cert.is_valid_at(&Timestamp::from_seconds(2_001)));
    }

    #[test]
    fn test_certificate_encode_decode() {
        let cert = certificate(vec![7u8; 32]);
        let encoded = cert.encode().unwrap();
        assert_eq!(Certificate::decode(&encoded).unwrap(), cert);
    }

    #[test]
    fn test_certificate_decode_rejects_short_key() {
        let cert = certificate(vec![7u8; 16]);
        let encoded = cert.encode().unwrap();
        assert!(matches!(
            Certificate::decode(&encoded),
            Err(CoreError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_digest_info_base64_field() {
        let info = DigestInfo {
            description: "ODF Signature".into(),
            digest_algorithm: "SHA-256".into(),
            digest_value: vec![0xde, 0xad],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["digest_value"], "3q0=");
    }

    #[test]
    fn test_request_id_from_session() {
        let session = SessionId::new("abc");
        assert_eq!(RequestId::from(&session).as_str(), "abc");
    }
}
