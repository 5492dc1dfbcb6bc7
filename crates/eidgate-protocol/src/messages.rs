//! Typed protocol messages.
//!
//! Inbound messages travel from the card-reading client to the service,
//! outbound messages travel back and each one is a directive for the
//! client's next step. Both directions are closed sum types matched
//! exhaustively by the dispatcher and handlers.

use eidgate_core::{base64_bytes, base64_opt, Certificate, ClientEnvironment, ErrorCode, FileDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ProtocolState
// ---------------------------------------------------------------------------

/// Phase of a single client/service exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolState {
    #[default]
    Init,
    EnvCheck,
    Identify,
    Authenticate,
    Sign,
    Digest,
    SignCerts,
    Finished,
    Failed,
}

impl ProtocolState {
    pub const ALL: [ProtocolState; 9] = [
        ProtocolState::Init,
        ProtocolState::EnvCheck,
        ProtocolState::Identify,
        ProtocolState::Authenticate,
        ProtocolState::Sign,
        ProtocolState::Digest,
        ProtocolState::SignCerts,
        ProtocolState::Finished,
        ProtocolState::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolState::Finished | ProtocolState::Failed)
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolState::Init => "INIT",
            ProtocolState::EnvCheck => "ENV_CHECK",
            ProtocolState::Identify => "IDENTIFY",
            ProtocolState::Authenticate => "AUTHENTICATE",
            ProtocolState::Sign => "SIGN",
            ProtocolState::Digest => "DIGEST",
            ProtocolState::SignCerts => "SIGN_CERTS",
            ProtocolState::Finished => "FINISHED",
            ProtocolState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// MessageType: stable discriminator of every message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    // inbound
    Hello,
    ClientEnvironment,
    ContinueInsecure,
    IdentityData,
    AuthenticationData,
    SignatureData,
    FileDigestsData,
    SignCertificatesData,
    // outbound
    CheckClient,
    InsecureClient,
    Administration,
    FilesDigestRequest,
    SignCertificatesRequest,
    SignRequest,
    AuthenticationRequest,
    IdentificationRequest,
    Finished,
}

impl MessageType {
    pub const ALL: [MessageType; 17] = [
        MessageType::Hello,
        MessageType::ClientEnvironment,
        MessageType::ContinueInsecure,
        MessageType::IdentityData,
        MessageType::AuthenticationData,
        MessageType::SignatureData,
        MessageType::FileDigestsData,
        MessageType::SignCertificatesData,
        MessageType::CheckClient,
        MessageType::InsecureClient,
        MessageType::Administration,
        MessageType::FilesDigestRequest,
        MessageType::SignCertificatesRequest,
        MessageType::SignRequest,
        MessageType::AuthenticationRequest,
        MessageType::IdentificationRequest,
        MessageType::Finished,
    ];

    /// Wire discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Hello => "HelloMessage",
            MessageType::ClientEnvironment => "ClientEnvironmentMessage",
            MessageType::ContinueInsecure => "ContinueInsecureMessage",
            MessageType::IdentityData => "IdentityDataMessage",
            MessageType::AuthenticationData => "AuthenticationDataMessage",
            MessageType::SignatureData => "SignatureDataMessage",
            MessageType::FileDigestsData => "FileDigestsDataMessage",
            MessageType::SignCertificatesData => "SignCertificatesDataMessage",
            MessageType::CheckClient => "CheckClientMessage",
            MessageType::InsecureClient => "InsecureClientMessage",
            MessageType::Administration => "AdministrationMessage",
            MessageType::FilesDigestRequest => "FilesDigestRequestMessage",
            MessageType::SignCertificatesRequest => "SignCertificatesRequestMessage",
            MessageType::SignRequest => "SignRequestMessage",
            MessageType::AuthenticationRequest => "AuthenticationRequestMessage",
            MessageType::IdentificationRequest => "IdentificationRequestMessage",
            MessageType::Finished => "FinishedMessage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            MessageType::Hello
                | MessageType::ClientEnvironment
                | MessageType::ContinueInsecure
                | MessageType::IdentityData
                | MessageType::AuthenticationData
                | MessageType::SignatureData
                | MessageType::FileDigestsData
                | MessageType::SignCertificatesData
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvironmentMessage {
    pub environment: ClientEnvironment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDataMessage {
    #[serde(with = "base64_bytes")]
    pub identity_file: Vec<u8>,
    #[serde(default, with = "base64_opt")]
    pub address_file: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt")]
    pub photo: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt")]
    pub identity_signature: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt")]
    pub address_signature: Option<Vec<u8>>,
    /// National registry chain, leaf first.
    #[serde(default)]
    pub rrn_certificate_chain: Vec<Certificate>,
    #[serde(default)]
    pub authn_certificate: Option<Certificate>,
    #[serde(default)]
    pub sign_certificate: Option<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationDataMessage {
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    /// Transport session identifier, present with session channel binding.
    #[serde(default, with = "base64_opt")]
    pub session_id: Option<Vec<u8>>,
    #[serde(with = "base64_bytes")]
    pub signature_value: Vec<u8>,
    /// Authentication chain, leaf first.
    pub certificate_chain: Vec<Certificate>,
    #[serde(default, with = "base64_opt")]
    pub server_certificate: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt")]
    pub transaction_message_signature: Option<Vec<u8>>,
    #[serde(default)]
    pub identity: Option<IdentityDataMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDataMessage {
    #[serde(with = "base64_bytes")]
    pub signature_value: Vec<u8>,
    pub certificate_chain: Vec<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigestsDataMessage {
    pub file_digests: Vec<FileDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCertificatesDataMessage {
    pub certificate_chain: Vec<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "HelloMessage")]
    Hello(HelloMessage),
    #[serde(rename = "ClientEnvironmentMessage")]
    ClientEnvironment(ClientEnvironmentMessage),
    #[serde(rename = "ContinueInsecureMessage")]
    ContinueInsecure,
    #[serde(rename = "IdentityDataMessage")]
    IdentityData(IdentityDataMessage),
    #[serde(rename = "AuthenticationDataMessage")]
    AuthenticationData(AuthenticationDataMessage),
    #[serde(rename = "SignatureDataMessage")]
    SignatureData(SignatureDataMessage),
    #[serde(rename = "FileDigestsDataMessage")]
    FileDigestsData(FileDigestsDataMessage),
    #[serde(rename = "SignCertificatesDataMessage")]
    SignCertificatesData(SignCertificatesDataMessage),
}

impl InboundMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            InboundMessage::Hello(_) => MessageType::Hello,
            InboundMessage::ClientEnvironment(_) => MessageType::ClientEnvironment,
            InboundMessage::ContinueInsecure => MessageType::ContinueInsecure,
            InboundMessage::IdentityData(_) => MessageType::IdentityData,
            InboundMessage::AuthenticationData(_) => MessageType::AuthenticationData,
            InboundMessage::SignatureData(_) => MessageType::SignatureData,
            InboundMessage::FileDigestsData(_) => MessageType::FileDigestsData,
            InboundMessage::SignCertificatesData(_) => MessageType::SignCertificatesData,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsecureClientMessage {
    /// When true the client may warn the user and continue insecurely.
    pub warn_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrationMessage {
    pub change_pin: bool,
    pub unblock_pin: bool,
    pub logoff: bool,
    pub remove_card: bool,
    pub require_secure_reader: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesDigestRequestMessage {
    pub digest_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequestMessage {
    #[serde(with = "base64_bytes")]
    pub digest_value: Vec<u8>,
    pub digest_algorithm: String,
    pub description: String,
    pub logoff: bool,
    pub remove_card: bool,
    pub require_secure_reader: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRequestMessage {
    #[serde(with = "base64_bytes")]
    pub challenge: Vec<u8>,
    pub include_hostname: bool,
    pub include_inet_address: bool,
    pub logoff: bool,
    pub pre_logoff: bool,
    pub remove_card: bool,
    pub session_id_channel_binding: bool,
    pub server_certificate_channel_binding: bool,
    pub include_identity: bool,
    pub include_certificates: bool,
    pub include_address: bool,
    pub include_photo: bool,
    pub include_integrity_data: bool,
    pub require_secure_reader: bool,
    #[serde(default)]
    pub transaction_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationRequestMessage {
    pub include_address: bool,
    pub include_photo: bool,
    pub include_integrity_data: bool,
    pub include_certificates: bool,
    pub remove_card: bool,
    #[serde(default)]
    pub identity_data_usage: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedMessage {
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
}

impl FinishedMessage {
    pub fn success() -> Self {
        Self { error_code: None }
    }

    pub fn error(code: ErrorCode) -> Self {
        Self {
            error_code: Some(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "CheckClientMessage")]
    CheckClient,
    #[serde(rename = "InsecureClientMessage")]
    InsecureClient(InsecureClientMessage),
    #[serde(rename = "AdministrationMessage")]
    Administration(AdministrationMessage),
    #[serde(rename = "FilesDigestRequestMessage")]
    FilesDigestRequest(FilesDigestRequestMessage),
    #[serde(rename = "SignCertificatesRequestMessage")]
    SignCertificatesRequest,
    #[serde(rename = "SignRequestMessage")]
    SignRequest(SignRequestMessage),
    #[serde(rename = "AuthenticationRequestMessage")]
    AuthenticationRequest(AuthenticationRequestMessage),
    #[serde(rename = "IdentificationRequestMessage")]
    IdentificationRequest(IdentificationRequestMessage),
    #[serde(rename = "FinishedMessage")]
    Finished(FinishedMessage),
}

impl OutboundMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            OutboundMessage::CheckClient => MessageType::CheckClient,
            OutboundMessage::InsecureClient(_) => MessageType::InsecureClient,
            OutboundMessage::Administration(_) => MessageType::Administration,
            OutboundMessage::FilesDigestRequest(_) => MessageType::FilesDigestRequest,
            OutboundMessage::SignCertificatesRequest => MessageType::SignCertificatesRequest,
            OutboundMessage::SignRequest(_) => MessageType::SignRequest,
            OutboundMessage::AuthenticationRequest(_) => MessageType::AuthenticationRequest,
            OutboundMessage::IdentificationRequest(_) => MessageType::IdentificationRequest,
            OutboundMessage::Finished(_) => MessageType::Finished,
        }
    }

    /// Error code of a terminal FinishedMessage, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            OutboundMessage::Finished(finished) => finished.error_code,
            _ => None,
        }
    }
}
