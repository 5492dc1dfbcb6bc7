use crate::error::ProviderResult;
use crate::types::{
    Certificate, ClientEnvironment, DigestInfo, FileDigest, IdentityRequest, SessionId,
};

// ---------------------------------------------------------------------------
// Capability providers
//
// Every provider is optional per deployment. Whether a provider is present
// decides which branch of the protocol runs; the protocol engine never
// implements any of them itself.
// ---------------------------------------------------------------------------

/// Authentication capability. Its presence routes the protocol towards an
/// authentication request instead of a plain identification.
pub trait AuthenticationService: Send + Sync {
    /// Validate the authentication certificate chain (leaf first) of a
    /// client that produced a valid authentication signature.
    fn validate_certificate_chain(&self, chain: &[Certificate]) -> ProviderResult<()>;
}

/// Decides which identity data is read from the card.
pub trait IdentityService: Send + Sync {
    fn identity_request(&self) -> IdentityRequest;
}

/// Supplies the human readable purpose shown before identity data is read.
pub trait PrivacyService: Send + Sync {
    fn identity_data_usage(&self, language: Option<&str>) -> Option<String>;
}

/// Everything a signature service needs to compute the digest to be signed.
#[derive(Debug, Clone)]
pub struct PreSignRequest {
    pub session_id: SessionId,
    pub file_digests: Vec<FileDigest>,
    pub signing_certificate_chain: Vec<Certificate>,
}

impl PreSignRequest {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            file_digests: Vec::new(),
            signing_certificate_chain: Vec::new(),
        }
    }
}

/// Detached signing capability.
pub trait SignatureService: Send + Sync {
    /// When set, the client is first asked to digest its local files with
    /// this algorithm.
    fn files_digest_algorithm(&self) -> Option<String>;

    /// When true, the client is first asked for its signing certificate chain.
    fn requires_signing_certificates(&self) -> bool {
        false
    }

    fn pre_sign(&self, request: &PreSignRequest) -> ProviderResult<DigestInfo>;

    fn post_sign(
        &self,
        session_id: &SessionId,
        signature_value: &[u8],
        certificate_chain: &[Certificate],
    ) -> ProviderResult<()>;

    /// Drop whatever `pre_sign` keeps for this session. Called when the
    /// session ends without a successful `post_sign`; a no-op when nothing
    /// is pending.
    fn abort(&self, _session_id: &SessionId) -> ProviderResult<()> {
        Ok(())
    }
}

/// Secure pinpad reader capability.
pub trait SecureCardReaderService: Send + Sync {
    /// Message shown on the reader display during authentication.
    fn transaction_message(&self) -> Option<String>;
}

/// Validates the national registry certificate chain that signs the
/// identity and address files.
pub trait IdentityIntegrityService: Send + Sync {
    fn check_national_registration_certificate(&self, chain: &[Certificate])
        -> ProviderResult<()>;
}

/// Judges whether the client environment is safe to continue with.
pub trait ClientEnvironmentService: Send + Sync {
    fn check_client_environment(&self, environment: &ClientEnvironment) -> ProviderResult<()>;
}
