//! Shared fixtures for unit tests: a software "card" and scripted providers.

use std::sync::Mutex;

use ed25519_dalek::{Signer, SigningKey};
use eidgate_core::{
    AuthenticationService, Certificate, ClientEnvironment, ClientEnvironmentService, DigestInfo,
    ErrorCode, IdentityIntegrityService, IdentityRequest, IdentityService, PreSignRequest,
    PrivacyService, ProviderError, ProviderResult, SecureCardReaderService, SessionId,
    SignatureService, Timestamp,
};
use rand::rngs::OsRng;

pub struct TestCard {
    pub key: SigningKey,
    pub certificate: Certificate,
}

impl TestCard {
    pub fn new(subject: &str) -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let now = Timestamp::now().seconds_since_epoch;
        let certificate = Certificate {
            subject: subject.into(),
            issuer: "CN=Citizen CA".into(),
            public_key: key.verifying_key().to_bytes().to_vec(),
            not_before: Timestamp::from_seconds(now - 3_600),
            not_after: Timestamp::from_seconds(now + 3_600),
        };
        Self { key, certificate }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }
}

#[derive(Default)]
pub struct ScriptedSignature {
    pub files_digest_algorithm: Option<String>,
    pub requires_certificates: bool,
    pub refuse: bool,
    pub pre_sign_calls: Mutex<Vec<PreSignRequest>>,
    pub post_sign_calls: Mutex<Vec<(SessionId, Vec<u8>)>>,
    pub abort_calls: Mutex<Vec<SessionId>>,
}

pub const SCRIPTED_DIGEST: [u8; 32] = [0x42; 32];

impl SignatureService for ScriptedSignature {
    fn files_digest_algorithm(&self) -> Option<String> {
        self.files_digest_algorithm.clone()
    }

    fn requires_signing_certificates(&self) -> bool {
        self.requires_certificates
    }

    fn pre_sign(&self, request: &PreSignRequest) -> ProviderResult<DigestInfo> {
        if self.refuse {
            return Err(ProviderError::authorization("not allowed to sign"));
        }
        self.pre_sign_calls
            .lock()
            .map_err(|_| ProviderError::Internal("poisoned".into()))?
            .push(request.clone());
        Ok(DigestInfo {
            description: "test document".into(),
            digest_algorithm: "SHA-256".into(),
            digest_value: SCRIPTED_DIGEST.to_vec(),
        })
    }

    fn post_sign(
        &self,
        session_id: &SessionId,
        signature_value: &[u8],
        _certificate_chain: &[Certificate],
    ) -> ProviderResult<()> {
        self.post_sign_calls
            .lock()
            .map_err(|_| ProviderError::Internal("poisoned".into()))?
            .push((session_id.clone(), signature_value.to_vec()));
        Ok(())
    }

    fn abort(&self, session_id: &SessionId) -> ProviderResult<()> {
        self.abort_calls
            .lock()
            .map_err(|_| ProviderError::Internal("poisoned".into()))?
            .push(session_id.clone());
        Ok(())
    }
}

pub struct ScriptedAuthentication {
    pub refusal: Option<ErrorCode>,
}

impl AuthenticationService for ScriptedAuthentication {
    fn validate_certificate_chain(&self, _chain: &[Certificate]) -> ProviderResult<()> {
        match self.refusal {
            Some(code) => Err(ProviderError::refused(code, "chain rejected")),
            None => Ok(()),
        }
    }
}

pub struct FixedIdentity(pub IdentityRequest);

impl IdentityService for FixedIdentity {
    fn identity_request(&self) -> IdentityRequest {
        self.0
    }
}

pub struct FixedPrivacy;

impl PrivacyService for FixedPrivacy {
    fn identity_data_usage(&self, language: Option<&str>) -> Option<String> {
        match language {
            Some("nl") => Some("Registratie".into()),
            _ => Some("Registration".into()),
        }
    }
}

pub struct FixedReader(pub String);

impl SecureCardReaderService for FixedReader {
    fn transaction_message(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

pub struct AcceptIntegrity;

impl IdentityIntegrityService for AcceptIntegrity {
    fn check_national_registration_certificate(
        &self,
        _chain: &[Certificate],
    ) -> ProviderResult<()> {
        Ok(())
    }
}

pub struct EnvironmentPolicy {
    pub accept: bool,
}

impl ClientEnvironmentService for EnvironmentPolicy {
    fn check_client_environment(&self, environment: &ClientEnvironment) -> ProviderResult<()> {
        if self.accept {
            Ok(())
        } else {
            Err(ProviderError::refused(
                ErrorCode::Generic,
                format!("unsupported platform {}", environment.os_name),
            ))
        }
    }
}
