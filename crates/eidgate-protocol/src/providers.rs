//! Capability providers configured for one deployment.

use std::sync::Arc;

use eidgate_core::{
    AuthenticationService, ClientEnvironmentService, IdentityIntegrityService, IdentityRequest,
    IdentityService, PrivacyService, SecureCardReaderService, SignatureService,
};

use crate::config::ServiceConfig;

/// Optional providers injected into the dispatcher at construction time.
/// Which of them are present decides the branch of the protocol that runs.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub authentication: Option<Arc<dyn AuthenticationService>>,
    pub identity: Option<Arc<dyn IdentityService>>,
    pub privacy: Option<Arc<dyn PrivacyService>>,
    pub signature: Option<Arc<dyn SignatureService>>,
    pub secure_reader: Option<Arc<dyn SecureCardReaderService>>,
    pub identity_integrity: Option<Arc<dyn IdentityIntegrityService>>,
    pub client_environment: Option<Arc<dyn ClientEnvironmentService>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authentication(mut self, service: Arc<dyn AuthenticationService>) -> Self {
        self.authentication = Some(service);
        self
    }

    pub fn with_identity(mut self, service: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(service);
        self
    }

    pub fn with_privacy(mut self, service: Arc<dyn PrivacyService>) -> Self {
        self.privacy = Some(service);
        self
    }

    pub fn with_signature(mut self, service: Arc<dyn SignatureService>) -> Self {
        self.signature = Some(service);
        self
    }

    pub fn with_secure_reader(mut self, service: Arc<dyn SecureCardReaderService>) -> Self {
        self.secure_reader = Some(service);
        self
    }

    pub fn with_identity_integrity(mut self, service: Arc<dyn IdentityIntegrityService>) -> Self {
        self.identity_integrity = Some(service);
        self
    }

    pub fn with_client_environment(mut self, service: Arc<dyn ClientEnvironmentService>) -> Self {
        self.client_environment = Some(service);
        self
    }

    /// Identity request in effect: the identity provider's values when one
    /// is configured, the static configuration otherwise.
    pub fn effective_identity_request(&self, config: &ServiceConfig) -> IdentityRequest {
        match &self.identity {
            Some(identity) => identity.identity_request(),
            None => IdentityRequest {
                include_identity: config.include_identity,
                include_address: config.include_address,
                include_photo: config.include_photo,
                include_certificates: config.include_certificates,
                remove_card: config.remove_card,
            },
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("authentication", &self.authentication.is_some())
            .field("identity", &self.identity.is_some())
            .field("privacy", &self.privacy.is_some())
            .field("signature", &self.signature.is_some())
            .field("secure_reader", &self.secure_reader.is_some())
            .field("identity_integrity", &self.identity_integrity.is_some())
            .field("client_environment", &self.client_environment.is_some())
            .finish()
    }
}
