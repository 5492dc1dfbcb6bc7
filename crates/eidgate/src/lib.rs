//! eID gateway root library.
//!
//! Wires the protocol engine and the detached signature engine into one
//! service from a [`GatewayConfig`].
//!
//! # Architecture
//!
//! The binary is a thin orchestrator. [`initialize_gateway`] turns the
//! configuration into capability providers (document signing, certificate
//! trust), builds the dispatcher and binds it to an in-memory session
//! store. The [`transport`] module frames the stdio loop of the binary.

pub mod config;
pub mod error;
pub mod transport;
pub mod trust;

pub use config::{AuthenticationConfig, GatewayConfig, ServerConfig, SignerConfig};
pub use error::{GatewayError, GatewayResult};
pub use transport::{handle_envelope, handle_line, Envelope, ErrorBody, Reply};
pub use trust::IssuerAllowList;

use std::sync::Arc;

use eidgate_protocol::{Capabilities, Dispatcher, InMemorySessionStore, ProtocolServer};
use eidgate_signer::{
    ContainerSignatureService, DetachedSignatureEngine, EngineConfig, FileSink, FileSource,
    InMemoryArtifactStore,
};
use tracing::info;

// ---------------------------------------------------------------------------
// Gateway state
// ---------------------------------------------------------------------------

pub struct GatewayState {
    pub config: GatewayConfig,
    server: ProtocolServer<InMemorySessionStore>,
}

impl GatewayState {
    pub fn server(&self) -> &ProtocolServer<InMemorySessionStore> {
        &self.server
    }

    pub fn handle_line(&self, line: &str) -> String {
        transport::handle_line(&self.server, line)
    }
}

/// Build the capability providers a configuration asks for.
pub fn build_capabilities(config: &GatewayConfig) -> GatewayResult<Capabilities> {
    let mut capabilities = Capabilities::new();

    if let Some(document) = &config.signer.document_path {
        if !document.is_file() {
            return Err(GatewayError::Config(format!(
                "[signer] document {} does not exist",
                document.display()
            )));
        }
        let output = config.signer.resolved_output_path().ok_or_else(|| {
            GatewayError::Config("[signer] cannot derive an output path".into())
        })?;
        let engine = DetachedSignatureEngine::new(
            EngineConfig {
                digest_algorithm: config.signer.digest_algorithm,
                description: config.signer.description.clone(),
            },
            Arc::new(InMemoryArtifactStore::new()),
        );
        let mut service = ContainerSignatureService::new(
            engine,
            Arc::new(FileSource::new(document)),
            Arc::new(FileSink::new(&output)),
        );
        if let Some(algorithm) = config.signer.files_digest_algorithm {
            service = service.with_files_digest(algorithm);
        }
        if config.signer.require_signing_certificates {
            service = service.with_signing_certificates();
        }
        info!(
            document = %document.display(),
            output = %output.display(),
            algorithm = %config.signer.digest_algorithm,
            "document signing enabled"
        );
        capabilities = capabilities.with_signature(Arc::new(service));
    }

    if config.authentication.enabled {
        info!(
            trusted_issuers = config.authentication.trusted_issuers.len(),
            "authentication enabled"
        );
        capabilities = capabilities.with_authentication(Arc::new(IssuerAllowList::new(
            config.authentication.trusted_issuers.clone(),
        )));
    }

    Ok(capabilities)
}

/// Validate the configuration and assemble a ready-to-serve gateway.
pub fn initialize_gateway(config: GatewayConfig) -> GatewayResult<GatewayState> {
    config.validate()?;
    let capabilities = build_capabilities(&config)?;
    let dispatcher = Dispatcher::new(config.protocol.clone(), capabilities)?;
    info!(server_name = %config.server.server_name, "gateway initialized");
    Ok(GatewayState {
        config,
        server: ProtocolServer::new(dispatcher, InMemorySessionStore::new()),
    })
}
