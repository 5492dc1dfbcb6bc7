use std::sync::Arc;

use eidgate_core::{
    Certificate, DigestInfo, PreSignRequest, ProviderResult, RequestId, SessionId,
    SignatureService,
};

use crate::artifact::TemporaryArtifactStore;
use crate::digest::DigestAlgorithm;
use crate::document::{DocumentSource, SignedDocumentSink};
use crate::engine::DetachedSignatureEngine;

/// Signs one configured container on behalf of the protocol.
///
/// Each protocol session is its own signing request.
pub struct ContainerSignatureService<A: TemporaryArtifactStore> {
    engine: DetachedSignatureEngine<A>,
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn SignedDocumentSink>,
    files_digest_algorithm: Option<DigestAlgorithm>,
    requires_signing_certificates: bool,
}

impl<A: TemporaryArtifactStore> ContainerSignatureService<A> {
    pub fn new(
        engine: DetachedSignatureEngine<A>,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn SignedDocumentSink>,
    ) -> Self {
        Self {
            engine,
            source,
            sink,
            files_digest_algorithm: None,
            requires_signing_certificates: false,
        }
    }

    /// Ask the client to digest its local files before signing.
    pub fn with_files_digest(mut self, algorithm: DigestAlgorithm) -> Self {
        self.files_digest_algorithm = Some(algorithm);
        self
    }

    /// Ask the client for its signing chain first, so the signed
    /// properties can name the signing certificate.
    pub fn with_signing_certificates(mut self) -> Self {
        self.requires_signing_certificates = true;
        self
    }

    pub fn engine(&self) -> &DetachedSignatureEngine<A> {
        &self.engine
    }
}

impl<A: TemporaryArtifactStore> SignatureService for ContainerSignatureService<A> {
    fn files_digest_algorithm(&self) -> Option<String> {
        self.files_digest_algorithm.map(|a| a.name().to_string())
    }

    fn requires_signing_certificates(&self) -> bool {
        self.requires_signing_certificates
    }

    fn pre_sign(&self, request: &PreSignRequest) -> ProviderResult<DigestInfo> {
        let request_id = RequestId::from(&request.session_id);
        Ok(self.engine.pre_sign(
            &request_id,
            self.source.as_ref(),
            &request.file_digests,
            &request.signing_certificate_chain,
        )?)
    }

    fn post_sign(
        &self,
        session_id: &SessionId,
        signature_value: &[u8],
        certificate_chain: &[Certificate],
    ) -> ProviderResult<()> {
        let request_id = RequestId::from(session_id);
        self.engine.post_sign(
            &request_id,
            signature_value,
            certificate_chain,
            self.sink.as_ref(),
        )?;
        Ok(())
    }

    fn abort(&self, session_id: &SessionId) -> ProviderResult<()> {
        self.engine.abort(&RequestId::from(session_id))?;
        Ok(())
    }
}
