//! Detached signature engine.
//!
//! `pre_sign` reads the container, writes the SignedInfo the card will sign
//! and parks everything the signature block needs in a
//! [`TemporaryArtifactStore`]. `post_sign` takes that entry back, wraps the
//! card's signature value into the block and finalises the container.
//! Between the two calls a request is pending; calling `pre_sign` again
//! replaces the pending entry.

use std::sync::Arc;

use eidgate_core::{base64_bytes, Certificate, DigestInfo, FileDigest, RequestId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::artifact::TemporaryArtifactStore;
use crate::block::{self, Reference, EXTERNAL_FILE_TYPE, SIGNED_PROPERTIES_TYPE};
use crate::container::{percent_encode, Container};
use crate::digest::DigestAlgorithm;
use crate::document::{DocumentSource, SignedDocumentSink};
use crate::error::{SignerError, SignerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub digest_algorithm: DigestAlgorithm,
    /// Shown to the user next to the digest.
    pub description: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            description: "ODF Signature".into(),
        }
    }
}

/// What `post_sign` needs from `pre_sign`.
#[derive(Debug, Serialize, Deserialize)]
struct PendingSignature {
    #[serde(with = "base64_bytes")]
    container: Vec<u8>,
    signature_id: String,
    signed_info: String,
    signed_properties: String,
    digest_algorithm: DigestAlgorithm,
}

pub struct DetachedSignatureEngine<A: TemporaryArtifactStore> {
    config: EngineConfig,
    artifacts: Arc<A>,
}

impl<A: TemporaryArtifactStore> DetachedSignatureEngine<A> {
    pub fn new(config: EngineConfig, artifacts: Arc<A>) -> Self {
        Self { config, artifacts }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    /// Whether a digest was issued for this request and not yet consumed.
    pub fn is_pending(&self, request_id: &RequestId) -> SignerResult<bool> {
        self.artifacts.contains(request_id)
    }

    /// Compute the digest to be signed for the container behind `source`.
    ///
    /// `extra_references` are digests of files outside the container. They
    /// are signed as references typed [`EXTERNAL_FILE_TYPE`], the only kind
    /// a verifier leaves unresolved.
    pub fn pre_sign(
        &self,
        request_id: &RequestId,
        source: &dyn DocumentSource,
        extra_references: &[FileDigest],
        signing_chain: &[Certificate],
    ) -> SignerResult<DigestInfo> {
        let algorithm = self.config.digest_algorithm;
        let container = Container::parse(source.load()?)?;

        let mut references = Vec::new();
        for part in container.signable_parts() {
            references.push(Reference {
                uri: percent_encode(part),
                reference_type: None,
                digest_algorithm: algorithm,
                digest_value: algorithm.digest(&container.digest_input(part)?),
            });
        }
        for file in extra_references {
            references.push(Reference {
                uri: percent_encode(&file.description),
                reference_type: Some(EXTERNAL_FILE_TYPE.into()),
                digest_algorithm: file.digest_algorithm.parse()?,
                digest_value: file.digest_value.clone(),
            });
        }
        if references.is_empty() {
            return Err(SignerError::NoSignableContent);
        }

        let signature_id = format!("signature-{}", uuid::Uuid::new_v4());
        let signed_properties = block::signed_properties(
            &signature_id,
            &Timestamp::now(),
            algorithm,
            signing_chain.first(),
        )?;
        references.push(Reference {
            uri: format!("#{}", block::signed_properties_id(&signature_id)),
            reference_type: Some(SIGNED_PROPERTIES_TYPE.into()),
            digest_algorithm: algorithm,
            digest_value: algorithm.digest(signed_properties.as_bytes()),
        });
        let signed_info = block::signed_info(&references);
        let digest_value = algorithm.digest(signed_info.as_bytes());

        let pending = PendingSignature {
            container: container.into_bytes(),
            signature_id,
            signed_info,
            signed_properties,
            digest_algorithm: algorithm,
        };
        let replaced = self.artifacts.contains(request_id)?;
        self.artifacts.put(request_id, serde_json::to_vec(&pending)?)?;

        tracing::info!(
            request_id = %request_id,
            source = %source.describe(),
            references = references.len(),
            algorithm = %algorithm,
            replaced,
            "digest computed"
        );
        Ok(DigestInfo {
            description: self.config.description.clone(),
            digest_algorithm: algorithm.name().to_string(),
            digest_value,
        })
    }

    /// Discard the pending entry without signing. Returns whether one was
    /// pending.
    pub fn abort(&self, request_id: &RequestId) -> SignerResult<bool> {
        let discarded = self.artifacts.take(request_id)?.is_some();
        if discarded {
            tracing::info!(request_id = %request_id, "pending digest discarded");
        }
        Ok(discarded)
    }

    /// Embed the signature value and write the signed container.
    ///
    /// The pending entry is consumed before anything else happens, so a
    /// failure here never leaves a digest behind that could be signed again.
    pub fn post_sign(
        &self,
        request_id: &RequestId,
        signature_value: &[u8],
        certificate_chain: &[Certificate],
        sink: &dyn SignedDocumentSink,
    ) -> SignerResult<Vec<u8>> {
        let stored = self
            .artifacts
            .take(request_id)?
            .ok_or_else(|| SignerError::NoPendingDigest(request_id.to_string()))?;
        let pending: PendingSignature = serde_json::from_slice(&stored)?;

        let signature = block::signature(
            &pending.signature_id,
            &pending.signed_info,
            &pending.signed_properties,
            signature_value,
            certificate_chain,
        )?;
        let container = Container::parse(pending.container)?;
        let signed = container.finalize(&signature)?;
        sink.write(&signed)?;

        tracing::info!(
            request_id = %request_id,
            signature_id = %pending.signature_id,
            algorithm = %pending.digest_algorithm,
            size = signed.len(),
            "container signed"
        );
        Ok(signed)
    }
}
