use eidgate_core::Certificate;
use serde::Serialize;

use crate::block::{self, ParsedSignature, EXTERNAL_FILE_TYPE};
use crate::container::Container;
use crate::error::SignerResult;

/// Outcome of checking one signature of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureReport {
    pub signature_id: String,
    pub valid: bool,
    pub signer: Option<Certificate>,
    pub signing_time: Option<String>,
    /// References whose recomputed digest differs from the signed one.
    pub mismatched_references: Vec<String>,
    /// References to client files outside the container.
    pub unresolved_references: Vec<String>,
    /// Set when the block could not be checked at all.
    pub problem: Option<String>,
}

impl SignatureReport {
    fn unreadable(signature_id: String, problem: String) -> Self {
        Self {
            signature_id,
            valid: false,
            signer: None,
            signing_time: None,
            mismatched_references: Vec::new(),
            unresolved_references: Vec::new(),
            problem: Some(problem),
        }
    }
}

/// Check every signature of a finished container.
///
/// Only an unreadable container is an error. Forged, corrupted or
/// unparseable signatures come back as reports with `valid == false`.
pub fn verify_container(bytes: &[u8]) -> SignerResult<Vec<SignatureReport>> {
    let container = Container::parse(bytes.to_vec())?;
    let manifest = match container.signature_manifest()? {
        Some(manifest) => manifest,
        None => return Ok(Vec::new()),
    };

    let mut reports = Vec::new();
    for (signature_id, parsed) in block::parse_manifest(&manifest) {
        let report = match parsed {
            Ok(signature) => check_signature(&container, signature)?,
            Err(e) => SignatureReport::unreadable(signature_id, e.to_string()),
        };
        tracing::debug!(
            signature_id = %report.signature_id,
            valid = report.valid,
            mismatched = report.mismatched_references.len(),
            unresolved = report.unresolved_references.len(),
            "signature checked"
        );
        reports.push(report);
    }
    Ok(reports)
}

fn check_signature(container: &Container, signature: ParsedSignature) -> SignerResult<SignatureReport> {
    let mut mismatched = Vec::new();
    let mut unresolved = Vec::new();
    for reference in &signature.references {
        if reference.reference_type.as_deref() == Some(EXTERNAL_FILE_TYPE) {
            unresolved.push(reference.uri.clone());
            continue;
        }
        match container.dereference(&reference.uri, &signature.block)? {
            Some(content) => {
                if reference.digest_algorithm.digest(&content) != reference.digest_value {
                    mismatched.push(reference.uri.clone());
                }
            }
            // A signed part that is gone counts as changed.
            None => mismatched.push(reference.uri.clone()),
        }
    }

    let signer = signature.chain.first().cloned();
    let mut problem = None;
    let signature_ok = match &signer {
        Some(certificate) => {
            let digest = signature
                .signed_info_digest_algorithm()
                .digest(signature.signed_info.as_bytes());
            let ok = certificate.verify(&digest, &signature.signature_value);
            if !ok {
                problem = Some("signature value does not match SignedInfo".to_string());
            }
            ok
        }
        None => {
            problem = Some("no signer certificate".to_string());
            false
        }
    };

    let certificate_ok = match (&signature.certificate_digest, &signer) {
        (Some((algorithm, expected)), Some(certificate)) => {
            let ok = algorithm.digest(&certificate.encode()?) == *expected;
            if !ok {
                problem = Some("signer certificate differs from the signed one".to_string());
            }
            ok
        }
        _ => true,
    };

    Ok(SignatureReport {
        signature_id: signature.signature_id,
        valid: signature_ok && certificate_ok && mismatched.is_empty(),
        signer,
        signing_time: signature.signing_time,
        mismatched_references: mismatched,
        unresolved_references: unresolved,
        problem,
    })
}
