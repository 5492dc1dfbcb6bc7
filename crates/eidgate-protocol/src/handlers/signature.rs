//! Signing round: file digests, signing certificates and the signature
//! value itself.

use eidgate_core::{short_hex, ErrorCode, PreSignRequest};

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{routing, HandlerContext};
use crate::messages::{
    FileDigestsDataMessage, FinishedMessage, OutboundMessage, SignCertificatesDataMessage,
    SignatureDataMessage,
};
use crate::session::ProtocolSession;

pub fn handle_file_digests_data(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: FileDigestsDataMessage,
) -> HandlerResult<OutboundMessage> {
    tracing::debug!(
        session_id = %session.session_id,
        files = message.file_digests.len(),
        "client file digests"
    );
    let request = PreSignRequest {
        session_id: session.session_id.clone(),
        file_digests: message.file_digests,
        signing_certificate_chain: session.signing_certificate_chain.clone(),
    };
    routing::sign_request(ctx, session, &request)
}

pub fn handle_sign_certificates_data(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: SignCertificatesDataMessage,
) -> HandlerResult<OutboundMessage> {
    if message.certificate_chain.is_empty() {
        return Err(HandlerError::Refused {
            code: ErrorCode::Certificate,
            reason: "empty signing certificate chain".into(),
        });
    }
    session.signing_certificate_chain = message.certificate_chain;
    let request = PreSignRequest {
        session_id: session.session_id.clone(),
        file_digests: Vec::new(),
        signing_certificate_chain: session.signing_certificate_chain.clone(),
    };
    routing::sign_request(ctx, session, &request)
}

/// Check the returned signature against the digest this session issued,
/// then hand it to the signature service. The pending digest is consumed
/// whatever the outcome.
pub fn handle_signature_data(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: SignatureDataMessage,
) -> HandlerResult<OutboundMessage> {
    let pending = session
        .pending_digest
        .take()
        .ok_or_else(|| HandlerError::authorization("no digest pending for this session"))?;

    let Some(signer) = message.certificate_chain.first() else {
        discard_pending(ctx, session);
        return Err(HandlerError::Refused {
            code: ErrorCode::Certificate,
            reason: "empty signing certificate chain".into(),
        });
    };
    if !signer.verify(&pending.value, &message.signature_value) {
        tracing::info!(
            session_id = %session.session_id,
            digest = %short_hex(&pending.value),
            "signature does not match the pending digest"
        );
        discard_pending(ctx, session);
        return Err(HandlerError::authorization(
            "signature value does not match the pending digest",
        ));
    }

    let signature = ctx
        .capabilities
        .signature
        .as_ref()
        .ok_or_else(|| HandlerError::Internal("no signature service configured".into()))?;
    signature.post_sign(
        &session.session_id,
        &message.signature_value,
        &message.certificate_chain,
    )?;

    tracing::info!(
        session_id = %session.session_id,
        signer = %signer.subject,
        algorithm = %pending.algorithm,
        "signature accepted"
    );
    Ok(OutboundMessage::Finished(FinishedMessage::success()))
}

/// The signature service keeps its own pre-sign state; release it when
/// the signature is refused before reaching `post_sign`.
fn discard_pending(ctx: HandlerContext<'_>, session: &ProtocolSession) {
    if let Some(signature) = ctx.capabilities.signature.as_ref() {
        if let Err(e) = signature.abort(&session.session_id) {
            tracing::warn!(
                session_id = %session.session_id,
                error = %e,
                "could not discard pending signature"
            );
        }
    }
}
