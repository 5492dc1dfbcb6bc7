//! Identity data checks.
//!
//! The client returns the files the request context asked for. With an
//! identity-integrity provider configured, the national registry chain is
//! validated and the identity and address files must carry valid
//! signatures from its leaf.

use eidgate_core::ErrorCode;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::HandlerContext;
use crate::messages::{FinishedMessage, IdentityDataMessage, OutboundMessage};
use crate::session::{ProtocolSession, RequestContext};

pub fn handle_identity_data(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: IdentityDataMessage,
) -> HandlerResult<OutboundMessage> {
    check_identity_data(ctx, &session.request_context, &message)?;
    tracing::info!(session_id = %session.session_id, "identity data accepted");
    session.identity = Some(message);
    Ok(OutboundMessage::Finished(FinishedMessage::success()))
}

/// Verify that identity data matches what was requested and, when an
/// integrity provider is configured, that it is authentic.
pub fn check_identity_data(
    ctx: HandlerContext<'_>,
    request: &RequestContext,
    message: &IdentityDataMessage,
) -> HandlerResult<()> {
    if message.identity_file.is_empty() {
        return Err(HandlerError::Internal("identity file missing".into()));
    }
    if request.include_address && message.address_file.is_none() {
        return Err(HandlerError::Internal("address file missing".into()));
    }
    if request.include_photo && message.photo.is_none() {
        return Err(HandlerError::Internal("photo missing".into()));
    }
    if request.include_certificates
        && (message.authn_certificate.is_none() || message.sign_certificate.is_none())
    {
        return Err(HandlerError::Internal("card certificates missing".into()));
    }

    let Some(integrity) = &ctx.capabilities.identity_integrity else {
        return Ok(());
    };

    let rrn = message.rrn_certificate_chain.first().ok_or_else(|| HandlerError::Refused {
        code: ErrorCode::Certificate,
        reason: "national registry certificate missing".into(),
    })?;
    integrity.check_national_registration_certificate(&message.rrn_certificate_chain)?;

    let identity_signature = message
        .identity_signature
        .as_deref()
        .ok_or_else(|| HandlerError::authorization("identity signature missing"))?;
    if !rrn.verify(&message.identity_file, identity_signature) {
        return Err(HandlerError::authorization("identity signature invalid"));
    }

    if let Some(address_file) = &message.address_file {
        let address_signature = message
            .address_signature
            .as_deref()
            .ok_or_else(|| HandlerError::authorization("address signature missing"))?;
        let mut signed = address_file.clone();
        signed.extend_from_slice(identity_signature);
        if !rrn.verify(&signed, address_signature) {
            return Err(HandlerError::authorization("address signature invalid"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::providers::Capabilities;
    use crate::testing::{AcceptIntegrity, TestCard};
    use eidgate_core::SessionId;
    use std::sync::Arc;

    fn signed_identity(rrn: &TestCard) -> IdentityDataMessage {
        let identity_file = b"name=Alice;nationality=BE".to_vec();
        let address_file = b"street=Wetstraat 16".to_vec();
        let identity_signature = rrn.sign(&identity_file);
        let mut address_payload = address_file.clone();
        address_payload.extend_from_slice(&identity_signature);
        IdentityDataMessage {
            identity_file,
            address_file: Some(address_file),
            address_signature: Some(rrn.sign(&address_payload)),
            identity_signature: Some(identity_signature),
            rrn_certificate_chain: vec![rrn.certificate.clone()],
            ..IdentityDataMessage::default()
        }
    }

    fn with_integrity() -> (ServiceConfig, Capabilities) {
        (
            ServiceConfig::default(),
            Capabilities::new().with_identity_integrity(Arc::new(AcceptIntegrity)),
        )
    }

    #[test]
    fn test_identity_data_stored() {
        let rrn = TestCard::new("CN=RRN");
        let (config, caps) = with_integrity();
        let mut session = ProtocolSession::new(SessionId::new("s-1"));
        session.request_context.include_address = true;
        let ctx = HandlerContext {
            config: &config,
            capabilities: &caps,
        };
        let out = handle_identity_data(ctx, &mut session, signed_identity(&rrn)).unwrap();
        assert_eq!(out, OutboundMessage::Finished(FinishedMessage::success()));
        assert!(session.identity.is_some());
    }

    #[test]
    fn test_tampered_identity_file_rejected() {
        let rrn = TestCard::new("CN=RRN");
        let (config, caps) = with_integrity();
        let mut message = signed_identity(&rrn);
        message.identity_file[0] ^= 0xff;
        let ctx = HandlerContext {
            config: &config,
            capabilities: &caps,
        };
        let err = check_identity_data(ctx, &RequestContext::default(), &message).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Authorization);
    }

    #[test]
    fn test_address_signature_covers_identity_signature() {
        let rrn = TestCard::new("CN=RRN");
        let (config, caps) = with_integrity();
        let mut message = signed_identity(&rrn);
        // Signature over the address file alone must not pass.
        message.address_signature = Some(rrn.sign(message.address_file.as_ref().unwrap()));
        let ctx = HandlerContext {
            config: &config,
            capabilities: &caps,
        };
        assert!(check_identity_data(ctx, &RequestContext::default(), &message).is_err());
    }

    #[test]
    fn test_missing_requested_photo() {
        let config = ServiceConfig::default();
        let caps = Capabilities::new();
        let request = RequestContext {
            include_photo: true,
            ..RequestContext::default()
        };
        let message = IdentityDataMessage {
            identity_file: b"id".to_vec(),
            ..IdentityDataMessage::default()
        };
        let ctx = HandlerContext {
            config: &config,
            capabilities: &caps,
        };
        assert!(matches!(
            check_identity_data(ctx, &request, &message),
            Err(HandlerError::Internal(_))
        ));
    }

    #[test]
    fn test_no_integrity_provider_skips_signature_checks() {
        let config = ServiceConfig::default();
        let caps = Capabilities::new();
        let message = IdentityDataMessage {
            identity_file: b"id".to_vec(),
            ..IdentityDataMessage::default()
        };
        let ctx = HandlerContext {
            config: &config,
            capabilities: &caps,
        };
        assert!(check_identity_data(ctx, &RequestContext::default(), &message).is_ok());
    }
}
