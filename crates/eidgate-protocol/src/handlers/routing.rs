//! Request routing shared by the hello and environment-check handlers.
//!
//! Decides which operation the client performs next from the configured
//! providers: PIN administration, then signing, then authentication, and
//! plain identification when nothing else applies.

use eidgate_core::{short_hex, PreSignRequest};

use crate::challenge::AuthenticationChallenge;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::HandlerContext;
use crate::messages::{
    AdministrationMessage, AuthenticationRequestMessage, FilesDigestRequestMessage,
    IdentificationRequestMessage, OutboundMessage, SignRequestMessage,
};
use crate::session::{PendingDigest, ProtocolSession, RequestContext};

pub fn next_request(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
) -> HandlerResult<OutboundMessage> {
    let config = ctx.config;
    if config.change_pin || config.unblock_pin {
        return Ok(OutboundMessage::Administration(AdministrationMessage {
            change_pin: config.change_pin,
            unblock_pin: config.unblock_pin,
            logoff: config.logoff,
            remove_card: config.remove_card,
            require_secure_reader: config.require_secure_reader,
        }));
    }

    if let Some(signature) = &ctx.capabilities.signature {
        if let Some(digest_algorithm) = signature.files_digest_algorithm() {
            tracing::debug!(algorithm = %digest_algorithm, "requesting client file digests");
            return Ok(OutboundMessage::FilesDigestRequest(
                FilesDigestRequestMessage { digest_algorithm },
            ));
        }
        if signature.requires_signing_certificates() {
            return Ok(OutboundMessage::SignCertificatesRequest);
        }
        let request = PreSignRequest::new(session.session_id.clone());
        return sign_request(ctx, session, &request);
    }

    if ctx.capabilities.authentication.is_some() {
        return Ok(authentication_request(ctx, session));
    }

    Ok(identification_request(ctx, session))
}

/// Run pre-sign and turn its digest into a sign request, remembering the
/// digest on the session for the signature check.
pub fn sign_request(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    request: &PreSignRequest,
) -> HandlerResult<OutboundMessage> {
    let signature = ctx
        .capabilities
        .signature
        .as_ref()
        .ok_or_else(|| HandlerError::Internal("no signature service configured".into()))?;

    let digest_info = signature.pre_sign(request)?;
    if digest_info.digest_value.is_empty() {
        return Err(HandlerError::Internal("pre-sign returned an empty digest".into()));
    }

    tracing::info!(
        session_id = %session.session_id,
        algorithm = %digest_info.digest_algorithm,
        digest = %short_hex(&digest_info.digest_value),
        "issuing sign request"
    );

    session.pending_digest = Some(PendingDigest {
        algorithm: digest_info.digest_algorithm.clone(),
        value: digest_info.digest_value.clone(),
    });

    let remove_card = ctx
        .capabilities
        .effective_identity_request(ctx.config)
        .remove_card;

    Ok(OutboundMessage::SignRequest(SignRequestMessage {
        digest_value: digest_info.digest_value,
        digest_algorithm: digest_info.digest_algorithm,
        description: digest_info.description,
        logoff: ctx.config.logoff,
        remove_card,
        require_secure_reader: ctx.config.require_secure_reader,
    }))
}

fn authentication_request(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
) -> OutboundMessage {
    let config = ctx.config;
    let identity = ctx.capabilities.effective_identity_request(config);

    let transaction_message = ctx
        .capabilities
        .secure_reader
        .as_ref()
        .and_then(|reader| reader.transaction_message())
        .map(|message| config.truncate_transaction_message(&message));

    let challenge = AuthenticationChallenge::generate();
    let challenge_value = challenge.value().to_vec();
    session.challenge = Some(challenge);
    session.request_context = RequestContext {
        include_identity: identity.include_identity,
        include_address: identity.include_address,
        include_photo: identity.include_photo,
        include_certificates: identity.include_certificates,
        transaction_message: transaction_message.clone(),
    };

    tracing::info!(session_id = %session.session_id, "issuing authentication challenge");

    OutboundMessage::AuthenticationRequest(AuthenticationRequestMessage {
        challenge: challenge_value,
        include_hostname: config.hostname.is_some(),
        include_inet_address: config.inet_address.is_some(),
        logoff: config.logoff,
        pre_logoff: config.pre_logoff,
        remove_card: identity.remove_card,
        session_id_channel_binding: config.session_id_channel_binding,
        server_certificate_channel_binding: config.server_certificate_channel_binding,
        include_identity: identity.include_identity,
        include_certificates: identity.include_certificates,
        include_address: identity.include_address,
        include_photo: identity.include_photo,
        include_integrity_data: ctx.capabilities.identity_integrity.is_some(),
        require_secure_reader: config.require_secure_reader,
        transaction_message,
    })
}

fn identification_request(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
) -> OutboundMessage {
    let identity = ctx.capabilities.effective_identity_request(ctx.config);
    let identity_data_usage = ctx
        .capabilities
        .privacy
        .as_ref()
        .and_then(|privacy| privacy.identity_data_usage(session.client_language.as_deref()));

    session.request_context = RequestContext {
        include_identity: true,
        include_address: identity.include_address,
        include_photo: identity.include_photo,
        include_certificates: identity.include_certificates,
        transaction_message: None,
    };

    OutboundMessage::IdentificationRequest(IdentificationRequestMessage {
        include_address: identity.include_address,
        include_photo: identity.include_photo,
        include_integrity_data: ctx.capabilities.identity_integrity.is_some(),
        include_certificates: identity.include_certificates,
        remove_card: identity.remove_card,
        identity_data_usage,
    })
}
