//! Authentication response handling.
//!
//! Consumes the session challenge, rebuilds the authentication contract
//! the client should have signed and verifies it with the leaf of the
//! presented chain before the authentication provider gets to judge the
//! chain itself.

use eidgate_core::{ErrorCode, Timestamp};
use subtle::ConstantTimeEq;

use crate::challenge::AuthenticationContract;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{identification, HandlerContext};
use crate::messages::{AuthenticationDataMessage, FinishedMessage, OutboundMessage};
use crate::session::ProtocolSession;

pub fn handle_authentication_data(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: AuthenticationDataMessage,
) -> HandlerResult<OutboundMessage> {
    let config = ctx.config;
    let now = Timestamp::now();

    let challenge = session
        .challenge
        .take()
        .ok_or_else(|| HandlerError::authorization("no authentication challenge pending"))?;
    let challenge = challenge.into_fresh_value(&now, config.challenge_max_maturity_secs)?;

    if config.session_id_channel_binding {
        let presented = message.session_id.as_deref().unwrap_or_default();
        if !bool::from(presented.ct_eq(session.session_id.as_str().as_bytes())) {
            return Err(HandlerError::authorization("session channel binding mismatch"));
        }
    }
    if config.server_certificate_channel_binding {
        let expected = config.server_certificate.as_deref().unwrap_or_default();
        let presented = message.server_certificate.as_deref().unwrap_or_default();
        if expected.is_empty() || !bool::from(presented.ct_eq(expected)) {
            return Err(HandlerError::authorization(
                "server certificate channel binding mismatch",
            ));
        }
    }

    let leaf = message
        .certificate_chain
        .first()
        .ok_or_else(|| HandlerError::Refused {
            code: ErrorCode::Certificate,
            reason: "empty authentication certificate chain".into(),
        })?;
    if !leaf.is_valid_at(&now) {
        return Err(HandlerError::Refused {
            code: ErrorCode::CertificateExpired,
            reason: format!("certificate of {} outside its validity period", leaf.subject),
        });
    }

    let contract = AuthenticationContract {
        salt: &message.salt,
        hostname: config.hostname.as_deref(),
        inet_address: config.inet_address.as_deref(),
        challenge: &challenge,
        session_id: message.session_id.as_deref(),
        server_certificate: message.server_certificate.as_deref(),
    };
    if !leaf.verify(&contract.to_bytes(), &message.signature_value) {
        return Err(HandlerError::authorization("authentication signature invalid"));
    }

    if let Some(transaction_message) = &session.request_context.transaction_message {
        let signature = message
            .transaction_message_signature
            .as_deref()
            .ok_or_else(|| HandlerError::authorization("transaction message not signed"))?;
        if !leaf.verify(transaction_message.as_bytes(), signature) {
            return Err(HandlerError::authorization(
                "transaction message signature invalid",
            ));
        }
    }

    let authentication = ctx
        .capabilities
        .authentication
        .as_ref()
        .ok_or_else(|| HandlerError::Internal("no authentication service configured".into()))?;
    authentication.validate_certificate_chain(&message.certificate_chain)?;

    if session.request_context.include_identity {
        let identity = message
            .identity
            .ok_or_else(|| HandlerError::Internal("identity data missing".into()))?;
        identification::check_identity_data(ctx, &session.request_context, &identity)?;
        session.identity = Some(identity);
    }

    tracing::info!(
        session_id = %session.session_id,
        subject = %leaf.subject,
        "client authenticated"
    );
    session.authenticated_subject = Some(leaf.subject.clone());
    Ok(OutboundMessage::Finished(FinishedMessage::success()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::AuthenticationChallenge;
    use crate::config::ServiceConfig;
    use crate::messages::ProtocolState;
    use crate::providers::Capabilities;
    use crate::testing::{ScriptedAuthentication, TestCard};
    use eidgate_core::SessionId;
    use std::sync::Arc;

    struct Fixture {
        config: ServiceConfig,
        caps: Capabilities,
        session: ProtocolSession,
        card: TestCard,
    }

    impl Fixture {
        fn new(config: ServiceConfig, refusal: Option<ErrorCode>) -> Self {
            let mut session = ProtocolSession::new(SessionId::new("session-7"));
            session.state = ProtocolState::Authenticate;
            session.challenge = Some(AuthenticationChallenge::generate());
            Self {
                config,
                caps: Capabilities::new()
                    .with_authentication(Arc::new(ScriptedAuthentication { refusal })),
                session,
                card: TestCard::new("CN=Alice"),
            }
        }

        fn answer(&self, session_id: Option<Vec<u8>>) -> AuthenticationDataMessage {
            let challenge = self.session.challenge.as_ref().unwrap().value().to_vec();
            let salt = b"client-salt".to_vec();
            let contract = AuthenticationContract {
                salt: &salt,
                hostname: self.config.hostname.as_deref(),
                inet_address: self.config.inet_address.as_deref(),
                challenge: &challenge,
                session_id: session_id.as_deref(),
                server_certificate: None,
            };
            AuthenticationDataMessage {
                signature_value: self.card.sign(&contract.to_bytes()),
                salt,
                session_id,
                certificate_chain: vec![self.card.certificate.clone()],
                server_certificate: None,
                transaction_message_signature: None,
                identity: None,
            }
        }

        fn handle(&mut self, message: AuthenticationDataMessage) -> HandlerResult<OutboundMessage> {
            let ctx = HandlerContext {
                config: &self.config,
                capabilities: &self.caps,
            };
            handle_authentication_data(ctx, &mut self.session, message)
        }
    }

    #[test]
    fn test_valid_authentication() {
        let mut fx = Fixture::new(
            ServiceConfig {
                hostname: Some("eid.example".into()),
                ..ServiceConfig::default()
            },
            None,
        );
        let message = fx.answer(None);
        let out = fx.handle(message).unwrap();
        assert_eq!(out, OutboundMessage::Finished(FinishedMessage::success()));
        assert_eq!(fx.session.authenticated_subject.as_deref(), Some("CN=Alice"));
        assert!(fx.session.challenge.is_none());
    }

    #[test]
    fn test_challenge_is_single_use() {
        let mut fx = Fixture::new(ServiceConfig::default(), None);
        let message = fx.answer(None);
        fx.handle(message.clone()).unwrap();
        let err = fx.handle(message).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Authorization);
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let mut fx = Fixture::new(ServiceConfig::default(), None);
        let mut message = fx.answer(None);
        message.salt = b"other-salt".to_vec();
        assert_eq!(
            fx.handle(message).unwrap_err().error_code(),
            ErrorCode::Authorization
        );
    }

    #[test]
    fn test_mature_challenge_rejected() {
        let mut fx = Fixture::new(ServiceConfig::default(), None);
        let value = fx.session.challenge.as_ref().unwrap().value().to_vec();
        fx.session.challenge = Some(AuthenticationChallenge::with_issue_time(
            value,
            Timestamp::from_seconds(Timestamp::now().seconds_since_epoch - 301),
        ));
        let message = fx.answer(None);
        assert!(fx.handle(message).is_err());
    }

    #[test]
    fn test_session_channel_binding() {
        let config = ServiceConfig {
            session_id_channel_binding: true,
            ..ServiceConfig::default()
        };
        let mut fx = Fixture::new(config.clone(), None);
        let message = fx.answer(Some(b"other-session".to_vec()));
        assert!(fx.handle(message).is_err());

        let mut fx = Fixture::new(config, None);
        let message = fx.answer(Some(b"session-7".to_vec()));
        assert!(fx.handle(message).is_ok());
    }

    #[test]
    fn test_provider_refusal_code_propagates() {
        let mut fx = Fixture::new(ServiceConfig::default(), Some(ErrorCode::CertificateRevoked));
        let message = fx.answer(None);
        assert_eq!(
            fx.handle(message).unwrap_err().error_code(),
            ErrorCode::CertificateRevoked
        );
    }

    #[test]
    fn test_transaction_message_must_be_signed() {
        let mut fx = Fixture::new(ServiceConfig::default(), None);
        fx.session.request_context.transaction_message = Some("Pay 10".into());
        let mut message = fx.answer(None);
        assert!(fx.clone_session_then(|fx| fx.handle(message.clone())).is_err());

        message.transaction_message_signature = Some(fx.card.sign(b"Pay 10"));
        assert!(fx.handle(message).is_ok());
    }

    impl Fixture {
        /// Run `f` against a copy of the session so the challenge survives.
        fn clone_session_then<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
            let saved = self.session.clone();
            let result = f(self);
            self.session = saved;
            result
        }
    }
}
