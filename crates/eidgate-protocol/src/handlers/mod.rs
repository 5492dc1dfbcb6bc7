//! Handler set.
//!
//! One handler per inbound message type. Handlers work on typed message
//! values and a working copy of the session; they never see transport
//! framing and never commit state themselves.

pub mod authentication;
pub mod environment;
pub mod hello;
pub mod identification;
pub mod routing;
pub mod signature;

use crate::config::ServiceConfig;
use crate::error::HandlerResult;
use crate::messages::{InboundMessage, OutboundMessage};
use crate::providers::Capabilities;
use crate::session::ProtocolSession;

/// Deployment-wide inputs every handler may consult.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub config: &'a ServiceConfig,
    pub capabilities: &'a Capabilities,
}

/// Route an inbound message to its handler.
pub fn handle_message(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: InboundMessage,
) -> HandlerResult<OutboundMessage> {
    match message {
        InboundMessage::Hello(msg) => hello::handle_hello(ctx, session, msg),
        InboundMessage::ClientEnvironment(msg) => {
            environment::handle_client_environment(ctx, session, msg)
        }
        InboundMessage::ContinueInsecure => environment::handle_continue_insecure(ctx, session),
        InboundMessage::IdentityData(msg) => {
            identification::handle_identity_data(ctx, session, msg)
        }
        InboundMessage::AuthenticationData(msg) => {
            authentication::handle_authentication_data(ctx, session, msg)
        }
        InboundMessage::SignatureData(msg) => signature::handle_signature_data(ctx, session, msg),
        InboundMessage::FileDigestsData(msg) => {
            signature::handle_file_digests_data(ctx, session, msg)
        }
        InboundMessage::SignCertificatesData(msg) => {
            signature::handle_sign_certificates_data(ctx, session, msg)
        }
    }
}
