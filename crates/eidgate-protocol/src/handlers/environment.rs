//! Client environment check and the insecure-continuation escape hatch.

use eidgate_core::ProviderError;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{routing, HandlerContext};
use crate::messages::{ClientEnvironmentMessage, InsecureClientMessage, OutboundMessage};
use crate::session::ProtocolSession;

pub fn handle_client_environment(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: ClientEnvironmentMessage,
) -> HandlerResult<OutboundMessage> {
    let environment = &message.environment;
    tracing::debug!(
        session_id = %session.session_id,
        os = %environment.os_name,
        os_version = %environment.os_version,
        readers = environment.readers.len(),
        "client environment"
    );

    if let Some(checker) = &ctx.capabilities.client_environment {
        match checker.check_client_environment(environment) {
            Ok(()) => {}
            Err(ProviderError::Refused { reason, .. }) => {
                tracing::info!(session_id = %session.session_id, %reason, "insecure client environment");
                return Ok(OutboundMessage::InsecureClient(InsecureClientMessage {
                    warn_only: ctx.config.insecure_client_warn_only,
                }));
            }
            Err(e) => return Err(e.into()),
        }
    }
    routing::next_request(ctx, session)
}

/// The user chose to continue after an insecure-client warning. Only legal
/// when the deployment merely warns.
pub fn handle_continue_insecure(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
) -> HandlerResult<OutboundMessage> {
    if !ctx.config.insecure_client_warn_only {
        return Err(HandlerError::authorization(
            "insecure clients may not continue",
        ));
    }
    tracing::info!(session_id = %session.session_id, "continuing with insecure client");
    routing::next_request(ctx, session)
}
