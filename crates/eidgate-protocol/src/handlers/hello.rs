use crate::error::HandlerResult;
use crate::handlers::{routing, HandlerContext};
use crate::messages::{HelloMessage, OutboundMessage};
use crate::session::ProtocolSession;

/// Start of every exchange. Records the client language and either asks
/// for the client environment or routes straight to the operation.
pub fn handle_hello(
    ctx: HandlerContext<'_>,
    session: &mut ProtocolSession,
    message: HelloMessage,
) -> HandlerResult<OutboundMessage> {
    tracing::debug!(
        session_id = %session.session_id,
        language = message.language.as_deref().unwrap_or("-"),
        "hello"
    );
    session.client_language = message.language;

    if ctx.capabilities.client_environment.is_some() {
        return Ok(OutboundMessage::CheckClient);
    }
    routing::next_request(ctx, session)
}
