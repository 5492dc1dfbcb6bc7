//! Dispatcher.
//!
//! Validates an inbound message against the catalog and the session's
//! current state, runs its handler on a working copy of the session and
//! commits the copy plus the declared state transition only once the
//! handler has fully returned.

use std::sync::Arc;

use eidgate_core::ErrorCode;

use crate::catalog::{standard_catalog, EidCatalog};
use crate::config::ServiceConfig;
use crate::error::{HandlerError, ProtocolError, ProtocolResult};
use crate::handlers::{self, HandlerContext};
use crate::messages::{FinishedMessage, InboundMessage, OutboundMessage, ProtocolState};
use crate::providers::Capabilities;
use crate::session::ProtocolSession;

/// Log target for rejections that indicate a client stepping outside the
/// protocol.
pub const SECURITY_TARGET: &str = "eidgate::security";

pub struct Dispatcher {
    catalog: Arc<EidCatalog>,
    config: ServiceConfig,
    capabilities: Capabilities,
}

impl Dispatcher {
    /// Build a dispatcher over the standard eID catalog.
    pub fn new(config: ServiceConfig, capabilities: Capabilities) -> ProtocolResult<Self> {
        Self::with_catalog(Arc::new(standard_catalog()?), config, capabilities)
    }

    pub fn with_catalog(
        catalog: Arc<EidCatalog>,
        config: ServiceConfig,
        capabilities: Capabilities,
    ) -> ProtocolResult<Self> {
        config.validate()?;
        catalog.validate()?;
        Ok(Self {
            catalog,
            config,
            capabilities,
        })
    }

    pub fn catalog(&self) -> &EidCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Handle one inbound message for `session`.
    ///
    /// Protocol violations are returned as errors and leave the session
    /// untouched. Handler failures become a terminal FinishedMessage with an
    /// error code; a refusal additionally moves the session to `Failed`.
    pub fn dispatch(
        &self,
        session: &mut ProtocolSession,
        message: InboundMessage,
    ) -> ProtocolResult<OutboundMessage> {
        let inbound = message.message_type();
        if let Err(e) = self
            .catalog
            .admit(inbound, session.state, ProtocolState::Init)
        {
            log_rejection(session, &e);
            return Err(e);
        }

        let mut working = session.clone();
        let ctx = HandlerContext {
            config: &self.config,
            capabilities: &self.capabilities,
        };

        match handlers::handle_message(ctx, &mut working, message) {
            Ok(outbound) => {
                let response = outbound.message_type();
                if !self.catalog.response_permitted(inbound, response) {
                    tracing::error!(
                        session_id = %session.session_id,
                        message = %inbound,
                        response = %response,
                        "handler produced a response its descriptor does not allow"
                    );
                }
                working.state = self.catalog.next_state(session.state, inbound, Some(response));
                tracing::debug!(
                    session_id = %session.session_id,
                    message = %inbound,
                    response = %response,
                    from = %session.state,
                    to = %working.state,
                    "message handled"
                );
                *session = working;
                Ok(outbound)
            }
            Err(HandlerError::Refused { code, reason }) => {
                tracing::info!(
                    session_id = %session.session_id,
                    message = %inbound,
                    code = %code,
                    %reason,
                    "request refused"
                );
                session.fail();
                Ok(OutboundMessage::Finished(FinishedMessage::error(code)))
            }
            Err(HandlerError::Internal(detail)) => {
                tracing::error!(
                    session_id = %session.session_id,
                    message = %inbound,
                    %detail,
                    "handler failed"
                );
                // One-shot material the handler consumed stays consumed.
                session.challenge = working.challenge.take();
                session.pending_digest = working.pending_digest.take();
                Ok(OutboundMessage::Finished(FinishedMessage::error(
                    ErrorCode::Generic,
                )))
            }
        }
    }
}

fn log_rejection(session: &ProtocolSession, error: &ProtocolError) {
    if error.is_security_relevant() {
        tracing::warn!(
            target: SECURITY_TARGET,
            session_id = %session.session_id,
            state = %session.state,
            rejection = error.rejection_code(),
            error = %error,
            "protocol violation"
        );
    } else {
        tracing::debug!(
            session_id = %session.session_id,
            error = %error,
            "message rejected"
        );
    }
}
