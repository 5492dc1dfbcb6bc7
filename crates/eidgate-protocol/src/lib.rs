//! eID gateway protocol engine.
//!
//! Drives the challenge/response exchange between a card-reading client
//! and the relying-party service.
//!
//! # Architecture
//!
//! Every inbound message passes the same sequence:
//!
//! ```text
//! decode -> Catalog admission -> Handler (working copy) -> commit + transition -> encode
//! ```
//!
//! The [`catalog`] describes each message type declaratively: whether it
//! starts or stops a session, which state it requires and which state it
//! leads to. The [`dispatcher`] enforces those rules, runs the handler and
//! commits the session only after the handler returned. The [`server`]
//! binds the dispatcher to a [`session::SessionStore`] and serialises calls
//! per session.
//!
//! # Capability providers
//!
//! Authentication, identity, privacy, signing, secure-reader,
//! identity-integrity and client-environment providers are injected as a
//! [`providers::Capabilities`] value. Which of them are configured decides
//! the branch of the protocol a session follows.

pub mod catalog;
pub mod challenge;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod providers;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{standard_catalog, EidCatalog, MessageCatalog, MessageDescriptor};
pub use challenge::{AuthenticationChallenge, AuthenticationContract, LEGAL_NOTICE};
pub use codec::{decode_inbound, decode_outbound, encode_inbound, encode_outbound};
pub use config::ServiceConfig;
pub use dispatcher::{Dispatcher, SECURITY_TARGET};
pub use error::{HandlerError, HandlerResult, ProtocolError, ProtocolResult};
pub use messages::*;
pub use providers::Capabilities;
pub use server::ProtocolServer;
pub use session::{InMemorySessionStore, PendingDigest, ProtocolSession, RequestContext, SessionStore};
