//! Protocol state store.
//!
//! A `ProtocolSession` is the explicit per-session state of one exchange,
//! owned by a [`SessionStore`] keyed by the transport session id. Only the
//! dispatcher writes a session back to the store, and only after a handler
//! fully returned.

use std::collections::HashMap;
use std::sync::Mutex;

use eidgate_core::{Certificate, SessionId, Timestamp};

use crate::challenge::AuthenticationChallenge;
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{IdentityDataMessage, ProtocolState};

// ---------------------------------------------------------------------------
// Session contents
// ---------------------------------------------------------------------------

/// Digest handed to the client in a sign request, awaiting its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDigest {
    pub algorithm: String,
    pub value: Vec<u8>,
}

/// What the current request asked the client to read from the card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub include_identity: bool,
    pub include_address: bool,
    pub include_photo: bool,
    pub include_certificates: bool,
    pub transaction_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProtocolSession {
    pub session_id: SessionId,
    pub state: ProtocolState,
    pub challenge: Option<AuthenticationChallenge>,
    /// Set exactly while the session waits for a SignatureDataMessage.
    pub pending_digest: Option<PendingDigest>,
    pub request_context: RequestContext,
    pub client_language: Option<String>,
    /// Signing chain collected by a SignCertificatesDataMessage.
    pub signing_certificate_chain: Vec<Certificate>,
    pub authenticated_subject: Option<String>,
    pub identity: Option<IdentityDataMessage>,
    pub created_at: Timestamp,
}

impl ProtocolSession {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: ProtocolState::Init,
            challenge: None,
            pending_digest: None,
            request_context: RequestContext::default(),
            client_language: None,
            signing_certificate_chain: Vec::new(),
            authenticated_subject: None,
            identity: None,
            created_at: Timestamp::now(),
        }
    }

    /// Move to the terminal failed state, dropping anything the session was
    /// waiting on.
    pub fn fail(&mut self) {
        self.state = ProtocolState::Failed;
        self.pending_digest = None;
        self.challenge = None;
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Key/value store of protocol sessions, scoped to the lifetime of the
/// underlying transport sessions.
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &SessionId) -> ProtocolResult<Option<ProtocolSession>>;

    fn put(&self, session: ProtocolSession) -> ProtocolResult<()>;

    fn remove(&self, session_id: &SessionId) -> ProtocolResult<Option<ProtocolSession>>;
}

/// Thread-safe in-memory session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, ProtocolSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.sessions.lock() {
            Ok(s) => s.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::SessionStore("lock poisoned".into())
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &SessionId) -> ProtocolResult<Option<ProtocolSession>> {
        let sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn put(&self, session: ProtocolSession) -> ProtocolResult<()> {
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    fn remove(&self, session_id: &SessionId) -> ProtocolResult<Option<ProtocolSession>> {
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions.remove(session_id))
    }
}
