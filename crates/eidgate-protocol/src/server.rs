//! ProtocolServer: the dispatcher bound to a session store.
//!
//! Serialises all calls for one session behind a per-session lock. A
//! second call arriving while the first is still running fails fast with
//! `SessionBusy`; calls for different sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use eidgate_core::SessionId;

use crate::codec;
use crate::dispatcher::Dispatcher;
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{InboundMessage, OutboundMessage};
use crate::session::{ProtocolSession, SessionStore};

pub struct ProtocolServer<S: SessionStore> {
    dispatcher: Dispatcher,
    store: S,
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl<S: SessionStore> ProtocolServer<S> {
    pub fn new(dispatcher: Dispatcher, store: S) -> Self {
        Self {
            dispatcher,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn session_lock(&self, session_id: &SessionId) -> ProtocolResult<Arc<Mutex<()>>> {
        let mut locks = self.lock_table()?;
        Ok(locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn lock_table(&self) -> ProtocolResult<MutexGuard<'_, HashMap<SessionId, Arc<Mutex<()>>>>> {
        self.locks
            .lock()
            .map_err(|_| ProtocolError::SessionStore("lock table poisoned".into()))
    }

    /// Take the per-session lock without waiting.
    ///
    /// A lock that was dropped from the table while we waited for it belongs
    /// to a finished session; a newer call may already hold its successor.
    fn acquire<'a>(
        &self,
        session_id: &SessionId,
        lock: &'a Mutex<()>,
    ) -> ProtocolResult<MutexGuard<'a, ()>> {
        let guard = match lock.try_lock() {
            Ok(guard) => guard,
            // The lock guards no data of its own.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::warn!(session_id = %session_id, "concurrent request on busy session");
                return Err(ProtocolError::SessionBusy);
            }
        };
        let current = self
            .lock_table()?
            .get(session_id)
            .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), lock));
        if !current {
            tracing::warn!(session_id = %session_id, "session ended while request waited");
            return Err(ProtocolError::SessionBusy);
        }
        Ok(guard)
    }

    fn forget_lock(&self, session_id: &SessionId) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(session_id);
        }
    }

    /// Release everything kept for a session that is over.
    fn close(&self, session_id: &SessionId) {
        if let Some(signature) = self.dispatcher.capabilities().signature.as_ref() {
            if let Err(e) = signature.abort(session_id) {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "could not discard pending signature"
                );
            }
        }
        self.forget_lock(session_id);
    }

    /// Handle one typed inbound message for the given transport session.
    pub fn handle(
        &self,
        session_id: &SessionId,
        message: InboundMessage,
    ) -> ProtocolResult<OutboundMessage> {
        let lock = self.session_lock(session_id)?;
        let _guard = self.acquire(session_id, &lock)?;

        let existing = self.store.get(session_id);
        let (mut session, is_new) = match existing {
            Ok(Some(session)) => (session, false),
            Ok(None) => (ProtocolSession::new(session_id.clone()), true),
            Err(e) => {
                self.forget_lock(session_id);
                return Err(e);
            }
        };

        let outbound = match self.dispatcher.dispatch(&mut session, message) {
            Ok(outbound) => outbound,
            Err(e) => {
                // A rejected first message leaves nothing behind.
                if is_new {
                    self.forget_lock(session_id);
                }
                return Err(e);
            }
        };
        if is_new {
            tracing::debug!(session_id = %session_id, "new session");
        }

        if self
            .dispatcher
            .catalog()
            .is_session_stop(outbound.message_type())
        {
            tracing::debug!(
                session_id = %session_id,
                state = %session.state,
                "session finished"
            );
            self.store.remove(session_id)?;
            self.close(session_id);
        } else {
            self.store.put(session)?;
        }
        Ok(outbound)
    }

    /// Byte-level entry point: decode, dispatch, encode.
    pub fn handle_bytes(&self, session_id: &SessionId, bytes: &[u8]) -> ProtocolResult<Vec<u8>> {
        let message = codec::decode_inbound(bytes)?;
        let outbound = self.handle(session_id, message)?;
        codec::encode_outbound(&outbound)
    }

    /// The transport session ended. Returns whether a protocol session was
    /// still open.
    ///
    /// Fails with `SessionBusy` while a request for the session is running.
    pub fn expire(&self, session_id: &SessionId) -> ProtocolResult<bool> {
        let lock = self.session_lock(session_id)?;
        let _guard = self.acquire(session_id, &lock)?;
        let removed = self.store.remove(session_id)?.is_some();
        self.close(session_id);
        if removed {
            tracing::info!(session_id = %session_id, "session expired before finishing");
        }
        Ok(removed)
    }

    /// Number of sessions holding a lock entry.
    pub fn tracked_sessions(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::messages::{HelloMessage, ProtocolState, SignatureDataMessage};
    use crate::providers::Capabilities;
    use crate::session::InMemorySessionStore;
    use crate::testing::{ScriptedSignature, TestCard, SCRIPTED_DIGEST};
    use eidgate_core::{
        Certificate, DigestInfo, ErrorCode, PreSignRequest, ProviderResult, SignatureService,
    };
    use std::sync::Barrier;

    fn server(caps: Capabilities) -> ProtocolServer<InMemorySessionStore> {
        let dispatcher = Dispatcher::new(ServiceConfig::default(), caps).unwrap();
        ProtocolServer::new(dispatcher, InMemorySessionStore::new())
    }

    fn hello() -> InboundMessage {
        InboundMessage::Hello(HelloMessage::default())
    }

    #[test]
    fn test_session_created_and_removed_on_finish() {
        let server = server(
            Capabilities::new().with_signature(Arc::new(ScriptedSignature::default())),
        );
        let id = SessionId::new("s-1");
        let card = TestCard::new("CN=Alice");

        server.handle(&id, hello()).unwrap();
        let stored = server.store().get(&id).unwrap().unwrap();
        assert_eq!(stored.state, ProtocolState::Sign);

        let out = server
            .handle(
                &id,
                InboundMessage::SignatureData(SignatureDataMessage {
                    signature_value: card.sign(&SCRIPTED_DIGEST),
                    certificate_chain: vec![card.certificate.clone()],
                }),
            )
            .unwrap();
        assert_eq!(out.error_code(), None);
        assert!(server.store().get(&id).unwrap().is_none());
    }

    #[test]
    fn test_rejected_first_message_does_not_create_session() {
        let server = server(Capabilities::new());
        let id = SessionId::new("s-1");
        let card = TestCard::new("CN=Alice");
        let err = server
            .handle(
                &id,
                InboundMessage::SignatureData(SignatureDataMessage {
                    signature_value: card.sign(b"x"),
                    certificate_chain: vec![card.certificate.clone()],
                }),
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::IllegalProtocolState { .. }));
        assert!(server.store().is_empty());
    }

    #[test]
    fn test_refusal_ends_session() {
        let server = server(Capabilities::new().with_signature(Arc::new(ScriptedSignature {
            refuse: true,
            ..ScriptedSignature::default()
        })));
        let id = SessionId::new("s-1");
        let out = server.handle(&id, hello()).unwrap();
        assert_eq!(out.error_code(), Some(ErrorCode::Authorization));
        assert!(server.store().is_empty());
    }

    #[test]
    fn test_expire_removes_session() {
        let server = server(
            Capabilities::new().with_signature(Arc::new(ScriptedSignature::default())),
        );
        let id = SessionId::new("s-1");
        server.handle(&id, hello()).unwrap();
        assert!(server.expire(&id).unwrap());
        assert!(!server.expire(&id).unwrap());
        // A new exchange may start on the same transport id afterwards.
        assert!(server.handle(&id, hello()).is_ok());
    }

    #[test]
    fn test_rejected_first_messages_leave_no_lock_entries() {
        let server = server(Capabilities::new());
        let card = TestCard::new("CN=Alice");
        for n in 0..100 {
            let id = SessionId::new(format!("s-{}", n));
            let result = server.handle(
                &id,
                InboundMessage::SignatureData(SignatureDataMessage {
                    signature_value: card.sign(b"x"),
                    certificate_chain: vec![card.certificate.clone()],
                }),
            );
            assert!(result.is_err());
        }
        assert!(server.store().is_empty());
        assert_eq!(server.tracked_sessions(), 0);
    }

    #[test]
    fn test_refused_signature_releases_pending_signature() {
        let signature = Arc::new(ScriptedSignature::default());
        let server = server(Capabilities::new().with_signature(signature.clone()));
        let id = SessionId::new("s-1");
        let card = TestCard::new("CN=Alice");

        server.handle(&id, hello()).unwrap();
        let out = server
            .handle(
                &id,
                InboundMessage::SignatureData(SignatureDataMessage {
                    signature_value: card.sign(b"not the digest"),
                    certificate_chain: vec![card.certificate.clone()],
                }),
            )
            .unwrap();
        assert_eq!(out.error_code(), Some(ErrorCode::Authorization));
        assert!(server.store().is_empty());
        assert_eq!(server.tracked_sessions(), 0);
        assert!(signature.abort_calls.lock().unwrap().contains(&id));
    }

    #[test]
    fn test_expire_releases_pending_signature() {
        let signature = Arc::new(ScriptedSignature::default());
        let server = server(Capabilities::new().with_signature(signature.clone()));
        let id = SessionId::new("s-1");

        server.handle(&id, hello()).unwrap();
        assert!(server.expire(&id).unwrap());
        assert_eq!(*signature.abort_calls.lock().unwrap(), vec![id]);
        assert_eq!(server.tracked_sessions(), 0);
    }

    #[test]
    fn test_handle_bytes() {
        let server = server(Capabilities::new());
        let id = SessionId::new("s-1");
        let out = server
            .handle_bytes(&id, br#"{"type":"HelloMessage","language":"en"}"#)
            .unwrap();
        let decoded = codec::decode_outbound(&out).unwrap();
        assert!(matches!(decoded, OutboundMessage::IdentificationRequest(_)));

        let err = server.handle_bytes(&id, b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(_)));
    }

    /// Blocks inside pre-sign for the session named "slow" until released.
    struct GatedSignature {
        entered: Barrier,
        release: Barrier,
    }

    impl SignatureService for GatedSignature {
        fn files_digest_algorithm(&self) -> Option<String> {
            None
        }

        fn pre_sign(&self, request: &PreSignRequest) -> ProviderResult<DigestInfo> {
            if request.session_id.as_str() == "slow" {
                self.entered.wait();
                self.release.wait();
            }
            Ok(DigestInfo {
                description: "doc".into(),
                digest_algorithm: "SHA-256".into(),
                digest_value: vec![1; 32],
            })
        }

        fn post_sign(
            &self,
            _session_id: &SessionId,
            _signature_value: &[u8],
            _certificate_chain: &[Certificate],
        ) -> ProviderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_call_on_same_session_is_busy() {
        let gate = Arc::new(GatedSignature {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        let server = Arc::new(server(Capabilities::new().with_signature(gate.clone())));

        let background = {
            let server = server.clone();
            std::thread::spawn(move || server.handle(&SessionId::new("slow"), hello()))
        };

        gate.entered.wait();
        let err = server
            .handle(&SessionId::new("slow"), hello())
            .unwrap_err();
        assert_eq!(err, ProtocolError::SessionBusy);

        // Other sessions are not held up.
        assert!(server.handle(&SessionId::new("fast"), hello()).is_ok());

        gate.release.wait();
        let out = background.join().unwrap().unwrap();
        assert!(matches!(out, OutboundMessage::SignRequest(_)));
    }
    #[test]
    fn test_expire_during_request_is_busy() {
        let gate = Arc::new(GatedSignature {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        let server = Arc::new(server(Capabilities::new().with_signature(gate.clone())));
        let id = SessionId::new("slow");

        let background = {
            let server = server.clone();
            std::thread::spawn(move || server.handle(&SessionId::new("slow"), hello()))
        };

        gate.entered.wait();
        assert_eq!(server.expire(&id).unwrap_err(), ProtocolError::SessionBusy);

        gate.release.wait();
        background.join().unwrap().unwrap();
        // The in-flight request committed; expiring now removes it for good.
        assert_eq!(
            server.store().get(&id).unwrap().map(|s| s.state),
            Some(ProtocolState::Sign)
        );
        assert!(server.expire(&id).unwrap());
        assert!(server.store().is_empty());
        assert_eq!(server.tracked_sessions(), 0);
    }
}
