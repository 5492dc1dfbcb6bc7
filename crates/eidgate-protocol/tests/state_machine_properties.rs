//! Property-based tests for the protocol state machine
//!
//! Uses proptest to drive random message sequences through the dispatcher
//! and checks that state only ever moves along declared transitions.

use std::fmt;
use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use eidgate_core::{
    AuthenticationService, Certificate, ClientEnvironment, DigestInfo, ErrorCode, FileDigest,
    PreSignRequest, ProviderResult, SessionId, SignatureService, Timestamp,
};
use eidgate_protocol::{
    AuthenticationDataMessage, Capabilities, ClientEnvironmentMessage, Dispatcher,
    FileDigestsDataMessage, HelloMessage, IdentityDataMessage, InboundMessage, MessageCatalog,
    MessageDescriptor, MessageType, OutboundMessage, ProtocolError, ProtocolSession,
    ProtocolState, ServiceConfig, SignCertificatesDataMessage, SignatureDataMessage,
};
use proptest::prelude::*;
use rand::rngs::OsRng;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct AlwaysSign;

impl SignatureService for AlwaysSign {
    fn files_digest_algorithm(&self) -> Option<String> {
        None
    }

    fn pre_sign(&self, _request: &PreSignRequest) -> ProviderResult<DigestInfo> {
        Ok(DigestInfo {
            description: "doc".into(),
            digest_algorithm: "SHA-256".into(),
            digest_value: vec![3; 32],
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

struct AcceptAll;

impl AuthenticationService for AcceptAll {
    fn validate_certificate_chain(&self, _chain: &[Certificate]) -> ProviderResult<()> {
        Ok(())
    }
}

fn certificate(key: &SigningKey) -> Certificate {
    let now = Timestamp::now().seconds_since_epoch;
    Certificate {
        subject: "CN=Prop".into(),
        issuer: "CN=CA".into(),
        public_key: key.verifying_key().to_bytes().to_vec(),
        not_before: Timestamp::from_seconds(now - 60),
        not_after: Timestamp::from_seconds(now + 60),
    }
}

/// A syntactically valid instance of every inbound message type.
fn sample(message_type: MessageType, key: &SigningKey) -> InboundMessage {
    let chain = vec![certificate(key)];
    match message_type {
        MessageType::Hello => InboundMessage::Hello(HelloMessage::default()),
        MessageType::ClientEnvironment => {
            InboundMessage::ClientEnvironment(ClientEnvironmentMessage {
                environment: ClientEnvironment::default(),
            })
        }
        MessageType::ContinueInsecure => InboundMessage::ContinueInsecure,
        MessageType::IdentityData => InboundMessage::IdentityData(IdentityDataMessage {
            identity_file: b"id".to_vec(),
            ..IdentityDataMessage::default()
        }),
        MessageType::AuthenticationData => {
            InboundMessage::AuthenticationData(AuthenticationDataMessage {
                salt: vec![1; 4],
                session_id: None,
                signature_value: key.sign(b"not the contract").to_bytes().to_vec(),
                certificate_chain: chain,
                server_certificate: None,
                transaction_message_signature: None,
                identity: None,
            })
        }
        MessageType::SignatureData => InboundMessage::SignatureData(SignatureDataMessage {
            signature_value: key.sign(&[3; 32]).to_bytes().to_vec(),
            certificate_chain: chain,
        }),
        MessageType::FileDigestsData => InboundMessage::FileDigestsData(FileDigestsDataMessage {
            file_digests: vec![FileDigest {
                description: "a".into(),
                digest_algorithm: "SHA-256".into(),
                digest_value: vec![0; 32],
            }],
        }),
        MessageType::SignCertificatesData => {
            InboundMessage::SignCertificatesData(SignCertificatesDataMessage {
                certificate_chain: chain,
            })
        }
        other => panic!("{} is not inbound", other),
    }
}

fn inbound_types() -> Vec<MessageType> {
    MessageType::ALL
        .iter()
        .copied()
        .filter(MessageType::is_inbound)
        .collect()
}

fn dispatcher(with_signature: bool) -> Dispatcher {
    let mut caps = Capabilities::new();
    if with_signature {
        caps = caps.with_signature(Arc::new(AlwaysSign));
    } else {
        caps = caps.with_authentication(Arc::new(AcceptAll));
    }
    Dispatcher::new(ServiceConfig::default(), caps).unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_state_moves_only_along_declared_transitions(
        picks in prop::collection::vec(0usize..8, 1..16),
        with_signature in any::<bool>(),
    ) {
        let dispatcher = dispatcher(with_signature);
        let key = SigningKey::generate(&mut OsRng);
        let types = inbound_types();
        let mut session = ProtocolSession::new(SessionId::new("prop"));

        for pick in picks {
            let inbound = types[pick % types.len()];
            let before = session.state;
            match dispatcher.dispatch(&mut session, sample(inbound, &key)) {
                Err(_) => prop_assert_eq!(session.state, before),
                Ok(out) => match out.error_code() {
                    Some(ErrorCode::Generic) => prop_assert_eq!(session.state, before),
                    Some(_) => prop_assert_eq!(session.state, ProtocolState::Failed),
                    None => prop_assert_eq!(
                        session.state,
                        dispatcher
                            .catalog()
                            .next_state(before, inbound, Some(out.message_type()))
                    ),
                },
            }
            // A digest is pending exactly while a signature is awaited.
            if session.pending_digest.is_some() {
                prop_assert_eq!(session.state, ProtocolState::Sign);
            }
        }
    }

    #[test]
    fn test_required_prior_state_is_enforced(
        state_index in 0usize..ProtocolState::ALL.len(),
        type_index in 0usize..8,
    ) {
        let dispatcher = dispatcher(true);
        let key = SigningKey::generate(&mut OsRng);
        let state = ProtocolState::ALL[state_index];
        let inbound = inbound_types()[type_index];
        let descriptor = dispatcher.catalog().describe(inbound).unwrap().clone();

        let mut session = ProtocolSession::new(SessionId::new("prop"));
        session.state = state;
        let result = dispatcher.dispatch(&mut session, sample(inbound, &key));

        match descriptor.required_prior_state {
            Some(required) if required != state => {
                let is_illegal_state = matches!(result, Err(ProtocolError::IllegalProtocolState { .. }));
                prop_assert!(is_illegal_state);
                prop_assert_eq!(session.state, state);
            }
            Some(_) => {
                let admitted = !matches!(result, Err(ProtocolError::IllegalProtocolState { .. }));
                prop_assert!(admitted);
            }
            None => {}
        }
    }
}

// ---------------------------------------------------------------------------
// A minimal three-message protocol over the generic catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Msg {
    Hello,
    AuthRequest,
    Finished,
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Negotiating,
    AuthPending,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn three_message_catalog() -> MessageCatalog<Msg, Phase> {
    let mut catalog = MessageCatalog::new();
    catalog
        .register(
            MessageDescriptor::new(Msg::Hello)
                .session_start()
                .transitions_to(Phase::Negotiating)
                .responds_with([Msg::AuthRequest]),
        )
        .unwrap();
    catalog
        .register(
            MessageDescriptor::new(Msg::AuthRequest)
                .requires(Phase::Negotiating)
                .transitions_to(Phase::AuthPending)
                .responds_with([Msg::Finished]),
        )
        .unwrap();
    catalog
        .register(
            MessageDescriptor::new(Msg::Finished)
                .session_stop()
                .requires(Phase::AuthPending),
        )
        .unwrap();
    catalog.validate().unwrap();
    catalog
}

/// Admit and apply one message the way the dispatcher does.
fn step(catalog: &MessageCatalog<Msg, Phase>, state: &mut Phase, msg: Msg) -> Result<(), ProtocolError> {
    catalog.admit(msg, *state, Phase::Idle)?;
    *state = catalog.next_state(*state, msg, None);
    Ok(())
}

#[test]
fn test_three_message_exchange_succeeds() {
    let catalog = three_message_catalog();
    let mut state = Phase::Idle;
    step(&catalog, &mut state, Msg::Hello).unwrap();
    assert_eq!(state, Phase::Negotiating);
    step(&catalog, &mut state, Msg::AuthRequest).unwrap();
    assert_eq!(state, Phase::AuthPending);
    step(&catalog, &mut state, Msg::Finished).unwrap();
    assert!(catalog.is_session_stop(Msg::Finished));
}

#[test]
fn test_auth_request_before_hello_is_illegal() {
    let catalog = three_message_catalog();
    let mut state = Phase::Idle;
    let err = step(&catalog, &mut state, Msg::AuthRequest).unwrap_err();
    assert!(matches!(err, ProtocolError::IllegalProtocolState { .. }));
    assert_eq!(state, Phase::Idle);
}

#[test]
fn test_second_start_descriptor_fails() {
    let mut catalog = three_message_catalog();
    let mut fresh = MessageCatalog::<Msg, Phase>::new();
    fresh
        .register(MessageDescriptor::new(Msg::Finished).session_start())
        .unwrap();
    assert!(matches!(
        fresh.register(MessageDescriptor::new(Msg::Hello).session_start()),
        Err(ProtocolError::DuplicateStartMessage { .. })
    ));
    assert!(matches!(
        catalog.register(MessageDescriptor::new(Msg::Hello)),
        Err(ProtocolError::DuplicateDescriptor(_))
    ));
}
