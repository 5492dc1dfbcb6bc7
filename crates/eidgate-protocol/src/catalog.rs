//! Message catalog.
//!
//! A statically built registry of every message type and its declarative
//! constraints. The catalog is assembled once at start-up, validated, and
//! only read afterwards, so it can be shared between threads behind an
//! `Arc` without locking.
//!
//! The catalog is generic over the message-type key and the protocol
//! state so the same legality rules can describe any fixed message set;
//! [`standard_catalog`] builds the eID protocol's.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{MessageType, ProtocolState};

// ---------------------------------------------------------------------------
// MessageDescriptor
// ---------------------------------------------------------------------------

/// Static metadata describing one message type's legality and effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor<K, S> {
    pub message_type: K,
    pub is_session_start: bool,
    pub is_session_stop: bool,
    /// The message is illegal unless the session is in exactly this state.
    pub required_prior_state: Option<S>,
    /// Response types a handler of this message may emit.
    pub allowed_response_types: BTreeSet<K>,
    /// State the session moves to once this message has been handled.
    pub resulting_state: Option<S>,
}

impl<K: Ord, S> MessageDescriptor<K, S> {
    pub fn new(message_type: K) -> Self {
        Self {
            message_type,
            is_session_start: false,
            is_session_stop: false,
            required_prior_state: None,
            allowed_response_types: BTreeSet::new(),
            resulting_state: None,
        }
    }

    pub fn session_start(mut self) -> Self {
        self.is_session_start = true;
        self
    }

    pub fn session_stop(mut self) -> Self {
        self.is_session_stop = true;
        self
    }

    pub fn requires(mut self, state: S) -> Self {
        self.required_prior_state = Some(state);
        self
    }

    pub fn transitions_to(mut self, state: S) -> Self {
        self.resulting_state = Some(state);
        self
    }

    pub fn responds_with(mut self, responses: impl IntoIterator<Item = K>) -> Self {
        self.allowed_response_types.extend(responses);
        self
    }
}

// ---------------------------------------------------------------------------
// MessageCatalog
// ---------------------------------------------------------------------------

pub struct MessageCatalog<K, S> {
    descriptors: HashMap<K, MessageDescriptor<K, S>>,
    /// Registration order, for deterministic iteration.
    order: Vec<K>,
    start_message: Option<K>,
}

impl<K, S> Default for MessageCatalog<K, S> {
    fn default() -> Self {
        Self {
            descriptors: HashMap::new(),
            order: Vec::new(),
            start_message: None,
        }
    }
}

impl<K, S> MessageCatalog<K, S>
where
    K: Copy + Eq + Hash + Ord + Display + Debug,
    S: Copy + Eq + Display + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Fails fast on a second session-start message
    /// or a second descriptor for the same type.
    pub fn register(&mut self, descriptor: MessageDescriptor<K, S>) -> ProtocolResult<()> {
        let key = descriptor.message_type;
        if self.descriptors.contains_key(&key) {
            return Err(ProtocolError::DuplicateDescriptor(key.to_string()));
        }
        if descriptor.is_session_start {
            if let Some(existing) = self.start_message {
                return Err(ProtocolError::DuplicateStartMessage {
                    existing: existing.to_string(),
                    rejected: key.to_string(),
                });
            }
            self.start_message = Some(key);
        }
        self.order.push(key);
        self.descriptors.insert(key, descriptor);
        Ok(())
    }

    pub fn describe(&self, message_type: K) -> ProtocolResult<&MessageDescriptor<K, S>> {
        self.descriptors
            .get(&message_type)
            .ok_or_else(|| ProtocolError::UnknownMessageType(message_type.to_string()))
    }

    /// Check that every allowed response type is itself registered.
    pub fn validate(&self) -> ProtocolResult<()> {
        for descriptor in self.iter() {
            for response in &descriptor.allowed_response_types {
                if !self.descriptors.contains_key(response) {
                    return Err(ProtocolError::UnregisteredResponse {
                        message: descriptor.message_type.to_string(),
                        response: response.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Decide whether `message_type` may be handled by a session currently
    /// in `current`, with `initial` being a fresh session's state.
    ///
    /// Performs the legality checks in order: known type, required prior
    /// state, and session-start on a session that already progressed.
    pub fn admit(
        &self,
        message_type: K,
        current: S,
        initial: S,
    ) -> ProtocolResult<&MessageDescriptor<K, S>> {
        let descriptor = self.describe(message_type)?;
        if let Some(required) = descriptor.required_prior_state {
            if required != current {
                return Err(ProtocolError::IllegalProtocolState {
                    message: message_type.to_string(),
                    expected: required.to_string(),
                    actual: current.to_string(),
                });
            }
        }
        if descriptor.is_session_start && current != initial {
            return Err(ProtocolError::SessionAlreadyStarted(current.to_string()));
        }
        Ok(descriptor)
    }

    /// State after `inbound` was handled and answered with `outbound`.
    ///
    /// The inbound descriptor's resulting state applies first, then the
    /// response's; absent both, the state is unchanged.
    pub fn next_state(&self, current: S, inbound: K, outbound: Option<K>) -> S {
        let after_inbound = self
            .descriptors
            .get(&inbound)
            .and_then(|d| d.resulting_state)
            .unwrap_or(current);
        outbound
            .and_then(|o| self.descriptors.get(&o))
            .and_then(|d| d.resulting_state)
            .unwrap_or(after_inbound)
    }

    pub fn response_permitted(&self, inbound: K, outbound: K) -> bool {
        self.descriptors
            .get(&inbound)
            .map(|d| d.allowed_response_types.contains(&outbound))
            .unwrap_or(false)
    }

    pub fn is_session_stop(&self, message_type: K) -> bool {
        self.descriptors
            .get(&message_type)
            .map(|d| d.is_session_stop)
            .unwrap_or(false)
    }

    pub fn start_message(&self) -> Option<K> {
        self.start_message
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageDescriptor<K, S>> {
        self.order.iter().filter_map(|k| self.descriptors.get(k))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// The eID protocol catalog
// ---------------------------------------------------------------------------

pub type EidCatalog = MessageCatalog<MessageType, ProtocolState>;
pub type EidDescriptor = MessageDescriptor<MessageType, ProtocolState>;

/// Responses any request-routing message (hello and the environment
/// check follow-ups) may produce.
const ROUTING_RESPONSES: [MessageType; 7] = [
    MessageType::Administration,
    MessageType::FilesDigestRequest,
    MessageType::SignCertificatesRequest,
    MessageType::SignRequest,
    MessageType::AuthenticationRequest,
    MessageType::IdentificationRequest,
    MessageType::Finished,
];

/// Build and validate the catalog of the eID protocol.
pub fn standard_catalog() -> ProtocolResult<EidCatalog> {
    use MessageType as M;
    use ProtocolState as S;

    let mut catalog = EidCatalog::new();

    // Inbound
    catalog.register(
        EidDescriptor::new(M::Hello)
            .session_start()
            .responds_with([M::CheckClient])
            .responds_with(ROUTING_RESPONSES),
    )?;
    catalog.register(
        EidDescriptor::new(M::ClientEnvironment)
            .requires(S::EnvCheck)
            .responds_with([M::InsecureClient])
            .responds_with(ROUTING_RESPONSES),
    )?;
    catalog.register(
        EidDescriptor::new(M::ContinueInsecure)
            .requires(S::EnvCheck)
            .responds_with(ROUTING_RESPONSES),
    )?;
    catalog.register(
        EidDescriptor::new(M::FileDigestsData)
            .requires(S::Digest)
            .responds_with([M::SignRequest, M::Finished]),
    )?;
    catalog.register(
        EidDescriptor::new(M::SignCertificatesData)
            .requires(S::SignCerts)
            .responds_with([M::SignRequest, M::Finished]),
    )?;
    catalog.register(
        EidDescriptor::new(M::SignatureData)
            .requires(S::Sign)
            .responds_with([M::Finished]),
    )?;
    catalog.register(
        EidDescriptor::new(M::AuthenticationData)
            .requires(S::Authenticate)
            .responds_with([M::Finished]),
    )?;
    catalog.register(
        EidDescriptor::new(M::IdentityData)
            .requires(S::Identify)
            .responds_with([M::Finished]),
    )?;

    // Outbound
    catalog.register(EidDescriptor::new(M::CheckClient).transitions_to(S::EnvCheck))?;
    catalog.register(EidDescriptor::new(M::InsecureClient).transitions_to(S::EnvCheck))?;
    catalog.register(
        EidDescriptor::new(M::Administration)
            .session_stop()
            .transitions_to(S::Finished),
    )?;
    catalog.register(EidDescriptor::new(M::FilesDigestRequest).transitions_to(S::Digest))?;
    catalog.register(
        EidDescriptor::new(M::SignCertificatesRequest).transitions_to(S::SignCerts),
    )?;
    catalog.register(EidDescriptor::new(M::SignRequest).transitions_to(S::Sign))?;
    catalog.register(
        EidDescriptor::new(M::AuthenticationRequest).transitions_to(S::Authenticate),
    )?;
    catalog.register(
        EidDescriptor::new(M::IdentificationRequest).transitions_to(S::Identify),
    )?;
    catalog.register(
        EidDescriptor::new(M::Finished)
            .session_stop()
            .transitions_to(S::Finished),
    )?;

    catalog.validate()?;
    Ok(catalog)
}
