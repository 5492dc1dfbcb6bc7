//! Transport-facing codec.
//!
//! The only contract points between a transport binding and the protocol
//! engine: bytes in, typed message out, and back. An unknown discriminator
//! is reported as `UnknownMessageType`, a known one with bad fields as
//! `MalformedMessage`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{InboundMessage, MessageType, OutboundMessage};

/// Discriminator field carried by every message.
pub const TYPE_FIELD: &str = "type";

/// Decode a message sent by the client.
pub fn decode_inbound(bytes: &[u8]) -> ProtocolResult<InboundMessage> {
    decode_directed(bytes, true)
}

/// Encode a directive for the client.
pub fn encode_outbound(message: &OutboundMessage) -> ProtocolResult<Vec<u8>> {
    encode(message)
}

/// Client-side mirror of [`encode_outbound`].
pub fn encode_inbound(message: &InboundMessage) -> ProtocolResult<Vec<u8>> {
    encode(message)
}

/// Client-side mirror of [`decode_inbound`].
pub fn decode_outbound(bytes: &[u8]) -> ProtocolResult<OutboundMessage> {
    decode_directed(bytes, false)
}

/// Read the discriminator of a raw message without decoding its fields.
pub fn peek_message_type(bytes: &[u8]) -> ProtocolResult<MessageType> {
    let value: Value = serde_json::from_slice(bytes)?;
    message_type_of(&value)
}

fn message_type_of(value: &Value) -> ProtocolResult<MessageType> {
    let name = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedMessage("missing message type".into()))?;
    MessageType::from_name(name).ok_or_else(|| ProtocolError::UnknownMessageType(name.into()))
}

fn decode_directed<T: DeserializeOwned>(bytes: &[u8], inbound: bool) -> ProtocolResult<T> {
    let value: Value = serde_json::from_slice(bytes)?;
    let message_type = message_type_of(&value)?;
    // A valid name travelling in the wrong direction is as unknown to this
    // side as a made-up one.
    if message_type.is_inbound() != inbound {
        return Err(ProtocolError::UnknownMessageType(message_type.to_string()));
    }
    serde_json::from_value(value).map_err(|e| {
        ProtocolError::MalformedMessage(format!("{}: {}", message_type, e))
    })
}

fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| ProtocolError::Internal(e.to_string()))
}
