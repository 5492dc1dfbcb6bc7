//! Line-framed JSON envelopes for the stdio transport.
//!
//! ```text
//! in:  {"session": "<id>", "message": {"type": "HelloMessage", ...}}
//!      {"session": "<id>", "expire": true}
//! out: {"session": "<id>", "message": {"type": "...", ...}}
//!      {"session": "<id>", "error": {"code": 403, "message": "..."}}
//! ```

use eidgate_core::SessionId;
use eidgate_protocol::{codec, OutboundMessage, ProtocolError, ProtocolServer, SessionStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
    /// The transport session ended.
    #[serde(default)]
    pub expire: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<OutboundMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    fn message(session: String, message: OutboundMessage) -> Self {
        Self {
            session: Some(session),
            message: Some(message),
            expired: None,
            error: None,
        }
    }

    fn error(session: Option<String>, error: &ProtocolError) -> Self {
        Self {
            session,
            message: None,
            expired: None,
            error: Some(ErrorBody {
                code: error.rejection_code(),
                message: error.to_string(),
            }),
        }
    }
}

/// Handle one decoded envelope.
pub fn handle_envelope<S: SessionStore>(server: &ProtocolServer<S>, envelope: Envelope) -> Reply {
    let session_id = SessionId::new(envelope.session.clone());
    if envelope.expire {
        return match server.expire(&session_id) {
            Ok(was_open) => Reply {
                session: Some(envelope.session),
                message: None,
                expired: Some(was_open),
                error: None,
            },
            Err(e) => Reply::error(Some(envelope.session), &e),
        };
    }
    let Some(message) = envelope.message else {
        let error = ProtocolError::MalformedMessage("envelope carries no message".into());
        return Reply::error(Some(envelope.session), &error);
    };
    let result = serde_json::to_vec(&message)
        .map_err(ProtocolError::from)
        .and_then(|bytes| codec::decode_inbound(&bytes))
        .and_then(|inbound| server.handle(&session_id, inbound));
    match result {
        Ok(outbound) => Reply::message(envelope.session, outbound),
        Err(e) => Reply::error(Some(envelope.session), &e),
    }
}

/// Handle one input line and produce one output line.
pub fn handle_line<S: SessionStore>(server: &ProtocolServer<S>, line: &str) -> String {
    let reply = match serde_json::from_str::<Envelope>(line) {
        Ok(envelope) => handle_envelope(server, envelope),
        Err(e) => Reply::error(None, &ProtocolError::MalformedMessage(e.to_string())),
    };
    serde_json::to_string(&reply).unwrap_or_else(|_| {
        r#"{"error":{"code":500,"message":"serialization failed"}}"#.to_string()
    })
}
