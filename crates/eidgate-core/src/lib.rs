//! Shared vocabulary of the eID gateway.
//!
//! Identifiers, timestamps, certificates and digest descriptions used by
//! both the protocol engine and the detached signature engine, plus the
//! capability-provider traits a deployment plugs into the protocol.

pub mod crypto;
pub mod error;
pub mod traits;
pub mod types;

pub use crypto::*;
pub use error::*;
pub use traits::*;
pub use types::*;
