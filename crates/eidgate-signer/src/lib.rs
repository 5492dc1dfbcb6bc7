//! Detached signatures for OpenDocument containers.
//!
//! The [`engine`] computes a digest over a container's parts (`pre_sign`),
//! lets a card sign it remotely and embeds the returned signature value as
//! a new block in `META-INF/documentsignatures.xml` (`post_sign`).
//! [`verify`] checks finished containers, and [`service`] plugs the engine
//! into the protocol as its signature capability.

pub mod artifact;
pub mod block;
pub mod container;
pub mod digest;
pub mod document;
pub mod engine;
pub mod error;
pub mod service;
pub mod verify;
pub mod xml;

pub use artifact::{InMemoryArtifactStore, TemporaryArtifactStore};
pub use container::{Container, SIGNATURE_PART};
pub use digest::DigestAlgorithm;
pub use document::{DocumentSource, FileSink, FileSource, InMemorySink, InMemorySource, SignedDocumentSink};
pub use engine::{DetachedSignatureEngine, EngineConfig};
pub use error::*;
pub use service::ContainerSignatureService;
pub use verify::{verify_container, SignatureReport};
