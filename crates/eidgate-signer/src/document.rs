//! Where containers come from and where signed ones go.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{SignerError, SignerResult};

pub trait DocumentSource: Send + Sync {
    fn load(&self) -> SignerResult<Vec<u8>>;

    /// Human readable origin, for logs.
    fn describe(&self) -> String;
}

pub trait SignedDocumentSink: Send + Sync {
    fn write(&self, container: &[u8]) -> SignerResult<()>;
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

pub struct InMemorySource {
    bytes: Vec<u8>,
}

impl InMemorySource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl DocumentSource for InMemorySource {
    fn load(&self) -> SignerResult<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.bytes.len())
    }
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileSource {
    fn load(&self) -> SignerResult<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Keeps the last written container.
#[derive(Default)]
pub struct InMemorySink {
    contents: Mutex<Option<Vec<u8>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().ok().and_then(|c| c.clone())
    }
}

impl SignedDocumentSink for InMemorySink {
    fn write(&self, container: &[u8]) -> SignerResult<()> {
        let mut contents = self
            .contents
            .lock()
            .map_err(|e| SignerError::Io(std::io::Error::other(format!("sink poisoned: {}", e))))?;
        *contents = Some(container.to_vec());
        Ok(())
    }
}

/// Writes next to the target and renames, so readers never see a partial file.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SignedDocumentSink for FileSink {
    fn write(&self, container: &[u8]) -> SignerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, container)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), size = container.len(), "signed document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip() {
        let source = InMemorySource::new(b"doc".to_vec());
        assert_eq!(source.load().unwrap(), b"doc".to_vec());
        let sink = InMemorySink::new();
        assert!(sink.contents().is_none());
        sink.write(b"signed").unwrap();
        assert_eq!(sink.contents(), Some(b"signed".to_vec()));
    }

    #[test]
    fn test_file_sink_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("signed.odt");
        FileSink::new(&path).write(b"signed").unwrap();
        assert_eq!(FileSource::new(&path).load().unwrap(), b"signed".to_vec());
        assert!(!dir.path().join("out").join("signed.odt.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.odt"));
        assert!(matches!(source.load(), Err(SignerError::Io(_))));
    }
}
