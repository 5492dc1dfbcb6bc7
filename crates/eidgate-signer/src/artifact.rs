use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use eidgate_core::RequestId;

use crate::error::{SignerError, SignerResult};

/// Holds what a pre-sign produced until the matching post-sign.
///
/// One entry per request id; storing again replaces the previous entry.
pub trait TemporaryArtifactStore: Send + Sync {
    fn put(&self, request_id: &RequestId, artifact: Vec<u8>) -> SignerResult<()>;

    /// Remove and return the entry.
    fn take(&self, request_id: &RequestId) -> SignerResult<Option<Vec<u8>>>;

    fn contains(&self, request_id: &RequestId) -> SignerResult<bool>;
}

/// Process-local store.
pub struct InMemoryArtifactStore {
    data: Mutex<HashMap<RequestId, Vec<u8>>>,
}

fn lock_data(
    mutex: &Mutex<HashMap<RequestId, Vec<u8>>>,
) -> SignerResult<MutexGuard<'_, HashMap<RequestId, Vec<u8>>>> {
    mutex
        .lock()
        .map_err(|e| SignerError::ArtifactStore(format!("lock poisoned: {}", e)))
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn count(&self) -> usize {
        lock_data(&self.data).map(|d| d.len()).unwrap_or(0)
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporaryArtifactStore for InMemoryArtifactStore {
    fn put(&self, request_id: &RequestId, artifact: Vec<u8>) -> SignerResult<()> {
        let mut data = lock_data(&self.data)?;
        data.insert(request_id.clone(), artifact);
        Ok(())
    }

    fn take(&self, request_id: &RequestId) -> SignerResult<Option<Vec<u8>>> {
        let mut data = lock_data(&self.data)?;
        Ok(data.remove(request_id))
    }

    fn contains(&self, request_id: &RequestId) -> SignerResult<bool> {
        let data = lock_data(&self.data)?;
        Ok(data.contains_key(request_id))
    }
}
