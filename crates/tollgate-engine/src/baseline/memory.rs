use std::collections::BTreeMap;
use std::sync::Mutex;

use tollgate_core::errors::StoreError;

use super::BaselineBackend;

/// In-process backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    docs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Io("memory backend lock poisoned".to_string()))
    }
}

impl BaselineBackend for MemoryBackend {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.docs()?.get(name).cloned())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.docs()?.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.docs()?.remove(name).is_some())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.docs()?.keys().cloned().collect())
    }
}
