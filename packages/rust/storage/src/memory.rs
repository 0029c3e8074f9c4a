//! In-memory [`ReleaseStore`] for tests and dry runs.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use jetmaster_shared::{MasterError, ReleaseDescriptor, Result};
use tokio::sync::Mutex;

use crate::{ReleaseStore, parse_descriptor};

/// Objects held in a map keyed by object key.
#[derive(Default)]
pub struct MemoryReleaseStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
}

impl MemoryReleaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `key` with a serialized descriptor.
    pub async fn insert_descriptor(&self, key: &str, descriptor: &ReleaseDescriptor) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| MasterError::parse(format!("JSON serialization failed: {e}")))?;
        self.objects.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }

    /// Keys uploaded so far, in upload order.
    pub async fn uploads(&self) -> Vec<String> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn fetch_descriptor(&self, key: &str) -> Result<Option<ReleaseDescriptor>> {
        match self.objects.lock().await.get(key) {
            Some(bytes) => parse_descriptor(bytes, key).map(Some),
            None => Ok(None),
        }
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| MasterError::io(local_path, e))?;

        self.objects.lock().await.insert(key.to_string(), bytes);
        self.uploads.lock().await.push(key.to_string());
        Ok(format!("memory://{key}"))
    }
}
