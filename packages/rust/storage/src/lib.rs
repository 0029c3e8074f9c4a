//! Release storage for jetmaster.
//!
//! - [`ReleaseStore`] abstracts the remote authoritative location of release
//!   descriptors. [`S3ReleaseStore`] talks to S3, [`MemoryReleaseStore`] keeps
//!   objects in memory for tests and dry runs.
//! - [`Workspace`] is the local side: the site's dist directory holding the
//!   working and candidate descriptors and the built artifacts.

pub mod local;
pub mod memory;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use jetmaster_shared::{MasterError, ReleaseDescriptor, Result};

pub use local::{DescriptorFile, Workspace};
pub use memory::MemoryReleaseStore;
pub use s3::S3ReleaseStore;

/// Remote store for release descriptors.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Download and parse the descriptor at `key`.
    ///
    /// A missing key is `Ok(None)`, which callers treat as an empty release.
    async fn fetch_descriptor(&self, key: &str) -> Result<Option<ReleaseDescriptor>>;

    /// Upload `local_path` to `key`, replacing any previous object.
    /// Returns the public URL of the uploaded object.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String>;
}

/// Parse descriptor JSON read from `source`.
pub(crate) fn parse_descriptor(bytes: &[u8], source: &str) -> Result<ReleaseDescriptor> {
    serde_json::from_slice(bytes)
        .map_err(|e| MasterError::parse(format!("invalid descriptor at {source}: {e}")))
}
