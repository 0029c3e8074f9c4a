//! The local site workspace: `<working dir>/<dist>/<site>/`.
//!
//! Holds the working descriptor written by the project build, the candidate
//! master descriptor, the project's own bundle and the merged artifact.

use std::path::{Path, PathBuf};

use jetmaster_shared::{MASTER_RELEASE_FILE, MasterError, RELEASE_FILE, ReleaseDescriptor, Result};
use tracing::debug;

use crate::parse_descriptor;

/// Which local descriptor file to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFile {
    /// `release.json`, the project build's own descriptor.
    Working,
    /// `release-master.json`, the promoted master record.
    Candidate,
}

impl DescriptorFile {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Working => RELEASE_FILE,
            Self::Candidate => MASTER_RELEASE_FILE,
        }
    }
}

/// Handle on a site's dist directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    dist_dir: PathBuf,
}

impl Workspace {
    pub fn new(dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            dist_dir: dist_dir.into(),
        }
    }

    /// Path of a file directly inside the dist directory.
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.dist_dir.join(file_name)
    }

    pub fn descriptor_path(&self, file: DescriptorFile) -> PathBuf {
        self.path_of(file.file_name())
    }

    /// Read and parse a local descriptor.
    pub async fn read_descriptor(&self, file: DescriptorFile) -> Result<ReleaseDescriptor> {
        let path = self.descriptor_path(file);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| MasterError::io(&path, e))?;
        parse_descriptor(&bytes, &path.display().to_string())
    }

    /// Write a descriptor as pretty JSON. Returns the written path.
    pub async fn write_descriptor(
        &self,
        file: DescriptorFile,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(descriptor)
            .map_err(|e| MasterError::parse(format!("JSON serialization failed: {e}")))?;
        let path = self.descriptor_path(file);
        self.write_atomic(&path, &json).await?;
        debug!(path = %path.display(), "wrote descriptor");
        Ok(path)
    }

    /// Read a UTF-8 text file.
    pub async fn read_text(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MasterError::io(path, e))
    }

    /// Replace `file_name` with `content`.
    ///
    /// The previous file is removed, and the removal has completed before
    /// the new content is written (temp file, then rename).
    pub async fn replace_file(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        let target = self.path_of(file_name);

        match tokio::fs::remove_file(&target).await {
            Ok(()) => debug!(path = %target.display(), "removed previous file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MasterError::io(&target, e)),
        }

        self.write_atomic(&target, content).await?;
        Ok(target)
    }

    async fn write_atomic(&self, target: &Path, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dist_dir)
            .await
            .map_err(|e| MasterError::io(&self.dist_dir, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = self.dist_dir.join(format!(".{file_name}.tmp"));

        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| MasterError::io(&temp, e))?;
        tokio::fs::rename(&temp, target)
            .await
            .map_err(|e| MasterError::io(target, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jm-workspace-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn descriptor() -> ReleaseDescriptor {
        serde_json::from_str(r#"{"url":"/foo","version":"1.0.0","bundle":"foo.js"}"#).unwrap()
    }

    #[tokio::test]
    async fn descriptor_write_then_read() {
        let tmp = temp_dir();
        let ws = Workspace::new(tmp.join("dist/shop"));

        let path = ws
            .write_descriptor(DescriptorFile::Candidate, &descriptor())
            .await
            .unwrap();
        assert_eq!(path, tmp.join("dist/shop/release-master.json"));

        let read = ws.read_descriptor(DescriptorFile::Candidate).await.unwrap();
        assert_eq!(read, descriptor());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn reading_missing_descriptor_is_io_error() {
        let tmp = temp_dir();
        let ws = Workspace::new(&tmp);

        let err = ws.read_descriptor(DescriptorFile::Working).await.unwrap_err();
        assert!(matches!(err, MasterError::Io { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn replace_file_drops_stale_content() {
        let tmp = temp_dir();
        let ws = Workspace::new(&tmp);
        std::fs::write(tmp.join("master_min.js"), "stale stale stale stale").unwrap();

        ws.replace_file("master_min.js", "fresh").await.unwrap();

        assert_eq!(std::fs::read_to_string(tmp.join("master_min.js")).unwrap(), "fresh");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn replace_file_leaves_no_temp_files() {
        let tmp = temp_dir();
        let ws = Workspace::new(&tmp);

        ws.replace_file("master_min.js", "one").await.unwrap();
        ws.write_descriptor(DescriptorFile::Working, &descriptor())
            .await
            .unwrap();

        for entry in std::fs::read_dir(&tmp).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
