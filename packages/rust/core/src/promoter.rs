//! Master promotion: turn the locally built descriptor into the canonical
//! master record, and optionally publish it.

use std::path::PathBuf;

use tracing::{info, instrument};

use jetmaster_shared::{MasterError, MasterSettings, ReleaseDescriptor, Result};
use jetmaster_storage::{DescriptorFile, ReleaseStore, Workspace};

use crate::progress::ProgressReporter;

/// Whether promotion ends locally or also replaces the remote pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Write the candidate file only.
    LocalOnly,
    /// Write the candidate file, then upload it as the authoritative release.
    Publish,
}

/// Result of a promotion run.
#[derive(Debug)]
pub enum PromoteOutcome {
    /// No master path configured; nothing was done.
    Skipped,
    Promoted(PromoteReport),
}

#[derive(Debug)]
pub struct PromoteReport {
    /// The canonical descriptor that was written.
    pub descriptor: ReleaseDescriptor,
    /// Local candidate file.
    pub candidate_path: PathBuf,
    /// Public URL of the published release, when published.
    pub published_url: Option<String>,
}

/// Promote the working descriptor to the master candidate.
///
/// 1. Read the working descriptor
/// 2. Point its `bundle` at the master artifact (requires a `master` section)
/// 3. Write the candidate descriptor
/// 4. Upload it, only in [`PublishMode::Publish`] and only after the local write
#[instrument(skip_all, fields(site = %settings.site, mode = ?mode))]
pub async fn promote(
    settings: &MasterSettings,
    store: &dyn ReleaseStore,
    workspace: &Workspace,
    mode: PublishMode,
    progress: &dyn ProgressReporter,
) -> Result<PromoteOutcome> {
    let Some(remote_key) = settings.remote_release_key() else {
        info!("no master path configured, no master release performed");
        return Ok(PromoteOutcome::Skipped);
    };

    progress.phase("Reading built descriptor");
    let working_path = workspace.descriptor_path(DescriptorFile::Working);
    let built = workspace.read_descriptor(DescriptorFile::Working).await?;

    let descriptor = built
        .promoted()
        .ok_or(MasterError::MissingMasterSection { path: working_path })?;

    progress.phase("Writing master descriptor");
    let candidate_path = workspace
        .write_descriptor(DescriptorFile::Candidate, &descriptor)
        .await?;
    info!(path = %candidate_path.display(), bundle = %descriptor.bundle, "master descriptor written");

    let published_url = match mode {
        PublishMode::LocalOnly => None,
        PublishMode::Publish => {
            progress.phase("Publishing master release");
            let url = store.upload(&candidate_path, &remote_key).await?;
            info!(%url, "created master release");
            Some(url)
        }
    };

    Ok(PromoteOutcome::Promoted(PromoteReport {
        descriptor,
        candidate_path,
        published_url,
    }))
}
