//! End-to-end master build: remote master + local descriptor → merge →
//! fetch → assemble → write descriptor → local promotion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use jetmaster_fetch::SourceFetcher;
use jetmaster_shared::{
    ComponentDescriptor, MasterError, MasterSection, MasterSettings, ReleaseDescriptor, Result,
    merge_components,
};
use jetmaster_storage::{DescriptorFile, ReleaseStore, Workspace};

use crate::assembler::{self, AssembleConfig, AssembleResult, BundleChunk};
use crate::progress::ProgressReporter;
use crate::promoter::{self, PromoteOutcome, PublishMode};

/// Label of the chunk read from the project's own build output.
pub const LOCAL_LABEL: &str = "local";

/// Result of a master build.
#[derive(Debug)]
pub enum BuildOutcome {
    /// No master path configured; nothing was done.
    Skipped,
    Built(BuildReport),
}

#[derive(Debug)]
pub struct BuildReport {
    /// The working descriptor as written, including its master section.
    pub descriptor: ReleaseDescriptor,
    /// The assembled artifact.
    pub artifact: AssembleResult,
    /// Candidate descriptor produced by the local promotion.
    pub candidate_path: PathBuf,
    pub elapsed: Duration,
}

/// Where a merged component's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentSource {
    /// The project's own artifact in the workspace.
    Local(PathBuf),
    /// A published component, fetched over HTTP.
    Remote(String),
}

impl ComponentSource {
    pub fn label(&self) -> &str {
        match self {
            Self::Local(_) => LOCAL_LABEL,
            Self::Remote(location) => location,
        }
    }
}

/// Map each merged component to its source. The project's own entry is
/// always read locally, never fetched.
pub fn resolve_sources(
    merged: &[ComponentDescriptor],
    project: &ComponentDescriptor,
    workspace: &Workspace,
) -> Vec<ComponentSource> {
    merged
        .iter()
        .map(|component| {
            if component.url == project.url {
                ComponentSource::Local(workspace.path_of(&component.bundle))
            } else {
                ComponentSource::Remote(component.remote_location())
            }
        })
        .collect()
}

/// Fetch every source concurrently.
///
/// Chunks come back in `sources` order whatever order the fetches finish in.
/// The first failure aborts the rest.
pub async fn fetch_sources(
    sources: &[ComponentSource],
    fetcher: &dyn SourceFetcher,
    workspace: &Workspace,
    progress: &dyn ProgressReporter,
) -> Result<Vec<BundleChunk>> {
    let total = sources.len();
    let completed = AtomicUsize::new(0);

    let fetches = sources.iter().map(|source| {
        let completed = &completed;
        async move {
            let text = match source {
                ComponentSource::Local(path) => {
                    debug!(path = %path.display(), "reading local bundle");
                    workspace.read_text(path).await.map_err(|e| {
                        MasterError::component_fetch(path.display().to_string(), e.to_string())
                    })?
                }
                ComponentSource::Remote(location) => {
                    debug!(%location, "fetching component");
                    fetcher.fetch_text(location).await?
                }
            };

            let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress.component_fetched(source.label(), current, total);

            Ok::<_, MasterError>(BundleChunk {
                label: source.label().to_string(),
                source: text,
            })
        }
    });

    try_join_all(fetches).await
}

/// Run the full master build.
///
/// 1. Fetch the remote master descriptor (absent ⇒ empty master)
/// 2. Read the working descriptor and strip its master section
/// 3. Merge the project into the master component list
/// 4. Fetch every component's code
/// 5. Assemble the master artifact
/// 6. Write the working descriptor with the new master section
/// 7. Promote locally to the candidate descriptor
///
/// Nothing is written locally until every source has been fetched.
#[instrument(skip_all, fields(site = %settings.site))]
pub async fn build_master(
    settings: &MasterSettings,
    store: &dyn ReleaseStore,
    fetcher: &dyn SourceFetcher,
    workspace: &Workspace,
    progress: &dyn ProgressReporter,
) -> Result<BuildOutcome> {
    let start = Instant::now();

    let Some(remote_key) = settings.remote_release_key() else {
        info!("no master path configured, no bundle merge performed");
        return Ok(BuildOutcome::Skipped);
    };

    let guard_path = settings.guard_path.clone().ok_or_else(|| {
        MasterError::config("S3_PATH is not set; the dev-redirect guard needs it")
    })?;

    info!(%remote_key, "starting master bundle build");

    // --- Phase 1: Remote master ---
    progress.phase("Fetching master descriptor");
    let remote = store.fetch_descriptor(&remote_key).await?;
    if remote.is_none() {
        info!(%remote_key, "master descriptor not found, starting from scratch");
    }

    // --- Phase 2: Local descriptor ---
    progress.phase("Reading local descriptor");
    let local = workspace.read_descriptor(DescriptorFile::Working).await?;
    let project = local.component();

    // --- Phase 3: Merge ---
    let existing = remote
        .as_ref()
        .map(ReleaseDescriptor::master_components)
        .unwrap_or(&[]);
    let merged = merge_components(existing, &project);
    info!(
        previous = existing.len(),
        merged = merged.len(),
        project = %project.url,
        "merged component list"
    );

    // --- Phase 4: Fetch sources ---
    progress.phase("Fetching components");
    let sources = resolve_sources(&merged, &project, workspace);
    let chunks = fetch_sources(&sources, fetcher, workspace, progress).await?;

    // --- Phase 5: Assemble ---
    progress.phase("Assembling master bundle");
    let assemble_config = AssembleConfig {
        snippet_path: settings.redirect_snippet.clone(),
        guard_path,
        artifact_name: settings.master_bundle.clone(),
    };
    let artifact = assembler::assemble(&assemble_config, &chunks, workspace).await?;

    // --- Phase 6: Working descriptor ---
    progress.phase("Writing descriptor");
    let descriptor = local.without_master().with_master(MasterSection {
        bundle: settings.master_bundle.clone(),
        components: merged,
    });
    workspace
        .write_descriptor(DescriptorFile::Working, &descriptor)
        .await?;

    // --- Phase 7: Local promotion ---
    let candidate_path =
        match promoter::promote(settings, store, workspace, PublishMode::LocalOnly, progress)
            .await?
        {
            PromoteOutcome::Promoted(report) => report.candidate_path,
            PromoteOutcome::Skipped => workspace.descriptor_path(DescriptorFile::Candidate),
        };

    let report = BuildReport {
        descriptor,
        artifact,
        candidate_path,
        elapsed: start.elapsed(),
    };

    info!(
        components = report.artifact.chunk_count,
        sha256 = %report.artifact.sha256,
        elapsed_ms = report.elapsed.as_millis(),
        "master bundle build complete"
    );

    Ok(BuildOutcome::Built(report))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use jetmaster_shared::AppConfig;
    use jetmaster_storage::MemoryReleaseStore;

    use super::*;
    use crate::progress::SilentProgress;

    const REMOTE_KEY: &str = "master/shop/release.json";
    const SNIPPET: &str = "function jpcheck(p){return false;}";
    const LOCAL_SOURCE: &str = "window.foo=1;";

    /// Serves canned bodies and records every requested location.
    #[derive(Default)]
    struct RecordingFetcher {
        bodies: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingFetcher {
        fn with(mut self, location: &str, body: &str) -> Self {
            self.bodies.insert(location.into(), body.into());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceFetcher for RecordingFetcher {
        async fn fetch_text(&self, location: &str) -> Result<String> {
            self.calls.lock().unwrap().push(location.to_string());
            self.bodies
                .get(location)
                .cloned()
                .ok_or_else(|| MasterError::component_fetch(location, "HTTP 404 Not Found"))
        }
    }

    struct Fixture {
        root: PathBuf,
        settings: MasterSettings,
        workspace: Workspace,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn fixture(master_path: Option<&str>) -> Fixture {
        let root = std::env::temp_dir().join(format!("jm-builder-test-{}", uuid::Uuid::now_v7()));

        let mut config = AppConfig::default();
        config.site.name = Some("shop".into());
        config.site.working_dir = root.clone();
        config.master.path = master_path.map(String::from);
        config.storage.public_path = Some("https://s3-eu-west-1.amazonaws.com/widgets/shop".into());
        let settings = MasterSettings::resolve(&config).unwrap();

        std::fs::create_dir_all(settings.redirect_snippet.parent().unwrap()).unwrap();
        std::fs::write(&settings.redirect_snippet, SNIPPET).unwrap();

        std::fs::create_dir_all(&settings.site_dist_dir).unwrap();
        std::fs::write(
            settings.site_dist_dir.join("release.json"),
            r#"{"url":"/foo","version":"1.0.0","bundle":"foo.js"}"#,
        )
        .unwrap();
        std::fs::write(settings.site_dist_dir.join("foo.js"), LOCAL_SOURCE).unwrap();

        let workspace = Workspace::new(&settings.site_dist_dir);
        Fixture {
            root,
            settings,
            workspace,
        }
    }

    fn component(url: &str, version: &str, bundle: &str) -> ComponentDescriptor {
        ComponentDescriptor {
            url: url.into(),
            version: version.into(),
            bundle: bundle.into(),
        }
    }

    async fn seeded_store(components: Vec<ComponentDescriptor>) -> MemoryReleaseStore {
        let store = MemoryReleaseStore::new();
        let remote: ReleaseDescriptor =
            serde_json::from_str(r#"{"url":"/a","version":"2.0.0","bundle":"master_min.js"}"#)
                .unwrap();
        let remote = remote.with_master(MasterSection {
            bundle: "master_min.js".into(),
            components,
        });
        store.insert_descriptor(REMOTE_KEY, &remote).await.unwrap();
        store
    }

    async fn run(fx: &Fixture, store: &MemoryReleaseStore, fetcher: &RecordingFetcher) -> Result<BuildOutcome> {
        build_master(&fx.settings, store, fetcher, &fx.workspace, &SilentProgress).await
    }

    fn built(outcome: BuildOutcome) -> BuildReport {
        match outcome {
            BuildOutcome::Built(report) => report,
            BuildOutcome::Skipped => panic!("expected Built, got Skipped"),
        }
    }

    #[tokio::test]
    async fn absent_master_yields_project_only() {
        let fx = fixture(Some("master"));
        let store = MemoryReleaseStore::new();
        let fetcher = RecordingFetcher::default();

        let report = built(run(&fx, &store, &fetcher).await.unwrap());

        let master = report.descriptor.master.as_ref().unwrap();
        assert_eq!(master.bundle, "master_min.js");
        assert_eq!(master.components, vec![component("/foo", "1.0.0", "foo.js")]);
        assert_eq!(report.descriptor.bundle, "foo.js");

        let artifact = std::fs::read_to_string(&report.artifact.path).unwrap();
        assert_eq!(artifact.matches("/*BUNDLE ").count(), 1);
        assert!(artifact.contains("/*BUNDLE local */"));
        assert!(artifact.contains(LOCAL_SOURCE));
        assert!(artifact.starts_with(SNIPPET));
        assert!(artifact.contains("jpcheck('https://s3-eu-west-1.amazonaws.com/widgets/shop')"));
        assert!(fetcher.calls().is_empty());

        let written = fx.workspace.read_descriptor(DescriptorFile::Working).await.unwrap();
        assert_eq!(written, report.descriptor);

        let candidate = fx.workspace.read_descriptor(DescriptorFile::Candidate).await.unwrap();
        assert_eq!(candidate.bundle, "master_min.js");
        assert_eq!(report.candidate_path, fx.workspace.descriptor_path(DescriptorFile::Candidate));
        assert!(store.uploads().await.is_empty());
    }

    #[tokio::test]
    async fn existing_entry_is_replaced_and_others_fetched_remotely() {
        let fx = fixture(Some("master"));
        let store = seeded_store(vec![
            component("/a", "2.0.0", "a.js"),
            component("/foo", "0.9.0", "old.js"),
        ])
        .await;
        let fetcher = RecordingFetcher::default().with("/a2.0.0/a.js", "window.a=2;");

        let report = built(run(&fx, &store, &fetcher).await.unwrap());

        assert_eq!(
            report.descriptor.master_components(),
            &[
                component("/a", "2.0.0", "a.js"),
                component("/foo", "1.0.0", "foo.js"),
            ]
        );
        assert_eq!(fetcher.calls(), vec!["/a2.0.0/a.js".to_string()]);

        let artifact = std::fs::read_to_string(&report.artifact.path).unwrap();
        let a = artifact.find("/*BUNDLE /a2.0.0/a.js */").unwrap();
        let local = artifact.find("/*BUNDLE local */").unwrap();
        assert!(a < local);
        assert!(artifact.contains("window.a=2;"));
    }

    #[tokio::test]
    async fn new_project_is_appended() {
        let fx = fixture(Some("master"));
        let store = seeded_store(vec![
            component("/a", "2.0.0", "a.js"),
            component("/b", "3.1.0", "b.js"),
        ])
        .await;
        let fetcher = RecordingFetcher::default()
            .with("/a2.0.0/a.js", "A();")
            .with("/b3.1.0/b.js", "B();");

        let report = built(run(&fx, &store, &fetcher).await.unwrap());

        let urls: Vec<&str> = report
            .descriptor
            .master_components()
            .iter()
            .map(|c| c.url.as_str())
            .collect();
        assert_eq!(urls, vec!["/a", "/b", "/foo"]);

        let artifact = std::fs::read_to_string(&report.artifact.path).unwrap();
        let a = artifact.find("A();").unwrap();
        let b = artifact.find("B();").unwrap();
        let local = artifact.find(LOCAL_SOURCE).unwrap();
        assert!(a < b && b < local);
    }

    #[tokio::test]
    async fn failed_fetch_aborts_without_writing() {
        let fx = fixture(Some("master"));
        let store = seeded_store(vec![component("/a", "2.0.0", "a.js")]).await;
        let fetcher = RecordingFetcher::default();
        let artifact_path = fx.workspace.path_of("master_min.js");
        std::fs::write(&artifact_path, "previous master").unwrap();

        let err = run(&fx, &store, &fetcher).await.unwrap_err();

        assert!(matches!(err, MasterError::ComponentFetch { .. }));
        assert_eq!(std::fs::read_to_string(&artifact_path).unwrap(), "previous master");
        let working = fx.workspace.read_descriptor(DescriptorFile::Working).await.unwrap();
        assert!(working.master.is_none());
        assert!(!fx.workspace.descriptor_path(DescriptorFile::Candidate).exists());
    }

    #[tokio::test]
    async fn missing_local_bundle_aborts_build() {
        let fx = fixture(Some("master"));
        std::fs::remove_file(fx.workspace.path_of("foo.js")).unwrap();
        let store = MemoryReleaseStore::new();

        let err = run(&fx, &store, &RecordingFetcher::default()).await.unwrap_err();

        assert!(matches!(err, MasterError::ComponentFetch { .. }));
        assert!(!fx.workspace.path_of("master_min.js").exists());
    }

    #[tokio::test]
    async fn rebuild_is_byte_identical() {
        let fx = fixture(Some("master"));
        let store = seeded_store(vec![component("/a", "2.0.0", "a.js")]).await;
        let fetcher = RecordingFetcher::default().with("/a2.0.0/a.js", "A();");

        let first = built(run(&fx, &store, &fetcher).await.unwrap());
        let first_bytes = std::fs::read(&first.artifact.path).unwrap();
        let second = built(run(&fx, &store, &fetcher).await.unwrap());
        let second_bytes = std::fs::read(&second.artifact.path).unwrap();

        assert_eq!(first_bytes, second_bytes);
        assert_eq!(first.artifact.sha256, second.artifact.sha256);
        assert_eq!(first.descriptor, second.descriptor);
    }

    #[tokio::test]
    async fn skipped_without_master_path() {
        let fx = fixture(None);
        let store = MemoryReleaseStore::new();
        let fetcher = RecordingFetcher::default();

        let outcome = run(&fx, &store, &fetcher).await.unwrap();

        assert!(matches!(outcome, BuildOutcome::Skipped));
        assert!(!fx.workspace.path_of("master_min.js").exists());
        assert!(!fx.workspace.descriptor_path(DescriptorFile::Candidate).exists());
    }

    #[tokio::test]
    async fn missing_guard_path_is_config_error() {
        let mut fx = fixture(Some("master"));
        fx.settings.guard_path = None;
        let store = MemoryReleaseStore::new();

        let err = run(&fx, &store, &RecordingFetcher::default()).await.unwrap_err();
        assert!(matches!(err, MasterError::Config { .. }));
    }

    #[tokio::test]
    async fn missing_snippet_is_fatal() {
        let fx = fixture(Some("master"));
        std::fs::remove_file(&fx.settings.redirect_snippet).unwrap();
        let store = MemoryReleaseStore::new();

        let err = run(&fx, &store, &RecordingFetcher::default()).await.unwrap_err();

        assert!(matches!(err, MasterError::SnippetMissing { .. }));
        assert!(!fx.workspace.path_of("master_min.js").exists());
        let working = fx.workspace.read_descriptor(DescriptorFile::Working).await.unwrap();
        assert!(working.master.is_none());
    }

    #[test]
    fn project_source_is_local_even_with_stale_upstream_bundle() {
        let ws = Workspace::new(Path::new("/srv/shop/dist/shop"));
        let project = component("/foo", "1.0.0", "foo.js");
        let merged = vec![component("/a", "2.0.0", "a.js"), project.clone()];

        let sources = resolve_sources(&merged, &project, &ws);

        assert_eq!(
            sources,
            vec![
                ComponentSource::Remote("/a2.0.0/a.js".into()),
                ComponentSource::Local(PathBuf::from("/srv/shop/dist/shop/foo.js")),
            ]
        );
        assert_eq!(sources[1].label(), LOCAL_LABEL);
    }

    /// Answers each location after its own delay.
    struct DelayedFetcher {
        delays_ms: HashMap<String, u64>,
    }

    #[async_trait]
    impl SourceFetcher for DelayedFetcher {
        async fn fetch_text(&self, location: &str) -> Result<String> {
            let delay = self.delays_ms.get(location).copied().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("body of {location}"))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        fetched: Mutex<Vec<(String, usize, usize)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, _name: &str) {}

        fn component_fetched(&self, label: &str, current: usize, total: usize) {
            self.fetched
                .lock()
                .unwrap()
                .push((label.to_string(), current, total));
        }
    }

    #[tokio::test]
    async fn chunks_follow_merge_order_when_fetches_finish_in_reverse() {
        let sources = vec![
            ComponentSource::Remote("/a1.0.0/a.js".into()),
            ComponentSource::Remote("/b1.0.0/b.js".into()),
            ComponentSource::Remote("/c1.0.0/c.js".into()),
        ];
        let fetcher = DelayedFetcher {
            delays_ms: HashMap::from([
                ("/a1.0.0/a.js".to_string(), 240),
                ("/b1.0.0/b.js".to_string(), 120),
                ("/c1.0.0/c.js".to_string(), 0),
            ]),
        };
        let progress = RecordingProgress::default();
        let ws = Workspace::new("/nonexistent");

        let chunks = fetch_sources(&sources, &fetcher, &ws, &progress).await.unwrap();

        let labels: Vec<&str> = chunks.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["/a1.0.0/a.js", "/b1.0.0/b.js", "/c1.0.0/c.js"]);
        assert_eq!(chunks[0].source, "body of /a1.0.0/a.js");
        assert_eq!(chunks[2].source, "body of /c1.0.0/c.js");

        assert_eq!(
            *progress.fetched.lock().unwrap(),
            vec![
                ("/c1.0.0/c.js".to_string(), 1, 3),
                ("/b1.0.0/b.js".to_string(), 2, 3),
                ("/a1.0.0/a.js".to_string(), 3, 3),
            ]
        );
    }
}
