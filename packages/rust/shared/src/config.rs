//! Application configuration for jetmaster.
//!
//! Project config lives at `<working dir>/jetmaster.toml`. Environment
//! variables override the file, and CLI flags override both.
//! Credentials are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MasterError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jetmaster.toml";

/// Working descriptor written by the project build.
pub const RELEASE_FILE: &str = "release.json";

/// Candidate descriptor produced by promotion.
pub const MASTER_RELEASE_FILE: &str = "release-master.json";

// ---------------------------------------------------------------------------
// Config structs (matching jetmaster.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local project layout.
    #[serde(default)]
    pub site: SiteConfig,

    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Master merge settings.
    #[serde(default)]
    pub master: MasterConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name; selects `dist/<name>/` locally and `<master path>/<name>/` remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Project root. Relative paths below resolve against it.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Build output directory, relative to the working dir.
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Dev-redirect snippet prepended to the master artifact.
    #[serde(default = "default_redirect_snippet")]
    pub redirect_snippet: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: None,
            working_dir: default_working_dir(),
            dist_dir: default_dist_dir(),
            redirect_snippet: default_redirect_snippet(),
        }
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}
fn default_redirect_snippet() -> PathBuf {
    PathBuf::from("node_modules/jetpack/lib/devRedirectSnippet_min.js")
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding the published descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Explicit region. Derived from `public_path` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Public path of the site, e.g. `https://s3-eu-west-1.amazonaws.com/bucket/site`.
    /// Also the identifier checked by the dev-redirect guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    /// Name of the env var holding the access key id.
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    /// Name of the env var holding the secret key.
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: None,
            public_path: None,
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

fn default_access_key_env() -> String {
    "S3_ACCESS_KEY_ID".into()
}
fn default_secret_key_env() -> String {
    "S3_SECRET_KEY".into()
}

/// `[master]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Remote prefix of the master release. Unset disables merging entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Filename of the merged artifact.
    #[serde(default = "default_master_bundle")]
    pub bundle: String,

    /// Base URL for component locations that are not absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_base: Option<String>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            path: None,
            bundle: default_master_bundle(),
            component_base: None,
        }
    }
}

impl MasterConfig {
    /// Whether a master path is configured. Without one, build and release
    /// are no-ops.
    pub fn merge_enabled(&self) -> bool {
        self.path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

fn default_master_bundle() -> String {
    "master_min.js".into()
}

/// Access key pair resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl StorageConfig {
    /// Resolve credentials through `lookup`. `None` unless both are set and non-empty.
    pub fn credentials_with<F>(&self, lookup: F) -> Option<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Some(Credentials {
            access_key_id: non_empty(&self.access_key_env)?,
            secret_key: non_empty(&self.secret_key_env)?,
        })
    }

    /// Resolve credentials from the process environment.
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Explicit region, or the one encoded in an `https://s3-<region>.amazonaws.com` public path.
    pub fn resolved_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| self.public_path.as_deref().and_then(region_from_public_path))
    }
}

/// Extract `<region>` from `https://s3-<region>.amazonaws.com/...`.
pub fn region_from_public_path(path: &str) -> Option<String> {
    let host = path
        .strip_prefix("https://")
        .or_else(|| path.strip_prefix("http://"))?;
    let first_label = host.split(['.', '/']).next()?;
    let region = first_label.strip_prefix("s3-")?;
    (!region.is_empty()).then(|| region.to_string())
}

impl AppConfig {
    /// Overlay environment-style settings read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("S3_BUCKET") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = get("S3_REGION") {
            self.storage.region = Some(v);
        }
        if let Some(v) = get("S3_PATH") {
            self.storage.public_path = Some(v);
        }
        if let Some(v) = get("S3_MASTER_PATH") {
            self.master.path = Some(v);
        }
        if let Some(v) = get("JETPACK_SITE") {
            self.site.name = Some(v);
        }
        if let Some(v) = get("JETMASTER_COMPONENT_BASE") {
            self.master.component_base = Some(v);
        }
    }

    /// Overlay settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }
}

// ---------------------------------------------------------------------------
// Master settings (runtime, resolved from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime settings for the build and promote pipelines.
#[derive(Debug, Clone)]
pub struct MasterSettings {
    /// Site name.
    pub site: String,
    /// `<working dir>/<dist dir>/<site>`.
    pub site_dist_dir: PathBuf,
    /// Remote prefix of the master release; `None` disables merging.
    pub master_path: Option<String>,
    /// Filename of the merged artifact.
    pub master_bundle: String,
    /// Identifier embedded in the dev-redirect guard.
    pub guard_path: Option<String>,
    /// Absolute or working-dir-relative snippet location.
    pub redirect_snippet: PathBuf,
    /// Base URL for relative component locations.
    pub component_base: Option<String>,
}

impl MasterSettings {
    /// Resolve runtime settings. Fails only when no site name is configured.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let site = config
            .site
            .name
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MasterError::config("no site configured. Set JETPACK_SITE or pass --site")
            })?;

        let working_dir = &config.site.working_dir;
        let master_path = config
            .master
            .path
            .as_deref()
            .filter(|_| config.master.merge_enabled())
            .map(|p| p.trim().trim_matches('/').to_string());

        Ok(Self {
            site_dist_dir: working_dir.join(&config.site.dist_dir).join(&site),
            site,
            master_path,
            master_bundle: config.master.bundle.clone(),
            guard_path: config.storage.public_path.clone(),
            redirect_snippet: working_dir.join(&config.site.redirect_snippet),
            component_base: config.master.component_base.clone(),
        })
    }

    /// Object key of the authoritative master descriptor, when merging is enabled.
    pub fn remote_release_key(&self) -> Option<String> {
        self.master_path.as_deref().map(|prefix| {
            if prefix.is_empty() {
                format!("{}/{RELEASE_FILE}", self.site)
            } else {
                format!("{prefix}/{}/{RELEASE_FILE}", self.site)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path of the config file inside `working_dir`.
pub fn config_file_path(working_dir: &Path) -> PathBuf {
    working_dir.join(CONFIG_FILE_NAME)
}

/// Load the project config from `working_dir`. Returns defaults if the file does not exist.
pub fn load_config(working_dir: &Path) -> Result<AppConfig> {
    let path = config_file_path(working_dir);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the project config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MasterError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MasterError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file into `working_dir`. Returns the path to the created file.
pub fn init_config(working_dir: &Path) -> Result<PathBuf> {
    let path = config_file_path(working_dir);
    if path.exists() {
        return Err(MasterError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| MasterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MasterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
