//! HTTP retrieval of published component bundles.
//!
//! A merged master pulls every component except the local project from the
//! location its descriptor records. [`SourceFetcher`] is the seam the build
//! pipeline depends on; [`HttpFetcher`] is the reqwest-backed implementation.
//! Retries are left to the HTTP client; one failed fetch is one error.

use async_trait::async_trait;
use jetmaster_shared::{MasterError, Result};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

/// Maximum number of redirects to follow when fetching a bundle.
const MAX_REDIRECTS: usize = 5;

/// Default timeout in seconds for a single bundle fetch.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for bundle requests.
const USER_AGENT: &str = concat!("jetmaster/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// SourceFetcher
// ---------------------------------------------------------------------------

/// Fetches the text of a remote component bundle.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `location` and return its body. Any failure is final for the caller.
    async fn fetch_text(&self, location: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Fetch options
// ---------------------------------------------------------------------------

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Timeout for each request in seconds.
    pub timeout_secs: u64,
    /// Base URL that relative component locations are joined onto.
    pub base: Option<Url>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base: None,
        }
    }
}

impl FetchOptions {
    /// Options with `base` parsed from a configured string.
    pub fn with_base(base: Option<&str>) -> Result<Self> {
        let base = base
            .map(|b| {
                Url::parse(b).map_err(|e| {
                    MasterError::config(format!("invalid component base URL '{b}': {e}"))
                })
            })
            .transpose()?;
        Ok(Self {
            base,
            ..Self::default()
        })
    }
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// reqwest-backed [`SourceFetcher`].
pub struct HttpFetcher {
    client: Client,
    base: Option<Url>,
}

impl HttpFetcher {
    /// Create a fetcher with the given options.
    pub fn new(opts: &FetchOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(opts)?,
            base: opts.base.clone(),
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, location: &str) -> Result<String> {
        let url = resolve_location(self.base.as_ref(), location)?;
        let body = fetch_body(&self.client, &url)
            .await
            .map_err(|message| MasterError::component_fetch(location, message))?;

        debug!(%url, bytes = body.len(), "fetched component bundle");
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Turn a descriptor location into an absolute URL.
///
/// Absolute locations are used as-is; anything else is joined onto `base`.
pub fn resolve_location(base: Option<&Url>, location: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }

    let base = base.ok_or_else(|| {
        MasterError::component_fetch(
            location,
            "location is not an absolute URL and no component base is configured",
        )
    })?;

    base.join(location)
        .map_err(|e| MasterError::component_fetch(location, format!("invalid location: {e}")))
}

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &FetchOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| MasterError::config(format!("failed to build HTTP client: {e}")))
}

/// GET `url` and return the body; non-2xx statuses are errors.
async fn fetch_body(client: &Client, url: &Url) -> std::result::Result<String, String> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }

    response
        .text()
        .await
        .map_err(|e| format!("failed to read body: {e}"))
}
