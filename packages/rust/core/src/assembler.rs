//! Master bundle assembler.
//!
//! Concatenates component sources into one artifact. Each component runs in
//! its own wrapper whose `try`/`catch` keeps a throwing component from taking
//! down its siblings, and the whole artifact sits behind the dev-redirect
//! guard so a page can opt into a development build instead.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use jetmaster_shared::{MasterError, Result};
use jetmaster_storage::Workspace;

const GUARD_REDIRECT: &str = "{console.log('jetpack dev redirect');return;} else {";
const CHUNK_CATCH: &str = ";} catch (ex) {'console' in window && console.log(ex);}})();";
const FOOTER: &str = "}})();";

/// One component's code, labelled with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleChunk {
    /// Source location, or `local` for the project's own bundle.
    pub label: String,
    /// Component source text.
    pub source: String,
}

/// Configuration for artifact assembly.
#[derive(Debug, Clone)]
pub struct AssembleConfig {
    /// Dev-redirect snippet template prepended to the artifact.
    pub snippet_path: PathBuf,
    /// Identifier the guard passes to `jpcheck`.
    pub guard_path: String,
    /// Artifact filename inside the workspace.
    pub artifact_name: String,
}

/// Output from a successful assembly.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    /// Path of the written artifact.
    pub path: PathBuf,
    /// SHA-256 of the artifact, hex encoded.
    pub sha256: String,
    pub size_bytes: usize,
    pub chunk_count: usize,
}

/// Render the artifact text.
///
/// Output depends only on the arguments, so identical inputs in identical
/// order give byte-identical artifacts.
///
/// Each chunk runs as plain statements, `try {\n<source>\n;}`, not as the
/// older `try {return <source>;}` expression form. Artifacts therefore differ
/// byte-wise from those of earlier jetpack master builds even for the same
/// components; anything diffing artifacts across the two tools sees changes
/// in every wrapper.
pub fn render_bundle(snippet: &str, guard_path: &str, chunks: &[BundleChunk]) -> String {
    let capacity = snippet.len()
        + chunks
            .iter()
            .map(|c| c.label.len() + c.source.len() + 96)
            .sum::<usize>()
        + 128;
    let mut out = String::with_capacity(capacity);

    out.push_str(snippet);
    out.push_str("!(function(){if(jpcheck('");
    out.push_str(&escape_js_single_quoted(guard_path));
    out.push_str("'))");
    out.push_str(GUARD_REDIRECT);

    for chunk in chunks {
        out.push_str("/*BUNDLE ");
        out.push_str(&chunk.label.replace("*/", "*\\/"));
        out.push_str(" */\n(function(){try {\n");
        out.push_str(&chunk.source);
        // Newline first: a trailing `//` comment in the source must not eat the catch.
        out.push('\n');
        out.push_str(CHUNK_CATCH);
    }

    out.push_str(FOOTER);
    out
}

/// Assemble the master artifact into `workspace`.
///
/// The snippet is loaded before the previous artifact is touched, so a
/// missing snippet leaves the old artifact in place.
#[instrument(skip_all, fields(artifact = %config.artifact_name, chunks = chunks.len()))]
pub async fn assemble(
    config: &AssembleConfig,
    chunks: &[BundleChunk],
    workspace: &Workspace,
) -> Result<AssembleResult> {
    let snippet = load_snippet(&config.snippet_path).await?;
    let bundle = render_bundle(&snippet, &config.guard_path, chunks);

    let path = workspace
        .replace_file(&config.artifact_name, &bundle)
        .await?;

    let sha256 = {
        let mut hasher = Sha256::new();
        hasher.update(bundle.as_bytes());
        format!("{:x}", hasher.finalize())
    };

    info!(
        path = %path.display(),
        size = bundle.len(),
        %sha256,
        "master bundle written"
    );

    Ok(AssembleResult {
        path,
        sha256,
        size_bytes: bundle.len(),
        chunk_count: chunks.len(),
    })
}

async fn load_snippet(path: &std::path::Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(snippet) => {
            debug!(path = %path.display(), "loaded redirect snippet");
            Ok(snippet)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MasterError::SnippetMissing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(MasterError::io(path, e)),
    }
}

/// Escape `s` for use inside a single-quoted JS string literal.
fn escape_js_single_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}
