//! Release descriptor types and the master merge helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ComponentDescriptor
// ---------------------------------------------------------------------------

/// One deployable component as recorded in a master's component list.
///
/// Identity is `url`; two descriptors with the same `url` describe the same
/// component at (possibly) different versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Base location of the component; also its unique key.
    pub url: String,
    /// Released version string.
    pub version: String,
    /// Artifact filename within the versioned directory.
    pub bundle: String,
}

impl ComponentDescriptor {
    /// Where the released artifact lives: `{url}{version}/{bundle}`.
    ///
    /// This is plain concatenation; `url` is expected to carry its own
    /// trailing separator.
    pub fn remote_location(&self) -> String {
        format!("{}{}/{}", self.url, self.version, self.bundle)
    }
}

// ---------------------------------------------------------------------------
// MasterSection
// ---------------------------------------------------------------------------

/// The `master` block of a merged release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSection {
    /// Filename of the merged artifact.
    pub bundle: String,
    /// Merged components, in the order their code is concatenated.
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
}

// ---------------------------------------------------------------------------
// ReleaseDescriptor
// ---------------------------------------------------------------------------

/// A `release.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub url: String,
    pub version: String,
    /// Externally visible artifact pointer.
    pub bundle: String,
    /// Present only on merged/master releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterSection>,
    /// Keys written by other release tooling, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReleaseDescriptor {
    /// The project's own component entry. Never carries a nested master.
    pub fn component(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            url: self.url.clone(),
            version: self.version.clone(),
            bundle: self.bundle.clone(),
        }
    }

    /// Copy of this descriptor with the `master` section removed.
    pub fn without_master(&self) -> Self {
        Self {
            master: None,
            ..self.clone()
        }
    }

    /// Components of the master section, or an empty slice.
    pub fn master_components(&self) -> &[ComponentDescriptor] {
        self.master
            .as_ref()
            .map(|m| m.components.as_slice())
            .unwrap_or(&[])
    }

    /// Consume the descriptor and return it with `section` as its master.
    pub fn with_master(self, section: MasterSection) -> Self {
        Self {
            master: Some(section),
            ..self
        }
    }

    /// The canonical master record: top-level `bundle` points at the merged
    /// artifact. `None` when there is no master section to promote.
    pub fn promoted(&self) -> Option<Self> {
        let master = self.master.as_ref()?;
        Some(Self {
            bundle: master.bundle.clone(),
            ..self.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge the project's fresh descriptor into an existing master component list.
///
/// The first entry sharing the project's `url` is replaced in place; any later
/// entry with that `url` is dropped so the project appears exactly once.
/// Other entries keep their values and relative order. Without a match the
/// project is appended.
pub fn merge_components(
    existing: &[ComponentDescriptor],
    project: &ComponentDescriptor,
) -> Vec<ComponentDescriptor> {
    let mut merged = Vec::with_capacity(existing.len() + 1);
    let mut placed = false;

    for component in existing {
        if component.url == project.url {
            if !placed {
                merged.push(project.clone());
                placed = true;
            }
        } else {
            merged.push(component.clone());
        }
    }

    if !placed {
        merged.push(project.clone());
    }

    merged
}
