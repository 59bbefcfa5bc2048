//! [`Resource`] and [`LazyResource`]: the leaf nodes of a manifest.

use serde::{Deserialize, Serialize};

/// A single downloadable file: its source URL, its destination path relative
/// to a `main/` directory, and an optional expected SHA-256.
///
/// `file_path` is always forward-slash and must not contain `..` segments;
/// this is enforced at manifest load time (`crate::manifest::Manifest::from_json`),
/// not here, so that a `Resource` built in memory by the planner can be
/// constructed infallibly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub url: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Resource {
    pub fn new(url: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file_path: file_path.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// `filePath` is relative, forward-slash, and has no `..` segment.
    pub fn has_safe_path(&self) -> bool {
        is_safe_relative_path(&self.file_path)
    }
}

pub(crate) fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    path.split('/').all(|segment| segment != "..")
        && path.split('/').all(|segment| !segment.is_empty())
}

/// A [`Resource`] downloaded opportunistically after boot.
///
/// `is_downloaded` is transient: it is always persisted as `false` and
/// recomputed from the state of the sub-manifest it belongs to the next time
/// the process starts (see `DESIGN.md` for the reasoning).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyResource {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default, skip_serializing)]
    pub is_downloaded: bool,
}

impl LazyResource {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            is_downloaded: false,
        }
    }

    pub fn file_path(&self) -> &str {
        &self.resource.file_path
    }
}

impl std::ops::Deref for LazyResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}
