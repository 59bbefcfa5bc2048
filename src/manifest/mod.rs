//! The manifest data model: `Manifest = (Config, Package, Resources)`.
//!
//! This is a pure value type — no cyclic references, no interior mutability.
//! Parsing enforces the path-safety invariant; the
//! encoded on-disk representation lives in [`codec`].

pub mod codec;
pub mod config;
pub mod diff;
pub mod package;
pub mod resource;
pub mod resources;

pub use config::Config;
pub use diff::{ManifestDiff, diff as diff_manifests};
pub use package::Package;
pub use resource::{LazyResource, Resource};
pub use resources::Resources;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// `{ config, package, resources }` — the full release configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub config: Config,
    pub package: Package,
    pub resources: Resources,
}

impl Manifest {
    /// Parse `{ "config": ..., "package": ..., "resources": ... }`.
    ///
    /// Unknown top-level keys are ignored (`serde` default behavior without
    /// `deny_unknown_fields`). Fails if any `filePath` is empty or contains
    /// a `..` segment.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_slice(bytes);
        let mut manifest: Manifest =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|e| EngineError::Decode {
                field_path: e.path().to_string(),
                reason: e.to_string(),
            })?;
        manifest.config.normalize();
        manifest.validate_paths()?;
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| EngineError::Decode {
            field_path: "$".into(),
            reason: e.to_string(),
        })
    }

    fn validate_paths(&self) -> Result<()> {
        if !self.package.all_paths_safe() {
            return Err(EngineError::Decode {
                field_path: "package".into(),
                reason: "a package file_path is empty or escapes the workspace".into(),
            });
        }
        if !self.resources.all_paths_safe() {
            return Err(EngineError::Decode {
                field_path: "resources".into(),
                reason: "a resource file_path is empty or escapes the workspace".into(),
            });
        }
        if !self.package.is_disjoint() {
            return Err(EngineError::Decode {
                field_path: "package".into(),
                reason: "important and lazy splits are not disjoint by file_path".into(),
            });
        }
        Ok(())
    }

    pub fn diff(&self, new: &Manifest) -> ManifestDiff {
        diff_manifests(self, new)
    }
}

/// The host-visible outcome of a boot's update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    Ok,
    Error,
    PackageDownloadFailed,
    PackageTimedout,
    ReleaseConfigTimedout,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Ok => "OK",
            DownloadStatus::Error => "ERROR",
            DownloadStatus::PackageDownloadFailed => "PACKAGE_DOWNLOAD_FAILED",
            DownloadStatus::PackageTimedout => "PACKAGE_TIMEDOUT",
            DownloadStatus::ReleaseConfigTimedout => "RELEASE_CONFIG_TIMEDOUT",
        }
    }
}

/// `{ status, manifest, error }` returned from `waitForPackagesAndResources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub status: DownloadStatus,
    pub manifest: Manifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResult {
    pub fn ok(manifest: Manifest) -> Self {
        Self {
            status: DownloadStatus::Ok,
            manifest,
            error: None,
        }
    }

    pub fn failed(status: DownloadStatus, manifest: Manifest, error: impl Into<String>) -> Self {
        Self {
            status,
            manifest,
            error: Some(error.into()),
        }
    }
}
