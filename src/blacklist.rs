//! Blacklist store (component N): package versions that failed to promote
//! for a given workspace, persisted so subsequent boots skip them without
//! re-attempting the download.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result};

const BLACKLIST_FILE: &str = "blacklist.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blacklist {
    versions: BTreeSet<String>,
}

impl Blacklist {
    pub async fn load(workspace_root: &Path) -> Result<Self> {
        let path = blacklist_path(workspace_root);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(cause) => Err(crate::error::EngineError::Io { op: "blacklist:load", path, cause }),
        }
    }

    pub async fn save(&self, workspace_root: &Path) -> Result<()> {
        let path = blacklist_path(workspace_root);
        let bytes = serde_json::to_vec(self).expect("Blacklist serialization is infallible");
        tokio::fs::write(&path, bytes).await.io_ctx("blacklist:save", path)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains(version)
    }

    pub fn insert(&mut self, version: impl Into<String>) {
        self.versions.insert(version.into());
    }
}

fn blacklist_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(BLACKLIST_FILE)
}
