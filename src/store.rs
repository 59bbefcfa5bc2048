//! File store (component A): a bounded, workspace-scoped filesystem surface.
//!
//! Every operation resolves its `folder`/`name` pair inside the workspace
//! root and rejects anything that would escape it with
//! [`EngineError::PathEscape`]. This is the crate's one full trust boundary
//! around the host filesystem; nothing else in the crate touches paths
//! directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;

use crate::error::{EngineError, IoContext, Result};
use crate::manifest::codec;

/// Source of default/fallback assets shipped inside the host application
/// image. The engine never writes to it; `readBundled` is the only read
/// path. A mobile host implements this over its own asset-catalog API; the
/// crate ships [`DirAssetBundle`] for the demo binary and tests.
pub trait AssetBundle: Send + Sync {
    fn read(&self, name: &str) -> Option<Vec<u8>>;
}

/// Reads bundled assets from a plain directory, standing in for a platform
/// asset catalog.
pub struct DirAssetBundle {
    root: PathBuf,
}

impl DirAssetBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetBundle for DirAssetBundle {
    fn read(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root.join(name)).ok()
    }
}

/// An empty bundle, for workspaces with no fallback assets (every read
/// falls through to `NotFound`).
pub struct EmptyAssetBundle;

impl AssetBundle for EmptyAssetBundle {
    fn read(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    bundle: Arc<dyn AssetBundle>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, bundle: Box<dyn AssetBundle>) -> Self {
        Self { root: root.into(), bundle: Arc::from(bundle) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `folder/name` inside the workspace root, rejecting any path
    /// that would escape it (no `..`, no absolute component).
    pub fn resolve(&self, folder: &str, name: &str) -> Result<PathBuf> {
        if Path::new(folder).is_absolute() || Path::new(name).is_absolute() {
            return Err(EngineError::PathEscape {
                path: self.root.join(folder).join(name),
            });
        }
        for segment in folder.split('/').chain(name.split('/')) {
            if segment == ".." {
                return Err(EngineError::PathEscape {
                    path: self.root.join(folder).join(name),
                });
            }
        }
        Ok(self.root.join(folder).join(name))
    }

    pub fn read_bundled(&self, name: &str) -> Result<Vec<u8>> {
        self.bundle
            .read(name)
            .ok_or_else(|| EngineError::NotFound(PathBuf::from(name)))
    }

    pub async fn read_local(&self, folder: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(folder, name)?;
        fs::read(&path).await.map_err(|cause| {
            if cause.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotFound(path)
            } else {
                EngineError::Io { op: "read_local", path, cause }
            }
        })
    }

    pub async fn read_local_or_bundled(&self, folder: &str, name: &str) -> Result<Vec<u8>> {
        match self.read_local(folder, name).await {
            Ok(bytes) => Ok(bytes),
            Err(EngineError::NotFound(_)) => self.read_bundled(name),
            Err(other) => Err(other),
        }
    }

    pub async fn write_local(&self, folder: &str, name: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_folder(folder).await?;
        let path = self.resolve(folder, name)?;
        fs::write(&path, bytes).await.io_ctx("write_local", path)
    }

    /// Move a file already on disk (e.g. a finished `temp/` download) into
    /// `folder/name`, overwriting any existing file there. Atomic when the
    /// source and destination share a filesystem, which is guaranteed here
    /// because both live under the workspace root.
    pub async fn move_into(&self, src_path: &Path, folder: &str, name: &str) -> Result<()> {
        self.ensure_folder(folder).await?;
        let dest = self.resolve(folder, name)?;
        fs::rename(src_path, &dest)
            .await
            .io_ctx("move_into", dest)
    }

    pub async fn ensure_folder(&self, folder: &str) -> Result<()> {
        let path = self.resolve(folder, "")?;
        fs::create_dir_all(&path).await.io_ctx("ensure_folder", path)
    }

    pub async fn delete(&self, folder: &str, name: &str) -> Result<()> {
        let path = self.resolve(folder, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(cause) => Err(EngineError::Io { op: "delete", path, cause }),
        }
    }

    pub async fn exists(&self, folder: &str, name: &str) -> bool {
        match self.resolve(folder, name) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Decode an encoded blob (see `manifest::codec`) from `folder/name`.
    pub async fn decode<T: DeserializeOwned>(&self, folder: &str, name: &str) -> Result<T> {
        let bytes = self.read_local(folder, name).await?;
        codec::decode(&bytes)
    }

    pub async fn encode_and_write<T: Serialize>(&self, folder: &str, name: &str, value: &T) -> Result<()> {
        let bytes = codec::encode(value)?;
        self.write_local(folder, name, &bytes).await
    }
}
