//! Host facade (component I): the narrow surface an embedding application
//! actually calls — `sharedInstance` plus path/content lookups layered over
//! a running [`Manager`].
//!
//! A thin wrapper that hides the actor/channel plumbing behind plain
//! async methods.

use std::path::PathBuf;
use std::time::Duration;

use crate::delegate::SharedDelegate;
use crate::error::{EngineError, Result};
use crate::manager::{Manager, Readiness, State};
use crate::manifest::{DownloadResult, Manifest};
use crate::registry;
use crate::store::{EmptyAssetBundle, FileStore};
use crate::workspace::{self, PACKAGE_MAIN, RESOURCES_MAIN};

/// A handle a host keeps around for the lifetime of one namespace.
pub struct Engine {
    namespace: String,
    workspace_root: PathBuf,
    manager: Manager,
}

impl Engine {
    /// Return the shared engine for `namespace`, creating it on first use
    /// (or replacing it if the previous one ended in a terminal failure).
    ///
    /// `workspace_root` defaults to [`workspace::default_root`]; pass one
    /// explicitly to point at a custom data directory.
    pub async fn shared_instance(
        namespace: impl Into<String>,
        workspace_root: Option<PathBuf>,
        delegate: SharedDelegate,
        initial_manifest: Manifest,
    ) -> Self {
        let namespace = namespace.into();
        let root = workspace_root.unwrap_or_else(|| workspace::default_root(&namespace));
        let root_for_build = root.clone();
        let delegate_for_build = delegate.clone();
        let manifest_for_build = initial_manifest.clone();

        let manager = registry::shared_instance(&namespace, move || {
            let store = FileStore::new(root_for_build.clone(), Box::new(EmptyAssetBundle));
            (root_for_build, delegate_for_build, store, manifest_for_build)
        })
        .await;

        Self { namespace, workspace_root: root, manager }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Block until the current boot's package/resource download reaches a
    /// terminal outcome.
    pub async fn wait_for_packages_and_resources(&self) -> DownloadResult {
        self.manager.wait_for_packages_and_resources().await
    }

    pub async fn state(&self) -> State {
        self.manager.state().await
    }

    pub async fn readiness(&self) -> Readiness {
        self.manager.readiness().await
    }

    /// Absolute path to the live index file, i.e. the entry point the host
    /// should load after a successful boot.
    pub async fn bundle_path(&self) -> Result<PathBuf> {
        let manifest = self.current_manifest().await?;
        Ok(self.workspace_root.join(PACKAGE_MAIN).join(&manifest.package.index.file_path))
    }

    /// Read a file's bytes, preferring `package/main/` then falling back to
    /// `resources/main/`.
    pub async fn file_content(&self, relative_path: &str) -> Result<Vec<u8>> {
        let store = self.store();
        match store.read_local(PACKAGE_MAIN, relative_path).await {
            Ok(bytes) => Ok(bytes),
            Err(EngineError::NotFound(_)) => store.read_local(RESOURCES_MAIN, relative_path).await,
            Err(other) => Err(other),
        }
    }

    /// Absolute path to a package file, for hosts that want to load it
    /// directly rather than reading bytes through the engine.
    pub async fn path_for_package_file(&self, file_name: &str) -> Result<PathBuf> {
        let store = self.store();
        let path = store.resolve(PACKAGE_MAIN, file_name)?;
        if !store.exists(PACKAGE_MAIN, file_name).await {
            return Err(EngineError::NotFound(path));
        }
        Ok(path)
    }

    pub async fn current_manifest(&self) -> Result<Manifest> {
        self.manager
            .current_manifest()
            .await
            .ok_or_else(|| EngineError::DelegateFetchFailed("manager task gone".into()))
    }

    pub async fn get_release_config(&self) -> Result<Manifest> {
        self.current_manifest().await
    }

    pub async fn package_timeout(&self) -> Result<Duration> {
        Ok(self.current_manifest().await?.config.boot_timeout())
    }

    pub async fn release_config_timeout(&self) -> Result<Duration> {
        Ok(self.current_manifest().await?.config.release_config_timeout())
    }

    /// Fetch one lazy resource on demand.
    pub async fn resolve_lazy_package(&self, file_path: impl Into<String>) -> Result<()> {
        self.manager.resolve_lazy(file_path).await
    }

    fn store(&self) -> FileStore {
        FileStore::new(self.workspace_root.clone(), Box::new(EmptyAssetBundle))
    }
}
