//! Persisted encoded manifest documents.
//!
//! The three sub-documents are stored as separate encoded blobs rather than
//! one file, with `_temp`/`_old` variants used by the promote protocol
//! (component G) to implement its file-level half of the two-phase commit:
//! a new package/resources document is written to its `_temp` file first,
//! and only renamed over the live file once every download has succeeded,
//! so a crash mid-promote leaves the previously-committed document intact.

use std::path::Path;

use crate::error::Result;
use crate::manifest::{Config, Manifest, Package, Resources};
use crate::store::FileStore;

pub const MANIFEST_FOLDER: &str = "manifest";

const APP_CONFIG_DATA_FILE_NAME: &str = "app_config.data";
const APP_PACKAGE_DATA_FILE_NAME: &str = "app_package.data";
const APP_PACKAGE_DATA_TEMP_FILE_NAME: &str = "app_package_temp.data";
const APP_RESOURCES_DATA_FILE_NAME: &str = "app_resources.data";
const APP_OLD_RESOURCES_DATA_FILE_NAME: &str = "app_resources_old.data";
const APP_TEMP_RESOURCES_DATA_FILE_NAME: &str = "app_resources_temp.data";

pub struct ManifestStore<'a> {
    store: &'a FileStore,
}

impl<'a> ManifestStore<'a> {
    pub fn new(store: &'a FileStore) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<Manifest> {
        let config: Config = self.store.decode(MANIFEST_FOLDER, APP_CONFIG_DATA_FILE_NAME).await?;
        let package: Package = self.store.decode(MANIFEST_FOLDER, APP_PACKAGE_DATA_FILE_NAME).await?;
        let resources: Resources = self.store.decode(MANIFEST_FOLDER, APP_RESOURCES_DATA_FILE_NAME).await?;
        Ok(Manifest { config, package, resources })
    }

    pub async fn exists(&self) -> bool {
        self.store.exists(MANIFEST_FOLDER, APP_CONFIG_DATA_FILE_NAME).await
    }

    /// Persist `manifest` as the live documents, all three in one call.
    /// Used for the very first write (seeding from bundled defaults) where
    /// there is no previous state to stage against.
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        self.store.encode_and_write(MANIFEST_FOLDER, APP_CONFIG_DATA_FILE_NAME, &manifest.config).await?;
        self.store.encode_and_write(MANIFEST_FOLDER, APP_PACKAGE_DATA_FILE_NAME, &manifest.package).await?;
        self.store.encode_and_write(MANIFEST_FOLDER, APP_RESOURCES_DATA_FILE_NAME, &manifest.resources).await
    }

    /// Stage `package`/`resources` into their `_temp` files ahead of a
    /// promote attempt, without disturbing the currently-live documents.
    pub async fn stage_temp(&self, package: &Package, resources: &Resources) -> Result<()> {
        self.store.encode_and_write(MANIFEST_FOLDER, APP_PACKAGE_DATA_TEMP_FILE_NAME, package).await?;
        self.store.encode_and_write(MANIFEST_FOLDER, APP_TEMP_RESOURCES_DATA_FILE_NAME, resources).await
    }

    /// Snapshot the currently-live resources document to `_old`, for
    /// rollback reference if promote fails partway through.
    pub async fn snapshot_old_resources(&self) -> Result<()> {
        if let Ok(resources) = self.store.decode::<Resources>(MANIFEST_FOLDER, APP_RESOURCES_DATA_FILE_NAME).await {
            self.store.encode_and_write(MANIFEST_FOLDER, APP_OLD_RESOURCES_DATA_FILE_NAME, &resources).await?;
        }
        Ok(())
    }

    /// Promote the documents staged by [`Self::stage_temp`] to live: the new
    /// config is written directly (it has no staging file, since it is
    /// never downloaded), and the staged package/resources documents are
    /// renamed over the live ones. Each rename is atomic, so a crash
    /// between them can leave the package and resources documents out of
    /// step with each other but never leaves either one partially written.
    /// Must be called after `stage_temp` with the same package/resources.
    pub async fn commit(&self, config: &Config) -> Result<()> {
        self.store.encode_and_write(MANIFEST_FOLDER, APP_CONFIG_DATA_FILE_NAME, config).await?;

        let package_temp = self.store.resolve(MANIFEST_FOLDER, APP_PACKAGE_DATA_TEMP_FILE_NAME)?;
        self.store.move_into(&package_temp, MANIFEST_FOLDER, APP_PACKAGE_DATA_FILE_NAME).await?;

        let resources_temp = self.store.resolve(MANIFEST_FOLDER, APP_TEMP_RESOURCES_DATA_FILE_NAME)?;
        self.store.move_into(&resources_temp, MANIFEST_FOLDER, APP_RESOURCES_DATA_FILE_NAME).await
    }

    pub async fn folder_path(&self) -> &Path {
        self.store.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Resource;
    use crate::store::EmptyAssetBundle;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample_manifest() -> Manifest {
        Manifest {
            config: Config::new("1.0.0", Duration::from_secs(5)),
            package: Package {
                name: "host".into(),
                version: "1.0.0".into(),
                index: Resource::new("https://cdn/i", "index.jsbundle"),
                properties: Default::default(),
                important: vec![],
                lazy: vec![],
            },
            resources: Resources::default(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
        let manifest_store = ManifestStore::new(&store);
        let manifest = sample_manifest();
        manifest_store.save(&manifest).await.unwrap();
        let loaded = manifest_store.load().await.unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn stage_temp_does_not_touch_live_documents() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
        let manifest_store = ManifestStore::new(&store);
        let manifest = sample_manifest();
        manifest_store.save(&manifest).await.unwrap();

        let mut new_package = manifest.package.clone();
        new_package.version = "2.0.0".into();
        manifest_store.stage_temp(&new_package, &manifest.resources).await.unwrap();

        let still_live = manifest_store.load().await.unwrap();
        assert_eq!(still_live.package.version, "1.0.0");
    }

    #[tokio::test]
    async fn commit_renames_staged_documents_over_live_and_clears_staging_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
        let manifest_store = ManifestStore::new(&store);
        let manifest = sample_manifest();
        manifest_store.save(&manifest).await.unwrap();

        let mut new_package = manifest.package.clone();
        new_package.version = "2.0.0".into();
        manifest_store.stage_temp(&new_package, &manifest.resources).await.unwrap();
        manifest_store.commit(&manifest.config).await.unwrap();

        assert!(!store.exists(MANIFEST_FOLDER, APP_PACKAGE_DATA_TEMP_FILE_NAME).await);
        assert!(!store.exists(MANIFEST_FOLDER, APP_TEMP_RESOURCES_DATA_FILE_NAME).await);

        let loaded = manifest_store.load().await.unwrap();
        assert_eq!(loaded.package.version, "2.0.0");
    }
}
