//! Staging + promote (component G): the two-phase commit that moves a
//! fully-downloaded package/resource set into `main/`.
//!
//! Scoped acquisition with guaranteed cleanup on every exit path:
//! [`Stager::promote`] always either releases the
//! backup on success or restores from it on failure before returning.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::blacklist::Blacklist;
use crate::error::{EngineError, IoContext, Result};
use crate::manifest::{Manifest, Resource};
use crate::manifest_store::ManifestStore;
use crate::planner::Plan;
use crate::remote_file::RemoteFileUtil;
use crate::store::FileStore;
use crate::workspace::{BACKUP_MAIN, PACKAGE_MAIN, PACKAGE_TEMP, RESOURCES_MAIN, RESOURCES_TEMP};

pub struct Stager<'a> {
    store: &'a FileStore,
    remote: &'a RemoteFileUtil,
}

impl<'a> Stager<'a> {
    pub fn new(store: &'a FileStore, remote: &'a RemoteFileUtil) -> Self {
        Self { store, remote }
    }

    /// Run the promote half of the protocol: backup,
    /// move staged files into `main/`, prune stale entries, and persist the
    /// new manifest — or restore the backup and blacklist the version.
    pub async fn promote(
        &self,
        new: &Manifest,
        plan: &Plan,
        blacklist: &mut Blacklist,
    ) -> Result<()> {
        self.backup_main().await?;

        let outcome: Result<()> = async {
            self.move_and_prune(new, plan).await?;
            let manifest_store = ManifestStore::new(self.store);
            manifest_store.snapshot_old_resources().await.ok();
            manifest_store.stage_temp(&new.package, &new.resources).await?;
            manifest_store.commit(&new.config).await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.release_backup().await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "promote failed, restoring backup");
                self.restore_backup().await?;
                blacklist.insert(new.package.version.clone());
                Err(EngineError::PromoteAborted(e.to_string()))
            }
        }
    }

    async fn move_and_prune(&self, new: &Manifest, plan: &Plan) -> Result<()> {
        for task in &plan.important {
            self.move_into_main(&task.resource.file_path, PACKAGE_TEMP, PACKAGE_MAIN).await?;
        }
        for task in &plan.resources {
            self.move_into_main(&task.resource.file_path, RESOURCES_TEMP, RESOURCES_MAIN).await?;
        }

        let keep_package: std::collections::HashSet<&str> =
            new.package.all_splits().iter().map(|r| r.file_path.as_str()).collect();
        self.prune_unreferenced(PACKAGE_MAIN, &keep_package).await?;

        let keep_resources: std::collections::HashSet<&str> =
            new.resources.values().map(|r| r.file_path.as_str()).collect();
        self.prune_unreferenced(RESOURCES_MAIN, &keep_resources).await?;
        Ok(())
    }

    async fn move_into_main(&self, file_path: &str, temp_dir: &str, main_dir: &str) -> Result<()> {
        let temp_path = self.store.resolve(temp_dir, file_path)?;
        if tokio::fs::metadata(&temp_path).await.is_ok() {
            self.store.move_into(&temp_path, main_dir, file_path).await?;
        }
        Ok(())
    }

    async fn prune_unreferenced(&self, main_dir: &str, keep: &std::collections::HashSet<&str>) -> Result<()> {
        let root = match self.store.resolve(main_dir, "") {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };
        if tokio::fs::metadata(&root).await.is_err() {
            return Ok(());
        }
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if !keep.contains(relative.as_str()) {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
        Ok(())
    }

    async fn backup_main(&self) -> Result<()> {
        self.clear_dir(BACKUP_MAIN).await?;
        self.copy_tree(PACKAGE_MAIN, &format!("{BACKUP_MAIN}/package")).await?;
        self.copy_tree(RESOURCES_MAIN, &format!("{BACKUP_MAIN}/resources")).await?;
        Ok(())
    }

    async fn restore_backup(&self) -> Result<()> {
        self.clear_dir(PACKAGE_MAIN).await?;
        self.clear_dir(RESOURCES_MAIN).await?;
        self.copy_tree(&format!("{BACKUP_MAIN}/package"), PACKAGE_MAIN).await?;
        self.copy_tree(&format!("{BACKUP_MAIN}/resources"), RESOURCES_MAIN).await?;
        self.clear_dir(BACKUP_MAIN).await
    }

    async fn release_backup(&self) {
        let _ = self.clear_dir(BACKUP_MAIN).await;
    }

    async fn clear_dir(&self, folder: &str) -> Result<()> {
        let path = match self.store.resolve(folder, "") {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };
        if tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::remove_dir_all(&path).await.io_ctx("stage:clear_dir", &path)?;
        }
        tokio::fs::create_dir_all(&path).await.io_ctx("stage:clear_dir:mkdir", path)
    }

    async fn copy_tree(&self, src_folder: &str, dest_folder: &str) -> Result<()> {
        let src_root = match self.store.resolve(src_folder, "") {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };
        if tokio::fs::metadata(&src_root).await.is_err() {
            return Ok(());
        }
        self.store.ensure_folder(dest_folder).await?;
        let dest_root = self.store.resolve(dest_folder, "")?;
        copy_dir_recursive(&src_root, &dest_root).await
    }
}

async fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target: PathBuf = dest.join(relative);
        if entry.file_type().is_dir() {
            tokio::fs::create_dir_all(&target).await.io_ctx("stage:copy_tree:mkdir", &target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.io_ctx("stage:copy_tree:mkdir", parent)?;
            }
            tokio::fs::copy(entry.path(), &target)
                .await
                .io_ctx("stage:copy_tree:copy", &target)?;
        }
    }
    Ok(())
}
