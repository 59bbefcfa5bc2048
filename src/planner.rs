//! Download planner (component F): diff a target manifest against on-disk
//! state to produce the three ordered task sets the manager executes.

use std::path::Path;

use crate::manifest::{Manifest, Resource};
use crate::remote_file::sha256_of_file;

/// One file that needs to be fetched (or re-fetched) into a `main/`
/// directory, identified by `resource.file_path`.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub resource: Resource,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub important: Vec<DownloadTask>,
    pub resources: Vec<DownloadTask>,
    pub lazy: Vec<DownloadTask>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.important.is_empty() && self.resources.is_empty() && self.lazy.is_empty()
    }

    pub fn important_and_resource_count(&self) -> usize {
        self.important.len() + self.resources.len()
    }
}

/// `true` if `resource.file_path` is absent from `main_dir`, or present but
/// (when a checksum is declared) hashing to something else.
pub async fn needs_download(resource: &Resource, main_dir: &Path) -> bool {
    let path = main_dir.join(&resource.file_path);
    let Ok(metadata) = tokio::fs::metadata(&path).await else {
        return true;
    };
    if !metadata.is_file() {
        return true;
    }
    match &resource.checksum {
        None => false,
        Some(expected) => match sha256_of_file(&path).await {
            Ok(actual) => !actual.eq_ignore_ascii_case(expected),
            Err(_) => true,
        },
    }
}

/// Build the plan for `new` against the current contents of
/// `package_main_dir` and `resources_main_dir`. Task ordering within each
/// set is stable by `file_path` (sorted), so repeated runs over the same
/// inputs produce byte-identical plans.
pub async fn plan(new: &Manifest, package_main_dir: &Path, resources_main_dir: &Path) -> Plan {
    let mut important = Vec::new();
    for resource in new.package.all_important_splits() {
        if needs_download(resource, package_main_dir).await {
            important.push(DownloadTask { resource: resource.clone() });
        }
    }
    important.sort_by(|a, b| a.resource.file_path.cmp(&b.resource.file_path));

    let mut resources = Vec::new();
    for resource in new.resources.values() {
        if needs_download(resource, resources_main_dir).await {
            resources.push(DownloadTask { resource: resource.clone() });
        }
    }
    resources.sort_by(|a, b| a.resource.file_path.cmp(&b.resource.file_path));

    let mut lazy = Vec::new();
    for lazy_resource in &new.package.lazy {
        if lazy_resource.is_downloaded {
            continue;
        }
        if needs_download(&lazy_resource.resource, package_main_dir).await {
            lazy.push(DownloadTask { resource: lazy_resource.resource.clone() });
        }
    }
    lazy.sort_by(|a, b| a.resource.file_path.cmp(&b.resource.file_path));

    Plan { important, resources, lazy }
}
