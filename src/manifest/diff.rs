//! Structural diff between two manifests, used by the planner and by
//! the manager's "is this release config a no-op" check.

use std::collections::HashSet;

use super::Manifest;

/// The result of comparing an `old` manifest against a `new` one.
///
/// Two [`crate::manifest::Resource`]s are equal iff `(url, file_path,
/// checksum)` are equal — this is exactly `PartialEq` on `Resource`, so the
/// diff is expressed in terms of file-path set membership plus that
/// equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub package_adds: Vec<String>,
    pub package_removes: Vec<String>,
    pub resource_adds: Vec<String>,
    pub resource_removes: Vec<String>,
    pub config_changed: bool,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.package_adds.is_empty()
            && self.package_removes.is_empty()
            && self.resource_adds.is_empty()
            && self.resource_removes.is_empty()
            && !self.config_changed
    }
}

pub fn diff(old: &Manifest, new: &Manifest) -> ManifestDiff {
    let old_splits: HashSet<&str> = old.package.all_splits().iter().map(|r| r.file_path.as_str()).collect();
    let new_splits: HashSet<&str> = new.package.all_splits().iter().map(|r| r.file_path.as_str()).collect();

    let old_resources: HashSet<&str> = old.resources.values().map(|r| r.file_path.as_str()).collect();
    let new_resources: HashSet<&str> = new.resources.values().map(|r| r.file_path.as_str()).collect();

    // An "add" in this diff means a path present in `new` whose Resource
    // actually differs from (or is absent from) `old` — an unchanged file
    // re-listed at the same path is not a diff, matching needs-download
    // semantics in the planner.
    let package_adds = new
        .package
        .all_splits()
        .into_iter()
        .filter(|r| find_by_path(old.package.all_splits(), &r.file_path).map(|old_r| old_r != *r).unwrap_or(true))
        .map(|r| r.file_path.clone())
        .collect();

    let package_removes = old_splits
        .difference(&new_splits)
        .map(|p| p.to_string())
        .collect();

    let resource_adds = new
        .resources
        .values()
        .filter(|r| old.resources.get(&r.file_path).map(|old_r| old_r != *r).unwrap_or(true))
        .map(|r| r.file_path.clone())
        .collect();

    let resource_removes = old_resources
        .difference(&new_resources)
        .map(|p| p.to_string())
        .collect();

    ManifestDiff {
        package_adds,
        package_removes,
        resource_adds,
        resource_removes,
        config_changed: old.config != new.config,
    }
}

fn find_by_path<'a>(resources: Vec<&'a super::Resource>, file_path: &str) -> Option<&'a super::Resource> {
    resources.into_iter().find(|r| r.file_path == file_path)
}
