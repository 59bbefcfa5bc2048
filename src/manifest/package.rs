//! [`Package`]: the JS/asset bundle itself — index, important files, and lazy files.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resource::{LazyResource, Resource};

/// The `package` sub-document of a manifest.
///
/// `important` and `lazy` must be disjoint by `file_path`; `all_splits()`
/// returns `index` followed by `important` followed by `lazy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub index: Resource,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub important: Vec<Resource>,
    #[serde(default)]
    pub lazy: Vec<LazyResource>,
}

impl Package {
    /// `important` and `lazy` share no `file_path`.
    pub fn is_disjoint(&self) -> bool {
        let important: HashSet<&str> = self.important.iter().map(|r| r.file_path.as_str()).collect();
        let lazy: HashSet<&str> = self.lazy.iter().map(|r| r.file_path.as_str()).collect();
        important.is_disjoint(&lazy)
    }

    pub fn all_important_splits(&self) -> Vec<&Resource> {
        std::iter::once(&self.index)
            .chain(self.important.iter())
            .collect()
    }

    pub fn all_lazy_splits(&self) -> Vec<&Resource> {
        self.lazy.iter().map(|l| &l.resource).collect()
    }

    pub fn all_splits(&self) -> Vec<&Resource> {
        let mut splits = self.all_important_splits();
        splits.extend(self.all_lazy_splits());
        splits
    }

    pub fn all_paths_safe(&self) -> bool {
        self.all_splits().iter().all(|r| r.has_safe_path())
    }

    pub fn find_lazy_mut(&mut self, file_path: &str) -> Option<&mut LazyResource> {
        self.lazy.iter_mut().find(|l| l.file_path() == file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Package {
        Package {
            name: "host-app".into(),
            version: "1.0.0".into(),
            index: Resource::new("https://cdn/x", "index.jsbundle"),
            properties: BTreeMap::new(),
            important: vec![Resource::new("https://cdn/a", "chunks/a.js")],
            lazy: vec![LazyResource::new(Resource::new("https://cdn/b", "lazy/b.js"))],
        }
    }

    #[test]
    fn all_splits_includes_index_important_and_lazy() {
        let pkg = sample();
        let paths: Vec<&str> = pkg.all_splits().iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["index.jsbundle", "chunks/a.js", "lazy/b.js"]);
    }

    #[test]
    fn disjoint_check_catches_overlap() {
        let mut pkg = sample();
        pkg.lazy.push(LazyResource::new(Resource::new("https://cdn/a", "chunks/a.js")));
        assert!(!pkg.is_disjoint());
    }
}
