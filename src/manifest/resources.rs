//! [`Resources`]: the `filePath -> Resource` map sub-document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resource::Resource;

/// The `resources` sub-document of a manifest: a mapping keyed by
/// `file_path`, serialized as a JSON object rather than an array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources {
    by_path: BTreeMap<String, Resource>,
}

impl Resources {
    pub fn insert(&mut self, resource: Resource) {
        self.by_path.insert(resource.file_path.clone(), resource);
    }

    pub fn get(&self, file_path: &str) -> Option<&Resource> {
        self.by_path.get(file_path)
    }

    pub fn values(&self) -> impl Iterator<Item = &Resource> {
        self.by_path.values()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn all_paths_safe(&self) -> bool {
        self.by_path.values().all(|r| r.has_safe_path())
    }
}

impl FromIterator<Resource> for Resources {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut resources = Resources::default();
        for r in iter {
            resources.insert(r);
        }
        resources
    }
}
