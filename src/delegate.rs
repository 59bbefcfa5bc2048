//! Delegate contract: the capability record an embedding host
//! implements to plug into the manager.
//!
//! Every member is optional with a sensible default, expressed as a trait
//! with default-implemented methods rather than a Swift/Obj-C `@optional`
//! protocol — a host only overrides what it needs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::manifest::Manifest;
use crate::tracker::Event;

/// Host-provided policy and callbacks for one workspace.
#[async_trait]
pub trait Delegate: Send + Sync {
    /// Required unless [`Self::fetch_release_config`] is overridden.
    fn release_config_url(&self) -> Option<String> {
        None
    }

    fn release_config_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// When overridden, bypasses the engine's built-in HTTP fetch entirely;
    /// the release-config-timeout timer still applies around this call.
    async fn fetch_release_config(&self, _client_id: &str) -> Option<Result<Manifest>> {
        None
    }

    /// Headers merged into the manifest fetch request, e.g. device/app
    /// dimensions used for targeting.
    fn dimensions(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn should_use_local_assets(&self) -> bool {
        false
    }

    fn should_do_force_update(&self) -> bool {
        true
    }

    /// Called once per boot, off the manager's own task, once a bundle is
    /// known to be usable (either `READY` or a timeout verdict with the
    /// previous manifest).
    async fn on_boot_complete(&self, _bundle_path: &Path) {}

    fn on_event(&self, _event: &Event) {}
}

/// A delegate with every default, for tests and the demo binary's
/// local-assets-only path.
pub struct DefaultDelegate {
    pub url: String,
}

#[async_trait]
impl Delegate for DefaultDelegate {
    fn release_config_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

pub type SharedDelegate = Arc<dyn Delegate>;
