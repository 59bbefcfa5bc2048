//! Process registry (component M): the process-scoped `namespace -> Manager`
//! map backing the per-workspace singleton rule.
//!
//! A `parking_lot::Mutex` guards a plain `HashMap`: one lock, short
//! critical sections, nothing awaited while held, matching how the crate
//! uses `parking_lot` everywhere else it needs synchronous shared state.

use std::collections::HashMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::delegate::SharedDelegate;
use crate::manager::{Manager, State};
use crate::manifest::Manifest;
use crate::store::FileStore;

static REGISTRY: Lazy<Mutex<HashMap<String, Manager>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Return the existing manager for `namespace`, or spawn a fresh one via
/// `build` if none exists yet or the existing one is in a terminal-failed
/// state (the reuse-unless-terminal-failed rule).
pub async fn shared_instance<F>(namespace: &str, build: F) -> Manager
where
    F: FnOnce() -> (PathBuf, SharedDelegate, FileStore, Manifest),
{
    if let Some(existing) = REGISTRY.lock().get(namespace).cloned() {
        if existing.state().await != State::Failed {
            return existing;
        }
    }

    let (workspace_root, delegate, store, initial_manifest) = build();
    let manager = Manager::spawn(namespace, workspace_root, delegate, store, initial_manifest);
    REGISTRY.lock().insert(namespace.to_string(), manager.clone());
    manager
}

/// Test/diagnostic hook: drop every registered manager. Not exposed on the
/// public facade; a running host never needs to clear the whole registry.
#[cfg(test)]
pub(crate) fn clear_for_test() {
    REGISTRY.lock().clear();
}
