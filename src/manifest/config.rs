//! [`Config`]: boot timeout, release-config timeout, and free-form properties.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `config` sub-document of a manifest.
///
/// `release_config_timeout` defaults to `boot_timeout` when absent, and is
/// clamped to `boot_timeout` when larger (resolved in `DESIGN.md`:
/// clamp, not reject).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(rename = "bootTimeout")]
    pub boot_timeout_ms: u64,
    #[serde(rename = "releaseConfigTimeout", skip_serializing_if = "Option::is_none")]
    release_config_timeout_ms: Option<u64>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Config {
    pub fn new(version: impl Into<String>, boot_timeout: Duration) -> Self {
        let mut cfg = Self {
            version: version.into(),
            boot_timeout_ms: boot_timeout.as_millis() as u64,
            release_config_timeout_ms: None,
            properties: BTreeMap::new(),
        };
        cfg.normalize();
        cfg
    }

    /// Clamp `release_config_timeout` to `boot_timeout` and default it when
    /// absent. Idempotent; called on every load and on construction.
    pub fn normalize(&mut self) {
        if self.boot_timeout_ms == 0 {
            self.boot_timeout_ms = 1;
        }
        match self.release_config_timeout_ms {
            None => self.release_config_timeout_ms = Some(self.boot_timeout_ms),
            Some(rc) if rc > self.boot_timeout_ms => {
                tracing::warn!(
                    configured = rc,
                    clamped_to = self.boot_timeout_ms,
                    "releaseConfigTimeout exceeds bootTimeout, clamping"
                );
                self.release_config_timeout_ms = Some(self.boot_timeout_ms);
            }
            Some(_) => {}
        }
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    pub fn release_config_timeout(&self) -> Duration {
        Duration::from_millis(
            self.release_config_timeout_ms
                .unwrap_or(self.boot_timeout_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_release_config_timeout_to_boot_timeout() {
        let cfg = Config::new("1.0.0", Duration::from_millis(5000));
        assert_eq!(cfg.release_config_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn clamps_oversized_release_config_timeout() {
        let json = r#"{"version":"1.0.0","bootTimeout":1000,"releaseConfigTimeout":9000}"#;
        let mut cfg: Config = serde_json::from_str(json).unwrap();
        cfg.normalize();
        assert_eq!(cfg.release_config_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn preserves_release_config_timeout_within_bounds() {
        let json = r#"{"version":"1.0.0","bootTimeout":5000,"releaseConfigTimeout":2000}"#;
        let mut cfg: Config = serde_json::from_str(json).unwrap();
        cfg.normalize();
        assert_eq!(cfg.release_config_timeout(), Duration::from_millis(2000));
    }
}
