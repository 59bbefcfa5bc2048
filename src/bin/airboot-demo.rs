use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use airboot::manifest::{Config, Package, Resources};
use airboot::{DefaultDelegate, Engine, Manifest, Resource};

/// A minimal seed manifest for a host with no package installed yet:
/// version `0.0.0`, no index file, no important/lazy splits. The first
/// successful release-config fetch always diffs as a full update.
fn seed_manifest() -> Manifest {
    Manifest {
        config: Config::new("0.0.0", Duration::from_secs(10)),
        package: Package {
            name: "demo-host".into(),
            version: "0.0.0".into(),
            index: Resource::new("", "index.jsbundle"),
            properties: Default::default(),
            important: vec![],
            lazy: vec![],
        },
        resources: Resources::default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .init();

    let release_config_url = std::env::var("AIRBOOT_RELEASE_CONFIG_URL")
        .context("set AIRBOOT_RELEASE_CONFIG_URL to the manifest endpoint")?;
    let namespace = std::env::var("AIRBOOT_NAMESPACE").unwrap_or_else(|_| "demo".into());

    let delegate = Arc::new(DefaultDelegate { url: release_config_url });
    let engine = Engine::shared_instance(namespace, None, delegate, seed_manifest()).await;

    let result = engine.wait_for_packages_and_resources().await;
    tracing::info!(status = ?result.status, version = %result.manifest.package.version, "boot finished");

    if result.status == airboot::DownloadStatus::Ok {
        let bundle_path = engine.bundle_path().await?;
        tracing::info!(path = %bundle_path.display(), "bundle ready");
    }

    Ok(())
}
