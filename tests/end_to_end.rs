use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::tempdir;

use airboot::manifest::{Config, Package, Resources};
use airboot::store::{EmptyAssetBundle, FileStore};
use airboot::workspace::PACKAGE_MAIN;
use airboot::{Delegate, DownloadStatus, Engine, Manifest, Resource, State};

fn base_manifest(version: &str, boot_timeout: Duration, index_url: &str) -> Manifest {
    Manifest {
        config: Config::new(version, boot_timeout),
        package: Package {
            name: "host".into(),
            version: version.into(),
            index: Resource::new(index_url, "index.jsbundle"),
            properties: Default::default(),
            important: vec![],
            lazy: vec![],
        },
        resources: Resources::default(),
    }
}

struct UrlDelegate {
    url: String,
}

#[async_trait]
impl Delegate for UrlDelegate {
    fn release_config_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

struct SlowFetchDelegate {
    delay: Duration,
}

#[async_trait]
impl Delegate for SlowFetchDelegate {
    async fn fetch_release_config(&self, _client_id: &str) -> Option<airboot::Result<Manifest>> {
        tokio::time::sleep(self.delay).await;
        None
    }
}

struct NoForceUpdateDelegate {
    url: String,
}

#[async_trait]
impl Delegate for NoForceUpdateDelegate {
    fn release_config_url(&self) -> Option<String> {
        Some(self.url.clone())
    }

    fn should_do_force_update(&self) -> bool {
        false
    }
}

/// Scenario 1: persisted manifest equals the freshly fetched one.
#[tokio::test]
async fn cold_start_unchanged_manifest_reaches_ready_ok() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let current = base_manifest("1.0.0", Duration::from_secs(5), "https://cdn/index");

    let mock = server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&current).unwrap())
        .create_async()
        .await;

    let delegate = Arc::new(UrlDelegate { url: format!("{}/manifest.json", server.url()) });
    let engine = Engine::shared_instance("e2e-cold-unchanged", Some(dir.path().to_path_buf()), delegate, current).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::Ok);
    assert_eq!(engine.state().await, State::Ready);
    mock.assert_async().await;
}

/// Scenario 2: a new important file is added and must be downloaded before promote.
#[tokio::test]
async fn cold_start_new_version_downloads_and_promotes() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
    store.write_local(PACKAGE_MAIN, "index.jsbundle", b"existing-index").await.unwrap();

    let current = base_manifest("1.0.0", Duration::from_secs(5), "https://cdn/index");

    let body = b"new chunk contents";
    let checksum = hex::encode(Sha256::digest(body));
    let mut new_manifest = current.clone();
    new_manifest.package.version = "1.0.1".into();
    new_manifest.package.important.push(
        Resource::new(format!("{}/chunks/a.js", server.url()), "chunks/a.js").with_checksum(checksum),
    );

    let manifest_mock = server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&new_manifest).unwrap())
        .create_async()
        .await;
    let file_mock = server
        .mock("GET", "/chunks/a.js")
        .with_status(200)
        .with_body(body.as_slice())
        .create_async()
        .await;

    let delegate = Arc::new(UrlDelegate { url: format!("{}/manifest.json", server.url()) });
    let engine = Engine::shared_instance("e2e-cold-new-version", Some(dir.path().to_path_buf()), delegate, current).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::Ok);
    assert_eq!(result.manifest.package.version, "1.0.1");
    assert!(store.exists(PACKAGE_MAIN, "chunks/a.js").await);
    assert_eq!(store.read_local(PACKAGE_MAIN, "chunks/a.js").await.unwrap(), body);

    manifest_mock.assert_async().await;
    file_mock.assert_async().await;
}

/// Scenario 3: the release-config fetch exceeds `releaseConfigTimeout`.
#[tokio::test]
async fn release_config_timeout_preserves_previous_manifest() {
    let dir = tempdir().unwrap();
    let mut current = base_manifest("1.0.0", Duration::from_millis(200), "https://cdn/index");
    current.config = Config::new("1.0.0", Duration::from_millis(20));

    let delegate = Arc::new(SlowFetchDelegate { delay: Duration::from_secs(5) });
    let engine = Engine::shared_instance("e2e-rc-timeout", Some(dir.path().to_path_buf()), delegate, current.clone()).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::ReleaseConfigTimedout);
    assert_eq!(result.manifest.package.version, current.package.version);
}

/// Scenario 4: an important file fails its checksum check, even after one retry,
/// and the target version is blacklisted.
#[tokio::test]
async fn checksum_failure_blacklists_target_version() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
    store.write_local(PACKAGE_MAIN, "index.jsbundle", b"existing-index").await.unwrap();

    let current = base_manifest("1.0.0", Duration::from_secs(5), "https://cdn/index");
    let mut new_manifest = current.clone();
    new_manifest.package.version = "1.0.1".into();
    new_manifest.package.important.push(
        Resource::new(format!("{}/chunks/bad.js", server.url()), "chunks/bad.js").with_checksum("deadbeef"),
    );

    server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&new_manifest).unwrap())
        .create_async()
        .await;
    server
        .mock("GET", "/chunks/bad.js")
        .with_status(200)
        .with_body("wrong content")
        .expect(2)
        .create_async()
        .await;

    let delegate = Arc::new(UrlDelegate { url: format!("{}/manifest.json", server.url()) });
    let engine = Engine::shared_instance("e2e-checksum-fail", Some(dir.path().to_path_buf()), delegate, current).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::PackageDownloadFailed);
    assert_eq!(engine.state().await, State::Failed);

    let blacklist = airboot::blacklist::Blacklist::load(dir.path()).await.unwrap();
    assert!(blacklist.contains("1.0.1"));
    assert!(!store.exists(PACKAGE_MAIN, "chunks/bad.js").await);
}

/// A one-shot HTTP server that sleeps `delay` before writing a fixed body,
/// for simulating a slow file download without depending on a mocking
/// library's support for artificial latency.
async fn spawn_slow_file_server(body: &'static [u8], delay: Duration) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let delay = delay;
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Scenario 5: the boot timer fires before the download finishes; with
/// force-update enabled the host is unblocked immediately and the download
/// keeps running in the background.
#[tokio::test]
async fn boot_timeout_with_force_update_unblocks_host_immediately() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
    store.write_local(PACKAGE_MAIN, "index.jsbundle", b"existing-index").await.unwrap();

    let current = base_manifest("1.0.0", Duration::from_millis(50), "https://cdn/index");
    let body: &'static [u8] = b"slow chunk";
    let checksum = hex::encode(Sha256::digest(body));
    let file_server_url = spawn_slow_file_server(body, Duration::from_millis(300)).await;

    let mut new_manifest = current.clone();
    new_manifest.package.version = "1.0.1".into();
    new_manifest
        .package
        .important
        .push(Resource::new(format!("{file_server_url}/chunks/slow.js"), "chunks/slow.js").with_checksum(checksum));

    server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&new_manifest).unwrap())
        .create_async()
        .await;

    let delegate = Arc::new(UrlDelegate { url: format!("{}/manifest.json", server.url()) });
    let engine = Engine::shared_instance("e2e-boot-timeout-force", Some(dir.path().to_path_buf()), delegate, current).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::PackageTimedout);
    assert_eq!(result.manifest.package.version, "1.0.0");

    // Give the detached background download time to finish and promote.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(store.exists(PACKAGE_MAIN, "chunks/slow.js").await);

    let manifest_store = airboot::manifest_store::ManifestStore::new(&store);
    let persisted = manifest_store.load().await.unwrap();
    assert_eq!(persisted.package.version, "1.0.1");
}

/// Scenario 5b: the same boot timeout, but `shouldDoForceUpdate() == false`
/// means the download is abandoned rather than continued in the background.
#[tokio::test]
async fn boot_timeout_without_force_update_cancels_download() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
    store.write_local(PACKAGE_MAIN, "index.jsbundle", b"existing-index").await.unwrap();

    let current = base_manifest("1.0.0", Duration::from_millis(50), "https://cdn/index");
    let body: &'static [u8] = b"slow chunk";
    let checksum = hex::encode(Sha256::digest(body));
    let file_server_url = spawn_slow_file_server(body, Duration::from_millis(300)).await;

    let mut new_manifest = current.clone();
    new_manifest.package.version = "1.0.1".into();
    new_manifest
        .package
        .important
        .push(Resource::new(format!("{file_server_url}/chunks/slow.js"), "chunks/slow.js").with_checksum(checksum));

    server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&new_manifest).unwrap())
        .create_async()
        .await;

    let delegate = Arc::new(NoForceUpdateDelegate { url: format!("{}/manifest.json", server.url()) });
    let engine = Engine::shared_instance("e2e-boot-timeout-no-force", Some(dir.path().to_path_buf()), delegate, current).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::PackageTimedout);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!store.exists(PACKAGE_MAIN, "chunks/slow.js").await);
}

/// Scenario 6: a lazy resource is resolved on demand after boot.
#[tokio::test]
async fn lazy_resource_is_downloaded_on_demand() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let store = FileStore::new(dir.path(), Box::new(EmptyAssetBundle));
    store.write_local(PACKAGE_MAIN, "index.jsbundle", b"existing-index").await.unwrap();

    let body = b"lazy chunk";
    let checksum = hex::encode(Sha256::digest(body));
    let mut current = base_manifest("1.0.0", Duration::from_secs(5), "https://cdn/index");
    current.package.lazy.push(airboot::manifest::LazyResource::new(
        Resource::new(format!("{}/lazy/a.js", server.url()), "lazy/a.js").with_checksum(checksum),
    ));

    let mock = server
        .mock("GET", "/lazy/a.js")
        .with_status(200)
        .with_body(body.as_slice())
        .create_async()
        .await;

    let delegate = Arc::new(UrlDelegate { url: format!("{}/manifest.json", server.url()) });
    server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&current).unwrap())
        .create_async()
        .await;

    let engine = Engine::shared_instance("e2e-lazy", Some(dir.path().to_path_buf()), delegate, current).await;
    engine.wait_for_packages_and_resources().await;

    engine.resolve_lazy_package("lazy/a.js").await.unwrap();
    mock.assert_async().await;

    let manifest = engine.current_manifest().await.unwrap();
    assert!(manifest.package.lazy.iter().find(|l| l.file_path() == "lazy/a.js").unwrap().is_downloaded);
}

/// Scenario 7: a manifest version already blacklisted is offered again and
/// must not be re-attempted.
#[tokio::test]
async fn blacklisted_version_is_not_retried() {
    let dir = tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    airboot::blacklist::Blacklist::default().save(dir.path()).await.unwrap();
    let mut blacklist = airboot::blacklist::Blacklist::load(dir.path()).await.unwrap();
    blacklist.insert("1.0.1");
    blacklist.save(dir.path()).await.unwrap();

    let current = base_manifest("1.0.0", Duration::from_secs(5), "https://cdn/index");
    let mut offered = current.clone();
    offered.package.version = "1.0.1".into();
    offered.package.important.push(Resource::new("https://cdn/should-not-fetch", "chunks/a.js").with_checksum("abc"));

    server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_body(serde_json::to_vec(&offered).unwrap())
        .create_async()
        .await;

    let delegate = Arc::new(UrlDelegate { url: format!("{}/manifest.json", server.url()) });
    let engine = Engine::shared_instance("e2e-blacklisted-reoffered", Some(dir.path().to_path_buf()), delegate, current).await;

    let result = engine.wait_for_packages_and_resources().await;
    assert_eq!(result.status, DownloadStatus::PackageDownloadFailed);
    assert_eq!(engine.state().await, State::Failed);
}
