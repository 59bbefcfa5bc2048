//! Application manager (component H): the per-workspace state machine.
//!
//! One [`Manager`] owns a dedicated actor task that is the sole mutator of
//! the manager's state; every public method sends a command over an mpsc
//! channel and awaits a reply rather than touching state directly. The
//! shape — a cloneable handle holding an `mpsc::Sender`, one `tokio::spawn`ed
//! task draining the receiver, per-call `oneshot` replies — is the same
//! pattern used elsewhere in the retrieved pack for a single mutable
//! resource shared across async callers, generalized here from a model
//! inference queue to a release manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;

use crate::blacklist::Blacklist;
use crate::delegate::SharedDelegate;
use crate::error::{EngineError, Result};
use crate::manifest::{DownloadResult, DownloadStatus, Manifest};
use crate::net::NetworkClient;
use crate::planner::{self, Plan};
use crate::remote_file::RemoteFileUtil;
use crate::stage::Stager;
use crate::store::FileStore;
use crate::tracker::{Event, Level, Tracker};
use crate::workspace::{PACKAGE_MAIN, RESOURCES_MAIN};

const DOWNLOAD_CONCURRENCY: usize = 4;

/// The state machine's current phase. `Ready` and
/// `Failed` are terminal for a given boot attempt, though `Ready` may later
/// transition again if a force-updated background download completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    RcFetching,
    Downloading,
    Promoting,
    Ready,
    RcTimedOut,
    PkgTimedOut,
    Failed,
}

impl State {
    pub fn is_terminal_failed(&self) -> bool {
        matches!(self, State::Failed)
    }
}

/// Monotonic readiness flags surfaced to the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Readiness {
    pub release_config_download_completed: bool,
    pub important_package_download_completed: bool,
    pub resources_download_completed: bool,
    pub lazy_package_download_completed: bool,
}

impl Readiness {
    pub fn package_and_resource_download_completed(&self) -> bool {
        self.important_package_download_completed && self.resources_download_completed
    }
}

struct Inner {
    workspace_root: PathBuf,
    namespace: String,
    delegate: SharedDelegate,
    tracker: Tracker,
    store: FileStore,
    network: NetworkClient,
    remote: RemoteFileUtil,
    state: State,
    readiness: Readiness,
    current_manifest: Manifest,
    waiters: Vec<oneshot::Sender<DownloadResult>>,
    result_sent: bool,
    final_result: Option<DownloadResult>,
}

enum Command {
    Boot,
    WaitForPackagesAndResources(oneshot::Sender<DownloadResult>),
    State(oneshot::Sender<State>),
    Readiness(oneshot::Sender<Readiness>),
    CurrentManifest(oneshot::Sender<Manifest>),
    ResolveLazy { file_path: String, reply: oneshot::Sender<Result<()>> },
}

/// Handle to a running manager actor. Cloning shares the same underlying
/// task; this is the type the process registry (component M) stores.
#[derive(Clone)]
pub struct Manager {
    tx: mpsc::Sender<Command>,
}

impl Manager {
    /// Spawn the actor and kick off boot processing immediately.
    pub fn spawn(
        namespace: impl Into<String>,
        workspace_root: PathBuf,
        delegate: SharedDelegate,
        store: FileStore,
        initial_manifest: Manifest,
    ) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let mut tracker = Tracker::new();
        let delegate_for_events = delegate.clone();
        tracker.add_sink(Arc::new(DelegateSink(delegate_for_events)));

        let inner = Inner {
            workspace_root,
            namespace: namespace.into(),
            delegate,
            tracker,
            store,
            network: NetworkClient::new(),
            remote: RemoteFileUtil::new(NetworkClient::new()),
            state: State::Init,
            readiness: Readiness::default(),
            current_manifest: initial_manifest,
            waiters: Vec::new(),
            result_sent: false,
            final_result: None,
        };

        let manager = Manager { tx: tx.clone() };
        tokio::spawn(run_actor(inner, rx));
        let _ = tx.try_send(Command::Boot);
        manager
    }

    pub async fn wait_for_packages_and_resources(&self) -> DownloadResult {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::WaitForPackagesAndResources(reply)).await.is_err() {
            return DownloadResult::failed(DownloadStatus::Error, Manifest::placeholder(), "manager task gone");
        }
        rx.await.unwrap_or_else(|_| DownloadResult::failed(DownloadStatus::Error, Manifest::placeholder(), "manager task dropped reply"))
    }

    pub async fn state(&self) -> State {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::State(reply)).await;
        rx.await.unwrap_or(State::Failed)
    }

    pub async fn readiness(&self) -> Readiness {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Readiness(reply)).await;
        rx.await.unwrap_or_default()
    }

    pub async fn current_manifest(&self) -> Option<Manifest> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::CurrentManifest(reply)).await;
        rx.await.ok()
    }

    /// Download one lazy resource by `file_path`, flipping its in-memory
    /// `is_downloaded` flag on success. Never touches the persisted manifest.
    pub async fn resolve_lazy(&self, file_path: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::ResolveLazy { file_path: file_path.into(), reply })
            .await;
        rx.await.map_err(|_| EngineError::DelegateFetchFailed("manager task gone".into()))?
    }
}

/// A tracker sink that forwards every event to the delegate's `on_event`.
struct DelegateSink(SharedDelegate);

impl crate::tracker::EventSink for DelegateSink {
    fn on_event(&self, event: &Event) {
        self.0.on_event(event);
    }
}

impl Manifest {
    /// A manifest value used only to satisfy `DownloadResult`'s shape when a
    /// reply channel was dropped before ever producing a real manifest.
    fn placeholder() -> Self {
        Manifest {
            config: crate::manifest::Config::new("0.0.0", Duration::from_millis(1)),
            package: crate::manifest::Package {
                name: String::new(),
                version: "0.0.0".into(),
                index: crate::manifest::Resource::new("", ""),
                properties: Default::default(),
                important: vec![],
                lazy: vec![],
            },
            resources: crate::manifest::Resources::default(),
        }
    }
}

async fn run_actor(mut inner: Inner, mut rx: mpsc::Receiver<Command>) {
    let span = tracing::info_span!("manager_boot", namespace = %inner.namespace);
    let _entered = span.enter();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Boot => drop_result(boot(&mut inner).await),
            Command::WaitForPackagesAndResources(reply) => match &inner.final_result {
                Some(result) => {
                    let _ = reply.send(result.clone());
                }
                None => inner.waiters.push(reply),
            },
            Command::State(reply) => {
                let _ = reply.send(inner.state);
            }
            Command::Readiness(reply) => {
                let _ = reply.send(inner.readiness);
            }
            Command::CurrentManifest(reply) => {
                let _ = reply.send(inner.current_manifest.clone());
            }
            Command::ResolveLazy { file_path, reply } => {
                let result = resolve_lazy(&mut inner, &file_path).await;
                let _ = reply.send(result);
            }
        }
    }
}

fn drop_result<T>(_: T) {}

async fn finish(inner: &mut Inner, result: DownloadResult) {
    if inner.result_sent {
        return;
    }
    inner.result_sent = true;
    inner.final_result = Some(result.clone());
    for waiter in inner.waiters.drain(..) {
        let _ = waiter.send(result.clone());
    }
}

async fn boot(inner: &mut Inner) -> Result<()> {
    inner.state = State::Init;

    if inner.delegate.should_use_local_assets() {
        inner.state = State::Ready;
        mark_ready_from_current(inner);
        finish(inner, DownloadResult::ok(inner.current_manifest.clone())).await;
        inner.delegate.on_boot_complete(&bundle_path(inner)).await;
        return Ok(());
    }

    inner.state = State::RcFetching;
    let rc_timeout = inner.current_manifest.config.release_config_timeout();
    let mut fetch_handle = tokio::spawn(fetch_release_config(
        inner.namespace.clone(),
        inner.delegate.clone(),
        inner.network.clone(),
    ));

    let new_manifest = match tokio::time::timeout(rc_timeout, &mut fetch_handle).await {
        Err(_elapsed) => {
            inner.state = State::RcTimedOut;
            inner.tracker.event(Event::lifecycle(Level::Warning, "RELEASE_CONFIG", "timeout", json!({})));
            finish(inner, DownloadResult::failed(
                DownloadStatus::ReleaseConfigTimedout,
                inner.current_manifest.clone(),
                "release config fetch timed out",
            )).await;
            continue_release_config_fetch_in_background(inner, fetch_handle);
            return Ok(());
        }
        Ok(Err(join_err)) => {
            inner.state = State::Failed;
            let e = EngineError::DelegateFetchFailed(join_err.to_string());
            inner.tracker.event(Event::lifecycle(Level::Error, "RELEASE_CONFIG", "error", json!({ "error": e.to_string() })));
            finish(inner, DownloadResult::failed(DownloadStatus::Error, inner.current_manifest.clone(), e.to_string())).await;
            return Err(e);
        }
        Ok(Ok(Err(e))) => {
            inner.state = State::Failed;
            inner.tracker.event(Event::lifecycle(Level::Error, "RELEASE_CONFIG", "error", json!({ "error": e.to_string() })));
            finish(inner, DownloadResult::failed(DownloadStatus::Error, inner.current_manifest.clone(), e.to_string())).await;
            return Err(e);
        }
        Ok(Ok(Ok(m))) => m,
    };

    inner.readiness.release_config_download_completed = true;
    inner.tracker.event(Event::lifecycle(Level::Info, "RELEASE_CONFIG", "fetched", json!({ "version": new_manifest.package.version })));

    let blacklist = Blacklist::load(&inner.workspace_root).await.unwrap_or_default();
    if blacklist.contains(&new_manifest.package.version) {
        tracing::warn!(version = %new_manifest.package.version, "manifest version is blacklisted, skipping download");
        inner.state = State::Failed;
        finish(inner, DownloadResult::failed(
            DownloadStatus::PackageDownloadFailed,
            inner.current_manifest.clone(),
            format!("package version {} is blacklisted", new_manifest.package.version),
        )).await;
        return Ok(());
    }

    let diff = inner.current_manifest.diff(&new_manifest);
    if diff.is_empty() {
        inner.state = State::Ready;
        mark_ready_from_current(inner);
        finish(inner, DownloadResult::ok(inner.current_manifest.clone())).await;
        inner.delegate.on_boot_complete(&bundle_path(inner)).await;
        return Ok(());
    }

    run_download_and_promote(inner, new_manifest).await
}

async fn run_download_and_promote(inner: &mut Inner, new_manifest: Manifest) -> Result<()> {
    inner.state = State::Downloading;
    let package_main = inner.store.resolve(PACKAGE_MAIN, "")?;
    let resources_main = inner.store.resolve(RESOURCES_MAIN, "")?;
    let plan = planner::plan(&new_manifest, &package_main, &resources_main).await;

    let boot_timeout = new_manifest.config.boot_timeout();
    let download = download_plan_concurrent(inner.store.clone(), Arc::new(RemoteFileUtil::new(inner.network.clone())), plan.clone());

    match tokio::time::timeout(boot_timeout, download).await {
        Err(_elapsed) => {
            if inner.delegate.should_do_force_update() {
                inner.tracker.event(Event::lifecycle(Level::Warning, "BOOT_TIMEOUT", "force_update_continuing", json!({})));
                inner.state = State::PkgTimedOut;
                finish(inner, DownloadResult::failed(
                    DownloadStatus::PackageTimedout,
                    inner.current_manifest.clone(),
                    "boot timeout, continuing download in background",
                )).await;
                continue_download_in_background(inner, new_manifest, plan);
            } else {
                inner.tracker.event(Event::lifecycle(Level::Warning, "BOOT_TIMEOUT", "cancelled", json!({})));
                inner.state = State::PkgTimedOut;
                finish(inner, DownloadResult::failed(
                    DownloadStatus::PackageTimedout,
                    inner.current_manifest.clone(),
                    "boot timeout, downloads cancelled",
                )).await;
            }
            Ok(())
        }
        Ok(Err(e)) => {
            inner.state = State::Failed;
            let mut blacklist = Blacklist::load(&inner.workspace_root).await.unwrap_or_default();
            blacklist.insert(new_manifest.package.version.clone());
            blacklist.save(&inner.workspace_root).await.ok();
            inner.tracker.event(Event::lifecycle(Level::Error, "PACKAGE_RESOURCE", "failed", json!({ "error": e.to_string() })));
            finish(inner, DownloadResult::failed(DownloadStatus::PackageDownloadFailed, inner.current_manifest.clone(), e.to_string())).await;
            Err(e)
        }
        Ok(Ok(())) => {
            inner.readiness.important_package_download_completed = true;
            inner.readiness.resources_download_completed = true;
            promote_and_finish(inner, new_manifest, &plan).await
        }
    }
}

async fn promote_and_finish(inner: &mut Inner, new_manifest: Manifest, plan: &Plan) -> Result<()> {
    inner.state = State::Promoting;
    let mut blacklist = Blacklist::load(&inner.workspace_root).await.unwrap_or_default();
    let stager = Stager::new(&inner.store, &inner.remote);
    match stager.promote(&new_manifest, plan, &mut blacklist).await {
        Ok(()) => {
            blacklist.save(&inner.workspace_root).await.ok();
            inner.current_manifest = new_manifest;
            inner.state = State::Ready;
            inner.tracker.event(Event::lifecycle(Level::Info, "PACKAGE_RESOURCE", "promoted", json!({ "version": inner.current_manifest.package.version })));
            finish(inner, DownloadResult::ok(inner.current_manifest.clone())).await;
            inner.delegate.on_boot_complete(&bundle_path(inner)).await;
            Ok(())
        }
        Err(e) => {
            blacklist.save(&inner.workspace_root).await.ok();
            inner.state = State::Failed;
            inner.tracker.event(Event::lifecycle(Level::Error, "PACKAGE_RESOURCE", "promote_failed", json!({ "error": e.to_string() })));
            finish(inner, DownloadResult::failed(DownloadStatus::PackageDownloadFailed, inner.current_manifest.clone(), e.to_string())).await;
            Err(e)
        }
    }
}

/// Fire every important/resource task in `plan` through a bounded
/// `JoinSet`. Used both for the in-line boot download and for the
/// force-update background continuation.
async fn download_plan_concurrent(store: FileStore, remote: Arc<RemoteFileUtil>, plan: Plan) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(DOWNLOAD_CONCURRENCY));
    let mut join_set = JoinSet::new();

    let important: Vec<_> = plan.important.into_iter().map(|t| (t, crate::workspace::PACKAGE_TEMP)).collect();
    let resources: Vec<_> = plan.resources.into_iter().map(|t| (t, crate::workspace::RESOURCES_TEMP)).collect();

    for (task, temp_dir) in important.into_iter().chain(resources.into_iter()) {
        let store = store.clone();
        let remote = remote.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let dest = store.resolve(temp_dir, &task.resource.file_path)?;
            match remote.download_with_check(&task.resource.url, &dest, task.resource.checksum.as_deref()).await {
                Ok(()) => Ok(()),
                Err(_first) => remote.download_with_check(&task.resource.url, &dest, task.resource.checksum.as_deref()).await,
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        joined.map_err(|e| EngineError::DelegateFetchFailed(e.to_string()))??;
    }
    Ok(())
}

/// Runs detached from the actor: on success this updates the persisted
/// manifest but not `inner.current_manifest`, matching the boot-timeout
/// branch's contract that the *next* launch picks up the new version, not
/// the one already running.
fn continue_download_in_background(inner: &mut Inner, new_manifest: Manifest, plan: Plan) {
    let namespace = inner.namespace.clone();
    let workspace_root = inner.workspace_root.clone();
    let store = inner.store.clone();
    let remote = Arc::new(RemoteFileUtil::new(inner.network.clone()));
    let tracker = inner.tracker.clone();

    tokio::spawn(async move {
        let span = tracing::info_span!("background_force_update", namespace = %namespace);
        let _entered = span.enter();
        match download_plan_concurrent(store.clone(), remote.clone(), plan.clone()).await {
            Ok(()) => {
                let stager = Stager::new(&store, &remote);
                let mut blacklist = Blacklist::load(&workspace_root).await.unwrap_or_default();
                match stager.promote(&new_manifest, &plan, &mut blacklist).await {
                    Ok(()) => {
                        tracker.event(Event::lifecycle(Level::Info, "PACKAGE_RESOURCE", "background_promoted", json!({ "version": new_manifest.package.version })));
                    }
                    Err(e) => {
                        blacklist.save(&workspace_root).await.ok();
                        tracker.event(Event::lifecycle(Level::Error, "PACKAGE_RESOURCE", "background_promote_failed", json!({ "error": e.to_string() })));
                    }
                }
            }
            Err(e) => {
                tracker.event(Event::lifecycle(Level::Error, "PACKAGE_RESOURCE", "background_download_failed", json!({ "error": e.to_string() })));
            }
        }
    });
}

async fn fetch_release_config(namespace: String, delegate: SharedDelegate, network: NetworkClient) -> Result<Manifest> {
    if let Some(result) = delegate.fetch_release_config(&namespace).await {
        return result;
    }

    let url = delegate
        .release_config_url()
        .ok_or_else(|| EngineError::DelegateFetchFailed("no releaseConfigUrl and no custom fetch provided".into()))?;
    let mut headers = delegate.release_config_headers();
    for (k, v) in delegate.dimensions() {
        headers.entry(k).or_insert(v);
    }

    let bytes = {
        let response = network
            .request(&url, reqwest::Method::GET, None, &headers, &crate::net::RequestOptions::default())
            .await?;
        response.body.into_bytes()
    };
    Manifest::from_json(&bytes)
}

/// Spawned when the boot-timeout elapses on the release-config fetch: the
/// fetch itself is never cancelled (it keeps running as a detached task,
/// per `fetch_handle`'s own `tokio::spawn`), so this just waits on it and,
/// if a usable manifest eventually arrives, promotes it in place. Promotion
/// only happens when `shouldDoForceUpdate` is set — by the time this fetch
/// resolves the host has already moved on with `RELEASE_CONFIG_TIMEDOUT`,
/// so without force-update there is nothing left to apply it to until the
/// next launch picks it up from a fresh boot.
fn continue_release_config_fetch_in_background(inner: &Inner, fetch_handle: tokio::task::JoinHandle<Result<Manifest>>) {
    let namespace = inner.namespace.clone();
    let workspace_root = inner.workspace_root.clone();
    let store = inner.store.clone();
    let remote = Arc::new(RemoteFileUtil::new(inner.network.clone()));
    let tracker = inner.tracker.clone();
    let delegate = inner.delegate.clone();
    let current_manifest = inner.current_manifest.clone();

    tokio::spawn(async move {
        let span = tracing::info_span!("background_release_config", namespace = %namespace);
        let _entered = span.enter();

        let fetch_result = match fetch_handle.await {
            Ok(result) => result,
            Err(join_err) => Err(EngineError::DelegateFetchFailed(join_err.to_string())),
        };

        let new_manifest = match fetch_result {
            Ok(m) => m,
            Err(e) => {
                tracker.event(Event::lifecycle(Level::Warning, "RELEASE_CONFIG", "late_fetch_failed", json!({ "error": e.to_string() })));
                return;
            }
        };
        tracker.event(Event::lifecycle(Level::Info, "RELEASE_CONFIG", "fetched", json!({ "version": new_manifest.package.version, "late": true })));

        if !delegate.should_do_force_update() {
            return;
        }

        let mut blacklist = Blacklist::load(&workspace_root).await.unwrap_or_default();
        if blacklist.contains(&new_manifest.package.version) {
            tracing::warn!(version = %new_manifest.package.version, "late release config version is blacklisted, skipping download");
            return;
        }

        if current_manifest.diff(&new_manifest).is_empty() {
            return;
        }

        let (package_main, resources_main) = match (store.resolve(PACKAGE_MAIN, ""), store.resolve(RESOURCES_MAIN, "")) {
            (Ok(p), Ok(r)) => (p, r),
            _ => return,
        };
        let plan = planner::plan(&new_manifest, &package_main, &resources_main).await;

        match download_plan_concurrent(store.clone(), remote.clone(), plan.clone()).await {
            Ok(()) => {
                let stager = Stager::new(&store, &remote);
                match stager.promote(&new_manifest, &plan, &mut blacklist).await {
                    Ok(()) => {
                        tracker.event(Event::lifecycle(Level::Info, "PACKAGE_RESOURCE", "background_promoted", json!({ "version": new_manifest.package.version })));
                    }
                    Err(e) => {
                        blacklist.save(&workspace_root).await.ok();
                        tracker.event(Event::lifecycle(Level::Error, "PACKAGE_RESOURCE", "background_promote_failed", json!({ "error": e.to_string() })));
                    }
                }
            }
            Err(e) => {
                tracker.event(Event::lifecycle(Level::Error, "PACKAGE_RESOURCE", "background_download_failed", json!({ "error": e.to_string() })));
            }
        }
    });
}

fn mark_ready_from_current(inner: &mut Inner) {
    inner.readiness.release_config_download_completed = true;
    inner.readiness.important_package_download_completed = true;
    inner.readiness.resources_download_completed = true;
}

fn bundle_path(inner: &Inner) -> PathBuf {
    inner
        .workspace_root
        .join(PACKAGE_MAIN)
        .join(&inner.current_manifest.package.index.file_path)
}

async fn resolve_lazy(inner: &mut Inner, file_path: &str) -> Result<()> {
    let Some(lazy) = inner.current_manifest.package.find_lazy_mut(file_path) else {
        return Err(EngineError::NotFound(PathBuf::from(file_path)));
    };
    if lazy.is_downloaded {
        return Ok(());
    }
    let resource = lazy.resource.clone();
    let dest = inner.store.resolve(PACKAGE_MAIN, &resource.file_path)?;
    let result = inner
        .remote
        .download_with_check(&resource.url, &dest, resource.checksum.as_deref())
        .await;

    let Some(lazy) = inner.current_manifest.package.find_lazy_mut(file_path) else {
        return Err(EngineError::NotFound(PathBuf::from(file_path)));
    };

    match result {
        Ok(()) => {
            lazy.is_downloaded = true;
            inner.readiness.lazy_package_download_completed =
                inner.current_manifest.package.lazy.iter().all(|l| l.is_downloaded);
            inner.tracker.event(Event::lifecycle(
                Level::Info,
                "LAZY_PACKAGE",
                file_path,
                json!({ "filePath": file_path, "ok": true }),
            ));
            Ok(())
        }
        Err(e) => {
            inner.tracker.event(Event::lifecycle(
                Level::Warning,
                "LAZY_PACKAGE",
                file_path,
                json!({ "filePath": file_path, "ok": false, "error": e.to_string() }),
            ));
            Err(e)
        }
    }
}
