//! Server state management.
//!
//! The state owns the engine factory, the scope bindings of bound workspace
//! folders, the tracker used for unbound files, and the adapters the
//! handlers talk to the editor and the backend through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lintbridge_core::{
    EngineHandle, EngineKind, EngineProvider, EngineResult, EngineSetup, EnginesFactory, IssueTracker,
    Lifecycle, ProjectBindingWrapper, ScopeBindings,
};
use parking_lot::{Mutex, RwLock};
use tower_lsp::lsp_types::{Url, WorkspaceFolder};
use tracing::info;

use crate::backend::{BackendService, LocalBackend};
use crate::client::{ExtendedClient, LintClient};
use crate::config::{ConnectionStore, LaunchOptions, ServerConnection, WorkspaceSettings};
use crate::telemetry::TelemetryCollector;

pub struct ServerState {
    client: Arc<dyn ExtendedClient>,
    provider: Arc<dyn EngineProvider>,
    lifecycle: Arc<Lifecycle>,
    /// Installed by `initialize`.
    factory: RwLock<Option<Arc<EnginesFactory>>>,
    /// Serializes lazy creation of the standalone engine.
    standalone_guard: Mutex<()>,
    /// Serializes lazy creation of connected engines.
    connected_guard: Mutex<()>,
    bindings: ScopeBindings,
    standalone_tracker: IssueTracker,
    workspace_folders: RwLock<Vec<WorkspaceFolder>>,
    connections: Arc<ConnectionStore>,
    settings: RwLock<WorkspaceSettings>,
    launch: RwLock<LaunchOptions>,
    lint_client: Arc<LintClient>,
    backend: BackendService,
    telemetry: TelemetryCollector,
    secrets_notified: AtomicBool,
}

impl ServerState {
    pub fn new(client: Arc<dyn ExtendedClient>, provider: Arc<dyn EngineProvider>) -> Self {
        let connections = Arc::new(ConnectionStore::new());
        let lint_client = Arc::new(LintClient::new(
            Arc::clone(&client),
            Arc::clone(&connections),
        ));
        let backend = BackendService::new(Arc::new(LocalBackend::new(
            Arc::clone(&lint_client),
            Arc::clone(&connections),
        )));
        Self {
            client,
            provider,
            lifecycle: Lifecycle::shared(),
            factory: RwLock::new(None),
            standalone_guard: Mutex::new(()),
            connected_guard: Mutex::new(()),
            bindings: ScopeBindings::new(),
            standalone_tracker: IssueTracker::new(),
            workspace_folders: RwLock::new(Vec::new()),
            connections,
            settings: RwLock::new(WorkspaceSettings::default()),
            launch: RwLock::new(LaunchOptions::default()),
            lint_client,
            backend,
            telemetry: TelemetryCollector::new(),
            secrets_notified: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Arc<dyn ExtendedClient> {
        &self.client
    }

    pub fn lint_client(&self) -> &Arc<LintClient> {
        &self.lint_client
    }

    pub fn backend(&self) -> &BackendService {
        &self.backend
    }

    pub fn connections(&self) -> &Arc<ConnectionStore> {
        &self.connections
    }

    pub fn bindings(&self) -> &ScopeBindings {
        &self.bindings
    }

    pub fn standalone_tracker(&self) -> &IssueTracker {
        &self.standalone_tracker
    }

    pub fn launch_options(&self) -> LaunchOptions {
        self.launch.read().clone()
    }

    pub fn set_launch_options(&self, launch: LaunchOptions) {
        *self.launch.write() = launch;
    }

    pub fn settings(&self) -> WorkspaceSettings {
        self.settings.read().clone()
    }

    pub fn set_settings(&self, settings: WorkspaceSettings) {
        *self.settings.write() = settings;
    }

    /// Creates the engine factory. A second call replaces the factory only
    /// after stopping every engine of the previous one.
    pub fn install_factory(&self, setup: EngineSetup) {
        let factory = Arc::new(EnginesFactory::new(
            setup,
            Arc::clone(&self.provider),
            Arc::clone(&self.lifecycle),
        ));
        if let Some(previous) = self.factory.write().replace(factory) {
            previous.stop_all();
        }
    }

    pub fn factory(&self) -> Option<Arc<EnginesFactory>> {
        self.factory.read().clone()
    }

    /// Returns the live standalone engine, starting it on first use.
    /// `Ok(None)` means the server is not initialized yet.
    pub fn standalone_engine(&self) -> EngineResult<Option<Arc<EngineHandle>>> {
        let Some(factory) = self.factory() else {
            return Ok(None);
        };
        let _guard = self.standalone_guard.lock();
        if let Some(engine) = factory.standalone_engine().filter(|e| !e.is_stopped()) {
            return Ok(Some(engine));
        }
        let start = Instant::now();
        let engine = factory.create_standalone_engine()?;
        self.record_engine_start(&engine, start.elapsed());
        Ok(Some(engine))
    }

    /// Returns the live engine for `connection`, starting one if needed.
    pub fn connected_engine(
        &self,
        connection: &ServerConnection,
    ) -> EngineResult<Option<Arc<EngineHandle>>> {
        let Some(factory) = self.factory() else {
            return Ok(None);
        };
        let _guard = self.connected_guard.lock();
        if let Some(engine) = factory
            .connected_engine(&connection.connection_id)
            .filter(|e| !e.is_stopped())
        {
            return Ok(Some(engine));
        }
        let start = Instant::now();
        let engine =
            factory.create_connected_engine(&connection.connection_id, &connection.settings())?;
        self.record_engine_start(&engine, start.elapsed());
        Ok(Some(engine))
    }

    pub fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.workspace_folders.read().clone()
    }

    pub fn set_workspace_folders(&self, folders: Vec<WorkspaceFolder>) {
        *self.workspace_folders.write() = folders;
    }

    pub fn add_workspace_folders(&self, folders: &[WorkspaceFolder]) {
        let mut guard = self.workspace_folders.write();
        for folder in folders {
            if !guard.iter().any(|known| known.uri == folder.uri) {
                guard.push(folder.clone());
            }
        }
    }

    pub fn remove_workspace_folder(&self, uri: &Url) -> bool {
        let mut guard = self.workspace_folders.write();
        let before = guard.len();
        guard.retain(|folder| &folder.uri != uri);
        guard.len() != before
    }

    /// Innermost workspace folder containing `uri`.
    pub fn folder_for(&self, uri: &Url) -> Option<WorkspaceFolder> {
        self.workspace_folders
            .read()
            .iter()
            .filter(|folder| contains(&folder.uri, uri))
            .max_by_key(|folder| folder.uri.as_str().len())
            .cloned()
    }

    pub fn binding_for(&self, uri: &Url) -> Option<Arc<ProjectBindingWrapper>> {
        let folder = self.folder_for(uri)?;
        self.bindings.get(folder.uri.as_str())
    }

    /// Runs `apply` against the tracker responsible for `uri`.
    pub fn with_tracker<R>(&self, uri: &Url, apply: impl FnOnce(&IssueTracker) -> R) -> R {
        match self.binding_for(uri) {
            Some(wrapper) => apply(wrapper.issue_tracker()),
            None => apply(&self.standalone_tracker),
        }
    }

    /// Returns true only for the first call.
    pub fn take_first_secrets_notification(&self) -> bool {
        !self.secrets_notified.swap(true, Ordering::AcqRel)
    }

    fn record_engine_start(&self, engine: &EngineHandle, duration: Duration) {
        let config = self.launch.read().telemetry.clone();
        self.telemetry.record_engine_start(&config, engine.kind(), duration);
    }

    pub fn record_analysis(&self, engine: &EngineKind, findings: usize, duration: Duration) {
        let config = self.launch.read().telemetry.clone();
        self.telemetry.record_analysis(&config, engine, findings, duration);
    }

    pub fn record_command(&self, command: &str, duration: Duration) {
        let config = self.launch.read().telemetry.clone();
        self.telemetry.record_command(&config, command, duration);
    }

    pub fn flush_telemetry(&self) {
        self.telemetry.flush();
    }

    /// Enters shutdown, stops every engine, and flushes telemetry.
    pub fn shutdown(&self) {
        self.lifecycle.begin_shutdown();
        if let Some(factory) = self.factory() {
            factory.stop_all();
        }
        info!("Stopped all engines");
        self.flush_telemetry();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lifecycle.is_shutting_down()
    }
}

fn contains(folder: &Url, uri: &Url) -> bool {
    let base = folder.as_str().trim_end_matches('/');
    match uri.as_str().strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
