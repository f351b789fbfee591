//! Launch options and connected-mode settings for lintbridge-lsp.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::Context;
use lintbridge_core::{ConnectionSettings, EngineSetup, LogOutput, ProjectBinding, RuntimeInfo};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub(crate) const CONFIG_FILES: &[&str] = &["lintbridge.toml", ".lintbridge.toml"];

/// Connection id used when a connection or folder binding names none.
pub const DEFAULT_CONNECTION_ID: &str = "<default>";

pub const SONARCLOUD_URL: &str = "https://sonarcloud.io";

/// Options fixed for the lifetime of the server, read at `initialize`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOptions {
    /// Analyzer plugins loaded by the standalone engine.
    pub analyzers: Vec<PathBuf>,
    /// Plugins embedded in connected engines, keyed by plugin key.
    pub embedded_plugins: BTreeMap<String, PathBuf>,
    pub node_path: Option<PathBuf>,
    pub node_version: Option<String>,
    pub user_home: Option<PathBuf>,
    pub telemetry: TelemetryConfig,
}

impl LaunchOptions {
    /// Reads the `initializationOptions` sent by the client.
    pub fn from_initialization_options(options: Option<&Value>) -> Self {
        let Some(options) = options.filter(|value| !value.is_null()) else {
            return Self::default();
        };
        match InitOptionsSection::deserialize(options) {
            Ok(section) => section.into(),
            Err(err) => {
                warn!("Ignoring malformed initialization options: {err}");
                Self::default()
            }
        }
    }

    /// Applies the first config file found under `root` on top of `self`.
    pub fn with_config_file(self, root: &Path) -> Self {
        let Some(path) = find_config_file(root) else {
            return self;
        };
        match std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))
            .and_then(|contents| self.clone().merge_contents(root, &contents))
        {
            Ok(options) => {
                debug!("Loaded launch options from {}", path.display());
                options
            }
            Err(err) => {
                warn!("Ignoring lintbridge config: {err:#}");
                self
            }
        }
    }

    pub fn merge_contents(mut self, root: &Path, contents: &str) -> anyhow::Result<Self> {
        let parsed: ConfigFile = toml::from_str(contents).context("invalid lintbridge config")?;
        self.analyzers
            .extend(parsed.analyzers.paths.iter().map(|path| resolve_path(root, path)));
        for (key, path) in &parsed.analyzers.embedded {
            self.embedded_plugins
                .insert(key.clone(), resolve_path(root, path));
        }
        if let Some(path) = parsed.runtime.node_path {
            self.node_path = Some(resolve_path(root, &path));
        }
        if parsed.runtime.node_version.is_some() {
            self.node_version = parsed.runtime.node_version;
        }
        if let Some(home) = parsed.runtime.user_home {
            self.user_home = Some(resolve_path(root, &home));
        }
        self.telemetry = TelemetryConfig::from_section(root, parsed.telemetry);
        Ok(self)
    }

    pub fn node_runtime(&self) -> NodeJsRuntime {
        NodeJsRuntime::new(self.node_path.clone(), self.node_version.clone())
    }

    /// Builds the setup shared by every engine the factory creates.
    /// `runtime` comes from [`NodeJsRuntime::resolve`], which may block.
    pub fn engine_setup(
        &self,
        log_output: Arc<dyn LogOutput>,
        runtime: Option<RuntimeInfo>,
    ) -> EngineSetup {
        let mut setup = EngineSetup::new();
        setup.standalone_analyzers = self.analyzers.clone();
        setup.embedded_plugins = self.embedded_plugins.clone();
        setup.runtime = runtime;
        setup.user_home = self.user_home.clone();
        setup.log_output = log_output;
        setup
    }
}

/// Telemetry configuration (opt-in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
    pub flush_every: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            flush_every: 25,
        }
    }
}

impl TelemetryConfig {
    fn from_section(root: &Path, section: TelemetrySection) -> Self {
        let enabled = section.enabled.unwrap_or(false);
        let path = section.path.map(|path| resolve_path(root, &path));
        let path = if enabled {
            Some(path.unwrap_or_else(|| resolve_path(root, ".lintbridge/telemetry.jsonl")))
        } else {
            path
        };
        TelemetryConfig {
            enabled,
            path,
            flush_every: section.flush_every.unwrap_or(25),
        }
    }
}

/// Resolves the Node.js runtime used by JavaScript-family analyzers.
#[derive(Debug, Clone, Default)]
pub struct NodeJsRuntime {
    path: Option<PathBuf>,
    version: Option<String>,
}

impl NodeJsRuntime {
    pub fn new(path: Option<PathBuf>, version: Option<String>) -> Self {
        Self { path, version }
    }

    /// Returns the runtime, probing `node --version` when no version is configured.
    pub fn resolve(&self) -> Option<RuntimeInfo> {
        let path = self.path.clone()?;
        let version = self
            .version
            .clone()
            .or_else(|| detect_node_version(&path));
        Some(RuntimeInfo { path, version })
    }
}

fn detect_node_version(path: &Path) -> Option<String> {
    let output = match Command::new(path).arg("--version").output() {
        Ok(output) => output,
        Err(err) => {
            warn!("Unable to run {} --version: {err}", path.display());
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    parse_node_version(&String::from_utf8_lossy(&output.stdout))
}

fn parse_node_version(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let version = trimmed.strip_prefix('v').unwrap_or(trimmed);
    (!version.is_empty()).then(|| version.to_string())
}

/// A configured server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConnection {
    pub connection_id: String,
    pub is_cloud: bool,
    /// Organization key for cloud connections, server URL otherwise.
    pub organization_or_url: String,
    pub token: Option<String>,
    pub disable_notifications: bool,
}

impl ServerConnection {
    pub fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            is_cloud_alias: self.is_cloud,
            token: self.token.clone(),
            organization_or_url: self.organization_or_url.clone(),
        }
    }

    /// Base URL of the server web application.
    pub fn server_url(&self) -> String {
        if self.is_cloud {
            SONARCLOUD_URL.to_string()
        } else {
            self.organization_or_url.trim_end_matches('/').to_string()
        }
    }
}

/// Server project a folder is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderBinding {
    pub connection_id: String,
    pub project_key: String,
    /// Where the folder's files live in the server project.
    pub server_path_prefix: String,
    /// Folder-relative directory matching `server_path_prefix`.
    pub ide_path_prefix: String,
}

impl FolderBinding {
    pub fn project_binding(&self) -> ProjectBinding {
        ProjectBinding::new(self.project_key.clone())
            .with_path_prefixes(self.server_path_prefix.clone(), self.ide_path_prefix.clone())
    }
}

/// Settings pushed by `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub connections: Vec<ServerConnection>,
    /// Bindings keyed by workspace folder URI.
    pub folder_bindings: BTreeMap<String, FolderBinding>,
}

impl WorkspaceSettings {
    /// Parses the settings object. Accepts the settings either at the root or
    /// nested under a `lintbridge` key.
    pub fn from_value(value: &Value) -> Self {
        let value = value.get("lintbridge").unwrap_or(value);
        let section = match SettingsSection::deserialize(value) {
            Ok(section) => section,
            Err(err) => {
                warn!("Ignoring malformed workspace settings: {err}");
                return Self::default();
            }
        };

        let connections = section.connected_mode.connections;
        let mut settings = WorkspaceSettings::default();
        for entry in connections.sonarqube {
            let Some(url) = entry.server_url.filter(|url| !url.trim().is_empty()) else {
                warn!("Skipping connection without serverUrl");
                continue;
            };
            settings.connections.push(entry.common.into_connection(false, url));
        }
        for entry in connections.sonarcloud {
            let Some(organization) = entry
                .organization_key
                .filter(|organization| !organization.trim().is_empty())
            else {
                warn!("Skipping connection without organizationKey");
                continue;
            };
            settings
                .connections
                .push(entry.common.into_connection(true, organization));
        }

        for (folder, folder_section) in section.folders {
            let Some(project) = folder_section.connected_mode.project else {
                continue;
            };
            let Some(project_key) = project.project_key.filter(|key| !key.is_empty()) else {
                continue;
            };
            settings.folder_bindings.insert(
                folder,
                FolderBinding {
                    connection_id: project
                        .connection_id
                        .unwrap_or_else(|| DEFAULT_CONNECTION_ID.to_string()),
                    project_key,
                    server_path_prefix: path_prefix(project.server_path_prefix),
                    ide_path_prefix: path_prefix(project.ide_path_prefix),
                },
            );
        }
        settings
    }
}

/// Connections known to the server, shared by the backend and client adapters.
#[derive(Debug, Default)]
pub struct ConnectionStore {
    connections: RwLock<FxHashMap<String, ServerConnection>>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every connection, returning the ids that were removed or changed.
    pub fn replace_all(&self, connections: Vec<ServerConnection>) -> Vec<String> {
        let mut next = FxHashMap::default();
        for connection in connections {
            next.insert(connection.connection_id.clone(), connection);
        }
        let mut guard = self.connections.write();
        let mut outdated: Vec<_> = guard
            .iter()
            .filter(|(id, previous)| next.get(*id) != Some(*previous))
            .map(|(id, _)| id.clone())
            .collect();
        outdated.sort();
        *guard = next;
        outdated
    }

    pub fn get(&self, connection_id: &str) -> Option<ServerConnection> {
        self.connections.read().get(connection_id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.connections.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.is_file())
}

fn resolve_path(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct InitOptionsSection {
    analyzers: Vec<String>,
    embedded_plugins: BTreeMap<String, String>,
    node_path: Option<String>,
    node_version: Option<String>,
    user_home: Option<String>,
}

impl From<InitOptionsSection> for LaunchOptions {
    fn from(section: InitOptionsSection) -> Self {
        LaunchOptions {
            analyzers: section.analyzers.into_iter().map(PathBuf::from).collect(),
            embedded_plugins: section
                .embedded_plugins
                .into_iter()
                .map(|(key, path)| (key, PathBuf::from(path)))
                .collect(),
            node_path: section.node_path.map(PathBuf::from),
            node_version: section.node_version,
            user_home: section.user_home.map(PathBuf::from),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    analyzers: AnalyzersSection,
    runtime: RuntimeSection,
    telemetry: TelemetrySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalyzersSection {
    paths: Vec<String>,
    embedded: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeSection {
    node_path: Option<String>,
    node_version: Option<String>,
    user_home: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelemetrySection {
    enabled: Option<bool>,
    path: Option<String>,
    flush_every: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SettingsSection {
    connected_mode: ConnectedModeSection,
    folders: BTreeMap<String, FolderSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConnectedModeSection {
    connections: ConnectionsSection,
    project: Option<ProjectSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConnectionsSection {
    sonarqube: Vec<SelfManagedEntry>,
    sonarcloud: Vec<CloudEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConnectionCommon {
    connection_id: Option<String>,
    token: Option<String>,
    disable_notifications: bool,
}

impl ConnectionCommon {
    fn into_connection(self, is_cloud: bool, organization_or_url: String) -> ServerConnection {
        ServerConnection {
            connection_id: self
                .connection_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| DEFAULT_CONNECTION_ID.to_string()),
            is_cloud,
            organization_or_url,
            token: self.token.filter(|token| !token.is_empty()),
            disable_notifications: self.disable_notifications,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SelfManagedEntry {
    #[serde(flatten)]
    common: ConnectionCommon,
    server_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CloudEntry {
    #[serde(flatten)]
    common: ConnectionCommon,
    organization_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FolderSection {
    connected_mode: ConnectedModeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectSection {
    connection_id: Option<String>,
    project_key: Option<String>,
    server_path_prefix: Option<String>,
    ide_path_prefix: Option<String>,
}

fn path_prefix(raw: Option<String>) -> String {
    raw.map(|prefix| prefix.trim().trim_matches('/').to_string())
        .unwrap_or_default()
}
