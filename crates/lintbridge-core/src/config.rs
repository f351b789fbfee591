//! Immutable engine configuration.
//!
//! An [`EngineConfig`] is produced once per engine creation by the constructor
//! for its kind ([`EngineConfig::standalone`] or [`EngineConfig::connected`])
//! and is never mutated afterwards. [`EngineConfig::validate`] checks the
//! record for completeness before any engine is constructed from it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::engine::EngineKind;
use crate::language::{Language, CONNECTED_ADDITIONAL_LANGUAGES, STANDALONE_LANGUAGES};

/// Severity of an engine log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink receiving log records emitted by engines and analyzers.
pub trait LogOutput: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards engine log records to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogOutput;

impl LogOutput for TracingLogOutput {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!(target: "lintbridge::engine", "{message}"),
            LogLevel::Debug => debug!(target: "lintbridge::engine", "{message}"),
            LogLevel::Info => info!(target: "lintbridge::engine", "{message}"),
            LogLevel::Warn => warn!(target: "lintbridge::engine", "{message}"),
            LogLevel::Error => error!(target: "lintbridge::engine", "{message}"),
        }
    }
}

/// Supplies the client-side module keys analyzers should consider.
pub trait ModulesProvider: Send + Sync {
    fn modules(&self) -> Vec<String>;
}

/// Location and version of the external runtime (Node.js) used by analyzers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub path: PathBuf,
    pub version: Option<String>,
}

/// Which server product a connected engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFlavor {
    /// No server connection.
    Standalone,
    /// Self-managed server.
    SonarQube,
    /// Cloud-hosted server.
    SonarCloud,
}

/// Per-connection settings consumed when provisioning a connected engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// True when the connection targets the cloud-hosted service.
    pub is_cloud_alias: bool,
    pub token: Option<String>,
    /// Organization key for cloud connections, server URL otherwise.
    pub organization_or_url: String,
}

impl ConnectionSettings {
    pub fn flavor(&self) -> ServerFlavor {
        if self.is_cloud_alias {
            ServerFlavor::SonarCloud
        } else {
            ServerFlavor::SonarQube
        }
    }
}

/// Inputs shared by every engine the factory creates.
#[derive(Clone)]
pub struct EngineSetup {
    /// Analyzer plugins loaded by the standalone engine.
    pub standalone_analyzers: Vec<PathBuf>,
    /// Plugins embedded in connected engines, keyed by plugin key.
    pub embedded_plugins: BTreeMap<String, PathBuf>,
    pub runtime: Option<RuntimeInfo>,
    /// Overrides the engine home directory.
    pub user_home: Option<PathBuf>,
    pub log_output: Arc<dyn LogOutput>,
    pub modules_provider: Option<Arc<dyn ModulesProvider>>,
}

impl EngineSetup {
    /// Setup with no plugins, logging through `tracing`.
    pub fn new() -> Self {
        Self {
            standalone_analyzers: Vec::new(),
            embedded_plugins: BTreeMap::new(),
            runtime: None,
            user_home: None,
            log_output: Arc::new(TracingLogOutput),
            modules_provider: None,
        }
    }
}

impl Default for EngineSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSetup")
            .field("standalone_analyzers", &self.standalone_analyzers)
            .field("embedded_plugins", &self.embedded_plugins)
            .field("runtime", &self.runtime)
            .field("user_home", &self.user_home)
            .field("modules_provider", &self.modules_provider.is_some())
            .finish_non_exhaustive()
    }
}

/// A configuration record that failed its completeness check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no language enabled")]
    NoLanguages,
    #[error("connected engine requires a non-empty connection id")]
    MissingConnectionId,
    #[error("connection '{0}' has no organization or server URL")]
    MissingServerLocation(String),
    #[error("runtime path is empty")]
    EmptyRuntimePath,
}

/// Immutable configuration of a single engine instance.
#[derive(Clone)]
pub struct EngineConfig {
    kind: EngineKind,
    flavor: ServerFlavor,
    languages: BTreeSet<Language>,
    plugin_paths: Vec<PathBuf>,
    embedded_plugins: BTreeMap<String, PathBuf>,
    server_location: Option<String>,
    hotspots_enabled: bool,
    runtime: Option<RuntimeInfo>,
    user_home: Option<PathBuf>,
    log_output: Arc<dyn LogOutput>,
    modules_provider: Option<Arc<dyn ModulesProvider>>,
}

impl EngineConfig {
    /// Configuration for the standalone engine: standalone languages and analyzers only.
    pub fn standalone(setup: &EngineSetup) -> Self {
        Self {
            kind: EngineKind::Standalone,
            flavor: ServerFlavor::Standalone,
            languages: STANDALONE_LANGUAGES.iter().copied().collect(),
            plugin_paths: setup.standalone_analyzers.clone(),
            embedded_plugins: BTreeMap::new(),
            server_location: None,
            hotspots_enabled: false,
            runtime: setup.runtime.clone(),
            user_home: setup.user_home.clone(),
            log_output: Arc::clone(&setup.log_output),
            modules_provider: setup.modules_provider.clone(),
        }
    }

    /// Configuration for an engine bound to `connection_id`.
    ///
    /// Enables the union of standalone and connected-only languages, registers
    /// every embedded plugin, and turns on server-hosted hotspot support.
    pub fn connected(
        setup: &EngineSetup,
        connection_id: &str,
        settings: &ConnectionSettings,
    ) -> Self {
        let languages = STANDALONE_LANGUAGES
            .iter()
            .chain(CONNECTED_ADDITIONAL_LANGUAGES)
            .copied()
            .collect();
        Self {
            kind: EngineKind::Connected {
                connection_id: connection_id.to_string(),
            },
            flavor: settings.flavor(),
            languages,
            plugin_paths: Vec::new(),
            embedded_plugins: setup.embedded_plugins.clone(),
            server_location: Some(settings.organization_or_url.clone()),
            hotspots_enabled: true,
            runtime: setup.runtime.clone(),
            user_home: setup.user_home.clone(),
            log_output: Arc::clone(&setup.log_output),
            modules_provider: setup.modules_provider.clone(),
        }
    }

    /// Checks the record is complete enough to construct an engine from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.languages.is_empty() {
            return Err(ConfigError::NoLanguages);
        }
        if let EngineKind::Connected { connection_id } = &self.kind {
            if connection_id.trim().is_empty() {
                return Err(ConfigError::MissingConnectionId);
            }
            let location = self.server_location.as_deref().unwrap_or("");
            if location.trim().is_empty() {
                return Err(ConfigError::MissingServerLocation(connection_id.clone()));
            }
        }
        if let Some(runtime) = &self.runtime {
            if runtime.path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyRuntimePath);
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &EngineKind {
        &self.kind
    }

    pub fn connection_id(&self) -> Option<&str> {
        match &self.kind {
            EngineKind::Standalone => None,
            EngineKind::Connected { connection_id } => Some(connection_id),
        }
    }

    pub fn flavor(&self) -> ServerFlavor {
        self.flavor
    }

    pub fn languages(&self) -> &BTreeSet<Language> {
        &self.languages
    }

    pub fn is_language_enabled(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }

    /// Analyzer plugins, standalone analyzers first then embedded plugins.
    pub fn plugin_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.plugin_paths
            .iter()
            .chain(self.embedded_plugins.values())
    }

    pub fn embedded_plugins(&self) -> &BTreeMap<String, PathBuf> {
        &self.embedded_plugins
    }

    pub fn server_location(&self) -> Option<&str> {
        self.server_location.as_deref()
    }

    pub fn hotspots_enabled(&self) -> bool {
        self.hotspots_enabled
    }

    pub fn runtime(&self) -> Option<&RuntimeInfo> {
        self.runtime.as_ref()
    }

    pub fn user_home(&self) -> Option<&PathBuf> {
        self.user_home.as_ref()
    }

    pub fn log_output(&self) -> &Arc<dyn LogOutput> {
        &self.log_output
    }

    pub fn modules(&self) -> Vec<String> {
        self.modules_provider
            .as_ref()
            .map(|provider| provider.modules())
            .unwrap_or_default()
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("kind", &self.kind)
            .field("flavor", &self.flavor)
            .field("languages", &self.languages)
            .field("plugin_paths", &self.plugin_paths)
            .field("embedded_plugins", &self.embedded_plugins)
            .field("server_location", &self.server_location)
            .field("hotspots_enabled", &self.hotspots_enabled)
            .field("runtime", &self.runtime)
            .field("user_home", &self.user_home)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> EngineSetup {
        let mut setup = EngineSetup::new();
        setup.standalone_analyzers = vec![PathBuf::from("/plugins/java.jar")];
        setup
            .embedded_plugins
            .insert("apex".to_string(), PathBuf::from("/plugins/apex.jar"));
        setup.runtime = Some(RuntimeInfo {
            path: PathBuf::from("/usr/bin/node"),
            version: Some("18.17.0".to_string()),
        });
        setup
    }

    #[test]
    fn standalone_config_uses_analyzers_only() {
        let config = EngineConfig::standalone(&setup());
        assert_eq!(config.kind(), &EngineKind::Standalone);
        assert_eq!(config.flavor(), ServerFlavor::Standalone);
        assert!(!config.hotspots_enabled());
        let plugins: Vec<_> = config.plugin_paths().cloned().collect();
        assert_eq!(plugins, vec![PathBuf::from("/plugins/java.jar")]);
        assert!(!config.is_language_enabled(Language::Apex));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn connected_config_selects_flavor_from_settings() {
        let cloud = ConnectionSettings {
            is_cloud_alias: true,
            token: None,
            organization_or_url: "my-org".to_string(),
        };
        let config = EngineConfig::connected(&setup(), "cloud", &cloud);
        assert_eq!(config.flavor(), ServerFlavor::SonarCloud);
        assert_eq!(config.connection_id(), Some("cloud"));
        assert!(config.hotspots_enabled());
        assert!(config.is_language_enabled(Language::PlSql));
        let plugins: Vec<_> = config.plugin_paths().cloned().collect();
        assert_eq!(plugins, vec![PathBuf::from("/plugins/apex.jar")]);

        let self_managed = ConnectionSettings {
            organization_or_url: "https://sq.example.com".to_string(),
            ..ConnectionSettings::default()
        };
        let config = EngineConfig::connected(&setup(), "sq", &self_managed);
        assert_eq!(config.flavor(), ServerFlavor::SonarQube);
    }

    #[test]
    fn validate_rejects_incomplete_connected_config() {
        let config = EngineConfig::connected(&setup(), " ", &ConnectionSettings::default());
        assert_eq!(config.validate(), Err(ConfigError::MissingConnectionId));

        let config = EngineConfig::connected(&setup(), "sq", &ConnectionSettings::default());
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingServerLocation("sq".to_string()))
        );
    }

    #[test]
    fn validate_rejects_empty_runtime_path() {
        let mut setup = setup();
        setup.runtime = Some(RuntimeInfo {
            path: PathBuf::new(),
            version: None,
        });
        let config = EngineConfig::standalone(&setup);
        assert_eq!(config.validate(), Err(ConfigError::EmptyRuntimePath));
    }
}
