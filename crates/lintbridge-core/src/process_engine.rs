//! Engine backed by external analyzer executables.
//!
//! Each plugin path is an executable invoked once per analysis:
//!
//! ```text
//! <plugin> --languages java,js [--connection <id>] [--hotspots]
//!          [--nodejs <path>] [--home <dir>] [--module <key>]... <file-uri>...
//! ```
//!
//! The plugin prints its findings on stdout as JSON, either a bare array or an
//! object with a `findings` array. Anything written to stderr is forwarded to
//! the engine log sink.

use std::path::{Path, PathBuf};
use std::process::Command;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::config::{EngineConfig, LogLevel};
use crate::engine::{AnalysisEngine, AnalysisRequest, EngineProvider};
use crate::error::{BoxError, EngineError, EngineResult};
use crate::finding::Finding;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PluginOutput {
    List(Vec<Finding>),
    Wrapper { findings: Vec<Finding> },
}

impl PluginOutput {
    fn into_findings(self) -> Vec<Finding> {
        match self {
            PluginOutput::List(findings) | PluginOutput::Wrapper { findings } => findings,
        }
    }
}

/// Provider creating [`ProcessEngine`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEngineProvider;

impl EngineProvider for ProcessEngineProvider {
    fn new_standalone_engine(
        &self,
        config: &EngineConfig,
    ) -> Result<Box<dyn AnalysisEngine>, BoxError> {
        Ok(Box::new(ProcessEngine::new(config)?))
    }

    fn new_connected_engine(
        &self,
        config: &EngineConfig,
    ) -> Result<Box<dyn AnalysisEngine>, BoxError> {
        Ok(Box::new(ProcessEngine::new(config)?))
    }
}

pub struct ProcessEngine {
    plugins: Vec<PathBuf>,
    /// Analyses run one at a time per engine.
    running: Mutex<()>,
}

impl ProcessEngine {
    pub fn new(config: &EngineConfig) -> std::io::Result<Self> {
        let mut plugins = Vec::new();
        for path in config.plugin_paths() {
            if !path.is_file() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("analyzer plugin {} not found", path.display()),
                ));
            }
            plugins.push(path.clone());
        }
        config.log_output().log(
            LogLevel::Debug,
            &format!("Loaded {} analyzer plugins", plugins.len()),
        );
        Ok(Self {
            plugins,
            running: Mutex::new(()),
        })
    }

    fn run_plugin(
        &self,
        plugin: &Path,
        config: &EngineConfig,
        request: &AnalysisRequest,
    ) -> EngineResult<Vec<Finding>> {
        let mut command = Command::new(plugin);
        command.args(plugin_args(config, request));
        if let Some(base_dir) = &request.base_dir {
            command.current_dir(base_dir);
        }

        let invalid = |reason: String| EngineError::InvalidPluginOutput {
            plugin: plugin.display().to_string(),
            reason,
        };
        let output = command.output().map_err(|err| invalid(err.to_string()))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            config.log_output().log(LogLevel::Debug, line);
        }
        if !output.status.success() {
            return Err(invalid(format!("exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<PluginOutput>(&stdout)
            .map(PluginOutput::into_findings)
            .map_err(|err| invalid(format!("malformed findings: {err}")))
    }
}

impl AnalysisEngine for ProcessEngine {
    fn analyze(
        &self,
        config: &EngineConfig,
        request: &AnalysisRequest,
    ) -> EngineResult<Vec<Finding>> {
        if request.files.is_empty() {
            return Ok(Vec::new());
        }
        let _running = self.running.lock();
        let mut findings = Vec::new();
        for plugin in &self.plugins {
            findings.extend(self.run_plugin(plugin, config, request)?);
        }
        if let [file] = request.files.as_slice() {
            for finding in &mut findings {
                if finding.input_file.is_none() {
                    finding.input_file = Some(file.clone());
                }
            }
        }
        Ok(findings)
    }
}

fn plugin_args(config: &EngineConfig, request: &AnalysisRequest) -> Vec<String> {
    let languages: Vec<_> = config.languages().iter().map(|lang| lang.key()).collect();
    let mut args = vec!["--languages".to_string(), languages.join(",")];
    if let Some(connection_id) = config.connection_id() {
        args.push("--connection".to_string());
        args.push(connection_id.to_string());
    }
    if config.hotspots_enabled() {
        args.push("--hotspots".to_string());
    }
    if let Some(runtime) = config.runtime() {
        args.push("--nodejs".to_string());
        args.push(runtime.path.display().to_string());
    }
    if let Some(home) = config.user_home() {
        args.push("--home".to_string());
        args.push(home.display().to_string());
    }
    for module in config.modules() {
        args.push("--module".to_string());
        args.push(module);
    }
    args.extend(request.files.iter().map(|file| file.uri.clone()));
    args
}
