//! Workspace lifecycle: initialization, settings changes, folder changes.
//!
//! Settings changes reconcile three things in order: the connection store,
//! the connected engines whose connection changed, and the per-folder
//! binding wrappers.

use std::collections::BTreeMap;
use std::sync::Arc;

use lintbridge_core::{IssueTracker, LogLevel, ProjectBindingWrapper};
use serde_json::Value;
use tower_lsp::lsp_types::{
    DidChangeConfigurationParams, DidChangeWorkspaceFoldersParams, MessageType, WorkspaceFolder,
};
use tracing::{debug, info, warn};

use crate::backend::{binding_dto, BackendService, DidUpdateBindingParams};
use crate::client::{BindingSuggestion, ClientNotification, ReferenceBranchForFolder};
use crate::config::{FolderBinding, LaunchOptions, WorkspaceSettings};
use crate::log_output::ClientLogOutput;
use crate::state::ServerState;

/// Files whose properties identify the server project of a folder.
const PROJECT_PROPERTY_FILES: [&str; 2] = ["sonar-project.properties", ".sonarcloud.properties"];
const CLOUD_PROPERTY_FILE: &str = ".sonarcloud.properties";
const PROJECT_KEY_PROPERTY: &str = "sonar.projectKey";
const PROJECT_NAME_PROPERTY: &str = "sonar.projectName";

/// Installs the engine factory and registers the initial folders.
pub async fn initialize_workspace(
    state: &ServerState,
    folders: Vec<WorkspaceFolder>,
    launch: LaunchOptions,
) {
    let root = folders.first().and_then(|folder| folder.uri.to_file_path().ok());
    let fallback = launch.clone();
    // Reads the config file and may run `node --version`.
    let resolved = tokio::task::spawn_blocking(move || {
        let launch = match root {
            Some(root) => launch.with_config_file(&root),
            None => launch,
        };
        let runtime = launch.node_runtime().resolve();
        (launch, runtime)
    })
    .await;
    let (launch, runtime) = match resolved {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!("Launch option resolution did not complete: {err}");
            (fallback, None)
        }
    };
    if runtime.as_ref().is_some_and(|runtime| runtime.version.is_none()) {
        warn!("Configured Node.js runtime did not report a version");
        state
            .client()
            .notify(ClientNotification::OpenPathToNodeSettings)
            .await;
    }

    let log_output = ClientLogOutput::new(Arc::clone(state.client()), LogLevel::Info);
    state.install_factory(launch.engine_setup(Arc::new(log_output), runtime));
    state.set_launch_options(launch);
    state.set_workspace_folders(folders.clone());

    let scopes = folders
        .iter()
        .map(|folder| BackendService::resolve_scope_config(folder, None))
        .collect();
    if let Err(err) = state.backend().add_configuration_scopes(scopes).await {
        warn!("Failed to register configuration scopes: {err}");
    }
    info!("Workspace initialized with {} folders", folders.len());
}

pub async fn did_change_configuration(state: &ServerState, params: DidChangeConfigurationParams) {
    apply_settings(state, &params.settings).await;
}

pub(crate) async fn apply_settings(state: &ServerState, value: &Value) {
    let mut settings = WorkspaceSettings::from_value(value);
    resolve_tokens(state, &mut settings).await;
    let known: Vec<String> = state.connections().ids();
    let outdated = state.connections().replace_all(settings.connections.clone());

    if let Some(factory) = state.factory() {
        for connection_id in &outdated {
            if factory.stop_connected_engine(connection_id) {
                info!("Stopped engine of outdated connection '{connection_id}'");
            }
        }
    }
    for connection in &settings.connections {
        let id = &connection.connection_id;
        if !known.contains(id) || outdated.contains(id) {
            state.lint_client().report_connection_check(id).await;
        }
    }

    state.set_settings(settings.clone());
    apply_bindings(state, &settings, &outdated).await;
}

/// Asks the client for the tokens the settings do not carry.
async fn resolve_tokens(state: &ServerState, settings: &mut WorkspaceSettings) {
    for connection in settings.connections.iter_mut().filter(|c| c.token.is_none()) {
        match state
            .client()
            .get_token_for_server(connection.organization_or_url.clone())
            .await
        {
            Ok(token) => connection.token = token.filter(|token| !token.is_empty()),
            Err(err) => debug!(
                "No token for connection '{}': {}",
                connection.connection_id, err.message
            ),
        }
    }
}

pub async fn did_change_workspace_folders(
    state: &ServerState,
    params: DidChangeWorkspaceFoldersParams,
) {
    for folder in &params.event.removed {
        if !state.remove_workspace_folder(&folder.uri) {
            continue;
        }
        if let Some(wrapper) = state.bindings().unbind(folder.uri.as_str()) {
            debug!(
                "Dropped binding of removed folder {} to '{}'",
                folder.uri,
                wrapper.binding().project_key
            );
        }
        if let Err(err) = state
            .backend()
            .remove_configuration_scope(folder.uri.as_str())
            .await
        {
            warn!("Failed to remove configuration scope {}: {err}", folder.uri);
        }
    }

    let added = params.event.added;
    state.add_workspace_folders(&added);
    let scopes = added
        .iter()
        .map(|folder| BackendService::resolve_scope_config(folder, None))
        .collect();
    if let Err(err) = state.backend().add_configuration_scopes(scopes).await {
        warn!("Failed to register configuration scopes: {err}");
    }

    let settings = state.settings();
    apply_bindings(state, &settings, &[]).await;
}

/// Brings every folder's binding wrapper in line with `settings`.
///
/// A wrapper is rebuilt when its project or connection changed, when its
/// connection is in `outdated`, or when its engine was stopped.
async fn apply_bindings(state: &ServerState, settings: &WorkspaceSettings, outdated: &[String]) {
    let mut suggestions = BTreeMap::new();
    for folder in state.workspace_folders() {
        let folder_uri = folder.uri.as_str();
        let desired = settings.folder_bindings.get(folder_uri);
        let current = state.bindings().get(folder_uri);
        let unchanged = match (desired, &current) {
            (Some(desired), Some(current)) => {
                current.connection_id() == desired.connection_id
                    && *current.binding() == desired.project_binding()
                    && !outdated.contains(&desired.connection_id)
                    && !current.engine().is_stopped()
            }
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            match desired {
                Some(desired) => bind_folder(state, &folder, desired).await,
                None => {
                    state.bindings().unbind(folder_uri);
                }
            }
            let binding = state.bindings().get(folder_uri);
            let update = DidUpdateBindingParams {
                config_scope_id: folder_uri.to_string(),
                updated_binding: binding_dto(binding.as_deref()),
            };
            if let Err(err) = state.backend().update_binding(update).await {
                warn!("Failed to update binding of {folder_uri}: {err}");
            }
        }
        if desired.is_none() {
            let proposed = suggest_for_folder(state, &folder).await;
            if !proposed.is_empty() {
                suggestions.insert(folder_uri.to_string(), proposed);
            }
        }
    }
    if !suggestions.is_empty() {
        state.lint_client().suggest_binding(suggestions).await;
    }
}

async fn bind_folder(state: &ServerState, folder: &WorkspaceFolder, desired: &FolderBinding) {
    let folder_uri = folder.uri.as_str();
    let Some(connection) = state.connections().get(&desired.connection_id) else {
        warn!(
            "Folder {folder_uri} references unknown connection '{}'",
            desired.connection_id
        );
        state.bindings().unbind(folder_uri);
        return;
    };
    let engine = match state.connected_engine(&connection) {
        Ok(Some(engine)) => engine,
        Ok(None) => return,
        Err(err) => {
            warn!("Unable to bind {folder_uri}: {}", err.cause_chain());
            state
                .client()
                .log_message(
                    MessageType::ERROR,
                    format!("Unable to bind {folder_uri}: {err}"),
                )
                .await;
            state.bindings().unbind(folder_uri);
            return;
        }
    };
    let wrapper = ProjectBindingWrapper::new(
        connection.connection_id.clone(),
        desired.project_binding(),
        engine,
        IssueTracker::new(),
    );
    state.bindings().bind(folder_uri, wrapper);

    let branch_name = state
        .client()
        .get_branch_name_for_folder(folder_uri.to_string())
        .await
        .unwrap_or_else(|err| {
            debug!("Branch of {folder_uri} unavailable: {}", err.message);
            None
        });
    state
        .client()
        .notify(ClientNotification::SetReferenceBranchNameForFolder(
            ReferenceBranchForFolder {
                folder_uri: folder_uri.to_string(),
                branch_name,
            },
        ))
        .await;
}

/// Proposes connections for an unbound folder whose project property files
/// name a project key.
async fn suggest_for_folder(state: &ServerState, folder: &WorkspaceFolder) -> Vec<BindingSuggestion> {
    let connections: Vec<_> = state
        .connections()
        .ids()
        .into_iter()
        .filter_map(|id| state.connections().get(&id))
        .filter(|connection| !connection.disable_notifications)
        .collect();
    if connections.is_empty() {
        return Vec::new();
    }
    let filenames = PROJECT_PROPERTY_FILES.iter().map(|name| name.to_string()).collect();
    let found = match state
        .lint_client()
        .find_file_by_names_in_scope(folder.uri.as_str(), filenames)
        .await
    {
        Ok(found) => found,
        Err(err) => {
            debug!("No binding clues for {}: {err}", folder.uri);
            return Vec::new();
        }
    };

    let mut suggestions = Vec::new();
    for file in found {
        let Some(content) = file.content.as_deref() else {
            continue;
        };
        let properties = parse_properties(content);
        let Some(project_key) = properties.get(PROJECT_KEY_PROPERTY) else {
            continue;
        };
        let cloud_only = file.file_name == CLOUD_PROPERTY_FILE;
        let project_name = properties
            .get(PROJECT_NAME_PROPERTY)
            .unwrap_or(project_key);
        for connection in connections.iter().filter(|c| !cloud_only || c.is_cloud) {
            let suggestion = BindingSuggestion {
                connection_id: connection.connection_id.clone(),
                sonar_project_key: project_key.clone(),
                sonar_project_name: project_name.clone(),
            };
            if !suggestions.contains(&suggestion) {
                suggestions.push(suggestion);
            }
        }
    }
    suggestions
}

/// Parses `key=value` lines of a Java properties file. Comments and
/// continuation lines are not supported beyond skipping `#`/`!` lines.
fn parse_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let (key, value) = line.split_once(['=', ':'])?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
