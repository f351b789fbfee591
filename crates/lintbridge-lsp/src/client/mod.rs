//! Extended client protocol.
//!
//! Besides the standard LSP surface, the editor extension understands a set of
//! custom notifications and requests under the `sonarlint/` method namespace.
//! [`ExtendedClient`] is the seam every server component talks to the editor
//! through; the `tower_lsp::Client` implementation maps calls onto the wire.

mod callbacks;
mod protocol;

use std::collections::BTreeMap;

use lintbridge_core::{is_taint, IssueSeverity, RuleType, TextRange};
use serde::{Deserialize, Serialize};
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{Diagnostic, MessageType, PublishDiagnosticsParams, Url};
use tower_lsp::Client;

pub use callbacks::{BackendCallback, LintClient};

/// Binding proposals, keyed by configuration scope id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestBindingParams {
    pub suggestions: BTreeMap<String, Vec<BindingSuggestion>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSuggestion {
    pub connection_id: String,
    pub sonar_project_key: String,
    pub sonar_project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptionTab {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleParameter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Rule documentation shown by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowRuleDescriptionParams {
    pub key: String,
    pub name: String,
    pub html_description: String,
    pub html_description_tabs: Vec<RuleDescriptionTab>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: IssueSeverity,
    pub is_taint: bool,
    pub parameters: Vec<RuleParameter>,
}

impl ShowRuleDescriptionParams {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        html_description: impl Into<String>,
        rule_type: RuleType,
        severity: IssueSeverity,
    ) -> Self {
        let key = key.into();
        Self {
            is_taint: is_taint(&key, rule_type),
            key,
            name: name.into(),
            html_description: html_description.into(),
            html_description_tabs: Vec::new(),
            rule_type,
            severity,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tabs(mut self, tabs: Vec<RuleDescriptionTab>) -> Self {
        self.html_description_tabs = tabs;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<RuleParameter>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Hotspot opened from the server web application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowHotspotParams {
    pub key: String,
    pub message: String,
    pub rule_key: String,
    pub file_path: String,
    #[serde(default)]
    pub text_range: Option<TextRange>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceBranchForFolder {
    pub folder_uri: String,
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheckResult {
    pub connection_id: String,
    pub success: bool,
    pub reason: Option<String>,
}

impl ConnectionCheckResult {
    pub fn success(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            success: true,
            reason: None,
        }
    }

    pub fn failure(connection_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            success: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindFileByNamesInFolder {
    pub folder_uri: String,
    pub filenames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundFile {
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindFileByNamesInFolderResponse {
    pub found_files: Vec<FoundFile>,
}

/// Fire-and-forget signals sent to the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNotification {
    SuggestBinding(SuggestBindingParams),
    ShowOutput,
    /// Node.js was configured but could not be used.
    OpenPathToNodeSettings,
    /// Carries whether the settings page is for a cloud connection.
    OpenConnectionSettings(bool),
    ShowRuleDescription(ShowRuleDescriptionParams),
    BrowseTo(String),
    ShowNotificationForFirstSecretsIssue,
    SetReferenceBranchNameForFolder(ReferenceBranchForFolder),
    ReportConnectionCheckResult(ConnectionCheckResult),
    PublishSecurityHotspots(PublishDiagnosticsParams),
}

/// Everything the server sends to the editor.
#[tower_lsp::async_trait]
pub trait ExtendedClient: Send + Sync {
    async fn notify(&self, notification: ClientNotification);

    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>);

    async fn log_message(&self, level: MessageType, message: String);

    async fn find_file_by_names_in_folder(
        &self,
        params: FindFileByNamesInFolder,
    ) -> jsonrpc::Result<FindFileByNamesInFolderResponse>;

    async fn is_ignored_by_scm(&self, file_uri: String) -> jsonrpc::Result<bool>;

    async fn get_branch_name_for_folder(&self, folder_uri: String)
        -> jsonrpc::Result<Option<String>>;

    async fn get_token_for_server(&self, server_url_or_org: String)
        -> jsonrpc::Result<Option<String>>;
}

#[tower_lsp::async_trait]
impl ExtendedClient for Client {
    async fn notify(&self, notification: ClientNotification) {
        protocol::send(self, notification).await;
    }

    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        Client::publish_diagnostics(self, uri, diagnostics, None).await;
    }

    async fn log_message(&self, level: MessageType, message: String) {
        Client::log_message(self, level, message).await;
    }

    async fn find_file_by_names_in_folder(
        &self,
        params: FindFileByNamesInFolder,
    ) -> jsonrpc::Result<FindFileByNamesInFolderResponse> {
        self.send_request::<protocol::FindFileByNamesInFolderRequest>(params)
            .await
    }

    async fn is_ignored_by_scm(&self, file_uri: String) -> jsonrpc::Result<bool> {
        self.send_request::<protocol::IsIgnoredByScm>(file_uri).await
    }

    async fn get_branch_name_for_folder(
        &self,
        folder_uri: String,
    ) -> jsonrpc::Result<Option<String>> {
        self.send_request::<protocol::GetBranchNameForFolder>(folder_uri)
            .await
    }

    async fn get_token_for_server(
        &self,
        server_url_or_org: String,
    ) -> jsonrpc::Result<Option<String>> {
        self.send_request::<protocol::GetTokenForServer>(server_url_or_org)
            .await
    }
}
