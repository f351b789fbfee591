//! Callbacks the analysis backend makes into the editor.

use std::collections::BTreeMap;
use std::sync::Arc;

use lintbridge_core::EngineError;
use serde::Deserialize;
use serde_json::Value;
use tower_lsp::lsp_types::MessageType;
use tracing::debug;

use crate::backend::{BackendError, BackendResult};
use crate::config::ConnectionStore;
use crate::http::{HttpClient, HttpClientProvider};

use super::{
    BindingSuggestion, ClientNotification, ConnectionCheckResult, ExtendedClient,
    FindFileByNamesInFolder, FoundFile, ShowHotspotParams, SuggestBindingParams,
};

/// A callback the analysis backend makes, relayed by the editor extension.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BackendCallback {
    SuggestBinding {
        suggestions: BTreeMap<String, Vec<BindingSuggestion>>,
    },
    OpenUrlInBrowser {
        url: String,
    },
    FindFileByNamesInScope {
        config_scope_id: String,
        filenames: Vec<String>,
    },
    GetHttpClient {
        connection_id: String,
    },
    GetHttpClientNoAuth {
        server_url: String,
    },
    ShowMessage {
        level: MessageType,
        text: String,
    },
    GetHostInfo,
    ShowHotspot(ShowHotspotParams),
    AssistCreatingConnection {
        server_url: String,
    },
    AssistBinding {
        connection_id: String,
        project_key: String,
    },
}

/// Adapter answering backend callbacks through the editor client.
///
/// Capabilities the editor integration does not offer fail with
/// [`EngineError::UnsupportedOperation`] instead of succeeding silently.
pub struct LintClient {
    client: Arc<dyn ExtendedClient>,
    connections: Arc<ConnectionStore>,
    http: HttpClientProvider,
}

impl LintClient {
    pub fn new(client: Arc<dyn ExtendedClient>, connections: Arc<ConnectionStore>) -> Self {
        Self {
            client,
            connections,
            http: HttpClientProvider,
        }
    }

    /// Answers `callback`; the value is the JSON result handed back to the
    /// backend.
    pub async fn dispatch(&self, callback: BackendCallback) -> BackendResult<Value> {
        debug!("Backend callback {callback:?}");
        match callback {
            BackendCallback::SuggestBinding { suggestions } => {
                self.suggest_binding(suggestions).await;
                Ok(Value::Null)
            }
            BackendCallback::OpenUrlInBrowser { url } => {
                self.open_url_in_browser(&url).await;
                Ok(Value::Null)
            }
            BackendCallback::FindFileByNamesInScope {
                config_scope_id,
                filenames,
            } => {
                let found = self
                    .find_file_by_names_in_scope(&config_scope_id, filenames)
                    .await?;
                Ok(serde_json::to_value(found).unwrap_or_default())
            }
            BackendCallback::GetHttpClient { connection_id } => Ok(self
                .get_http_client(&connection_id)
                .map_or(Value::Null, |http| http.to_json())),
            BackendCallback::GetHttpClientNoAuth { server_url } => self
                .get_http_client_no_auth(&server_url)
                .map(|http| http.to_json()),
            BackendCallback::ShowMessage { level, text } => {
                self.show_message(level, &text).await.map(|()| Value::Null)
            }
            BackendCallback::GetHostInfo => self.get_host_info().map(Value::String),
            BackendCallback::ShowHotspot(hotspot) => {
                self.show_hotspot(hotspot).await.map(|()| Value::Null)
            }
            BackendCallback::AssistCreatingConnection { server_url } => self
                .assist_creating_connection(&server_url)
                .await
                .map(Value::String),
            BackendCallback::AssistBinding {
                connection_id,
                project_key,
            } => self
                .assist_binding(&connection_id, &project_key)
                .await
                .map(Value::String),
        }
    }

    pub async fn suggest_binding(&self, suggestions: BTreeMap<String, Vec<BindingSuggestion>>) {
        self.client
            .notify(ClientNotification::SuggestBinding(SuggestBindingParams {
                suggestions,
            }))
            .await;
    }

    pub async fn open_url_in_browser(&self, url: &str) {
        debug!("Opening {url} in browser");
        self.client
            .notify(ClientNotification::BrowseTo(url.to_string()))
            .await;
    }

    pub async fn find_file_by_names_in_scope(
        &self,
        config_scope_id: &str,
        filenames: Vec<String>,
    ) -> BackendResult<Vec<FoundFile>> {
        let response = self
            .client
            .find_file_by_names_in_folder(FindFileByNamesInFolder {
                folder_uri: config_scope_id.to_string(),
                filenames,
            })
            .await
            .map_err(|err| BackendError::Client(err.message.into_owned()))?;
        Ok(response.found_files)
    }

    /// Token-authenticated client for a configured connection.
    pub fn get_http_client(&self, connection_id: &str) -> Option<HttpClient> {
        let connection = self.connections.get(connection_id)?;
        let token = connection.token.clone()?;
        Some(self.http.with_token(connection.server_url(), token))
    }

    pub fn get_http_client_no_auth(&self, _server_url: &str) -> BackendResult<HttpClient> {
        Err(EngineError::unsupported("getHttpClientNoAuth").into())
    }

    pub async fn show_message(&self, _level: MessageType, _text: &str) -> BackendResult<()> {
        Err(EngineError::unsupported("showMessage").into())
    }

    pub fn get_host_info(&self) -> BackendResult<String> {
        Err(EngineError::unsupported("getHostInfo").into())
    }

    pub async fn show_hotspot(&self, _hotspot: ShowHotspotParams) -> BackendResult<()> {
        Err(EngineError::unsupported("showHotspot").into())
    }

    pub async fn assist_creating_connection(&self, _server_url: &str) -> BackendResult<String> {
        Err(EngineError::unsupported("assistCreatingConnection").into())
    }

    pub async fn assist_binding(
        &self,
        _connection_id: &str,
        _project_key: &str,
    ) -> BackendResult<String> {
        Err(EngineError::unsupported("assistBinding").into())
    }

    /// Tells the editor whether the connection can authenticate. A known
    /// connection without a token also opens its settings page.
    pub async fn report_connection_check(&self, connection_id: &str) {
        let connection = self.connections.get(connection_id);
        let (result, settings_page) = match (&connection, self.get_http_client(connection_id)) {
            (_, Some(_)) => (ConnectionCheckResult::success(connection_id), None),
            (Some(connection), None) => (
                ConnectionCheckResult::failure(connection_id, "No token configured"),
                Some(connection.is_cloud),
            ),
            (None, None) => (
                ConnectionCheckResult::failure(connection_id, "Unknown connection"),
                None,
            ),
        };
        self.client
            .notify(ClientNotification::ReportConnectionCheckResult(result))
            .await;
        if let Some(is_cloud) = settings_page {
            self.client
                .notify(ClientNotification::OpenConnectionSettings(is_cloud))
                .await;
        }
    }
}
