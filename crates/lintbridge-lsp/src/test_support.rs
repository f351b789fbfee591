//! Test helpers shared across LSP unit tests.

use std::sync::{Arc, Mutex};

use lintbridge_core::error::BoxError;
use lintbridge_core::{
    AnalysisEngine, AnalysisRequest, EngineConfig, EngineProvider, EngineResult, Finding,
};
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};
use tower_lsp::{Client, LanguageServer, LspService};

use crate::client::{
    ClientNotification, ExtendedClient, FindFileByNamesInFolder, FindFileByNamesInFolderResponse,
    FoundFile,
};

pub(crate) fn test_client() -> Client {
    struct DummyServer;

    #[tower_lsp::async_trait]
    impl LanguageServer for DummyServer {
        async fn initialize(
            &self,
            _: tower_lsp::lsp_types::InitializeParams,
        ) -> tower_lsp::jsonrpc::Result<tower_lsp::lsp_types::InitializeResult> {
            Ok(tower_lsp::lsp_types::InitializeResult::default())
        }

        async fn shutdown(&self) -> tower_lsp::jsonrpc::Result<()> {
            Ok(())
        }
    }

    let captured = Arc::new(Mutex::new(None));
    let captured_clone = captured.clone();
    let (_service, socket) = LspService::new(move |client| {
        *captured_clone.lock().expect("lock test client") = Some(client.clone());
        DummyServer
    });
    drop(socket);

    let client = captured
        .lock()
        .expect("lock test client")
        .take()
        .expect("test client");
    client
}

/// Editor stand-in recording everything the server sends.
#[derive(Default)]
pub(crate) struct RecordingClient {
    notifications: Mutex<Vec<ClientNotification>>,
    diagnostics: Mutex<Vec<(Url, Vec<Diagnostic>)>>,
    logs: Mutex<Vec<(MessageType, String)>>,
    file_searches: Mutex<Vec<FindFileByNamesInFolder>>,
    found_files: Mutex<Vec<FoundFile>>,
    branch: Mutex<Option<String>>,
    ignored: Mutex<Vec<String>>,
    token: Mutex<Option<String>>,
}

impl RecordingClient {
    pub(crate) fn notifications(&self) -> Vec<ClientNotification> {
        self.notifications.lock().expect("lock notifications").clone()
    }

    pub(crate) fn diagnostics(&self) -> Vec<(Url, Vec<Diagnostic>)> {
        self.diagnostics.lock().expect("lock diagnostics").clone()
    }

    /// Diagnostics most recently published for `uri`.
    pub(crate) fn last_diagnostics(&self, uri: &Url) -> Option<Vec<Diagnostic>> {
        self.diagnostics()
            .into_iter()
            .rev()
            .find(|(published, _)| published == uri)
            .map(|(_, diagnostics)| diagnostics)
    }

    pub(crate) fn logs(&self) -> Vec<(MessageType, String)> {
        self.logs.lock().expect("lock logs").clone()
    }

    pub(crate) fn file_searches(&self) -> Vec<FindFileByNamesInFolder> {
        self.file_searches.lock().expect("lock searches").clone()
    }

    pub(crate) fn set_found_files(&self, files: Vec<FoundFile>) {
        *self.found_files.lock().expect("lock found files") = files;
    }

    pub(crate) fn set_branch(&self, branch: Option<&str>) {
        *self.branch.lock().expect("lock branch") = branch.map(str::to_string);
    }

    pub(crate) fn set_token(&self, token: Option<&str>) {
        *self.token.lock().expect("lock token") = token.map(str::to_string);
    }

    pub(crate) fn ignore(&self, uri: &str) {
        self.ignored.lock().expect("lock ignored").push(uri.to_string());
    }
}

#[tower_lsp::async_trait]
impl ExtendedClient for RecordingClient {
    async fn notify(&self, notification: ClientNotification) {
        self.notifications
            .lock()
            .expect("lock notifications")
            .push(notification);
    }

    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.diagnostics
            .lock()
            .expect("lock diagnostics")
            .push((uri, diagnostics));
    }

    async fn log_message(&self, level: MessageType, message: String) {
        self.logs.lock().expect("lock logs").push((level, message));
    }

    async fn find_file_by_names_in_folder(
        &self,
        params: FindFileByNamesInFolder,
    ) -> jsonrpc::Result<FindFileByNamesInFolderResponse> {
        self.file_searches
            .lock()
            .expect("lock searches")
            .push(params);
        Ok(FindFileByNamesInFolderResponse {
            found_files: self.found_files.lock().expect("lock found files").clone(),
        })
    }

    async fn is_ignored_by_scm(&self, file_uri: String) -> jsonrpc::Result<bool> {
        Ok(self
            .ignored
            .lock()
            .expect("lock ignored")
            .contains(&file_uri))
    }

    async fn get_branch_name_for_folder(
        &self,
        _folder_uri: String,
    ) -> jsonrpc::Result<Option<String>> {
        Ok(self.branch.lock().expect("lock branch").clone())
    }

    async fn get_token_for_server(
        &self,
        _server_url_or_org: String,
    ) -> jsonrpc::Result<Option<String>> {
        Ok(self.token.lock().expect("lock token").clone())
    }
}

/// Provider whose engines never report anything.
pub(crate) struct NoopEngineProvider;

impl EngineProvider for NoopEngineProvider {
    fn new_standalone_engine(&self, _: &EngineConfig) -> Result<Box<dyn AnalysisEngine>, BoxError> {
        Ok(Box::new(ScriptedEngine::default()))
    }

    fn new_connected_engine(&self, _: &EngineConfig) -> Result<Box<dyn AnalysisEngine>, BoxError> {
        Ok(Box::new(ScriptedEngine::default()))
    }
}

/// Provider whose engines all report the same scripted findings.
#[derive(Clone, Default)]
pub(crate) struct ScriptedEngineProvider {
    findings: Arc<Mutex<Vec<Finding>>>,
    requests: Arc<Mutex<Vec<AnalysisRequest>>>,
}

impl ScriptedEngineProvider {
    pub(crate) fn set_findings(&self, findings: Vec<Finding>) {
        *self.findings.lock().expect("lock findings") = findings;
    }

    pub(crate) fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().expect("lock requests").clone()
    }

    fn engine(&self) -> ScriptedEngine {
        ScriptedEngine {
            findings: Arc::clone(&self.findings),
            requests: Arc::clone(&self.requests),
        }
    }
}

impl EngineProvider for ScriptedEngineProvider {
    fn new_standalone_engine(&self, _: &EngineConfig) -> Result<Box<dyn AnalysisEngine>, BoxError> {
        Ok(Box::new(self.engine()))
    }

    fn new_connected_engine(&self, _: &EngineConfig) -> Result<Box<dyn AnalysisEngine>, BoxError> {
        Ok(Box::new(self.engine()))
    }
}

#[derive(Default)]
struct ScriptedEngine {
    findings: Arc<Mutex<Vec<Finding>>>,
    requests: Arc<Mutex<Vec<AnalysisRequest>>>,
}

impl AnalysisEngine for ScriptedEngine {
    fn analyze(&self, _: &EngineConfig, request: &AnalysisRequest) -> EngineResult<Vec<Finding>> {
        self.requests
            .lock()
            .expect("lock requests")
            .push(request.clone());
        Ok(self.findings.lock().expect("lock findings").clone())
    }
}
