//! `lintbridge-lsp` - Language server bridging editors to static-analysis engines.
//!
//! This is the main entry point for the lintbridge language server.

mod backend;
mod client;
mod config;
mod handlers;
mod http;
mod log_output;
mod state;
mod telemetry;
#[cfg(test)]
mod test_support;

use serde_json::Value;
use std::sync::Arc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::info;

use lintbridge_core::ProcessEngineProvider;

use crate::config::LaunchOptions;
use crate::handlers::COMMANDS;
use crate::state::ServerState;

/// The main language server struct.
pub struct LintBridgeServer {
    /// LSP client for sending notifications.
    client: Client,
    /// Server state.
    state: Arc<ServerState>,
}

impl LintBridgeServer {
    /// Creates a new language server instance.
    fn new(client: Client) -> Self {
        let state = ServerState::new(Arc::new(client.clone()), Arc::new(ProcessEngineProvider));
        Self {
            client,
            state: Arc::new(state),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for LintBridgeServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!("lintbridge language server initializing");

        let launch =
            LaunchOptions::from_initialization_options(params.initialization_options.as_ref());
        #[allow(deprecated)]
        let folders = match params.workspace_folders {
            Some(folders) => folders,
            None => params
                .root_uri
                .map(|uri| {
                    let name = uri
                        .path_segments()
                        .and_then(|mut segments| segments.next_back())
                        .unwrap_or_default()
                        .to_string();
                    vec![WorkspaceFolder { uri, name }]
                })
                .unwrap_or_default(),
        };
        handlers::initialize_workspace(&self.state, folders, launch).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::NONE),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: COMMANDS.iter().map(|command| command.to_string()).collect(),
                    ..Default::default()
                }),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "lintbridge-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("lintbridge language server initialized");
        self.client
            .log_message(MessageType::INFO, "lintbridge language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!("lintbridge language server shutting down");
        self.state.shutdown();
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        handlers::did_change_configuration(&self.state, params).await;
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        handlers::did_change_workspace_folders(&self.state, params).await;
    }

    // =========================================================================
    // Document Synchronization
    // =========================================================================

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        handlers::did_open(&self.state, params).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        handlers::did_save(&self.state, params).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        handlers::did_close(&self.state, params).await;
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        handlers::execute_command(&self.state, params).await
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting lintbridge language server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(LintBridgeServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
