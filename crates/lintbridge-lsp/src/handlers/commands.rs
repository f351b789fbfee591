//! `workspace/executeCommand` handlers.

use std::time::Instant;

use lintbridge_core::{IssueSeverity, RuleType, TrackingKey};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{ExecuteCommandParams, Url};
use tracing::{debug, warn};

use super::analysis::analyze_document;
use super::to_rpc_error;
use crate::backend::OpenHotspotInBrowserParams;
use crate::client::{
    BackendCallback, ClientNotification, RuleDescriptionTab, RuleParameter,
    ShowRuleDescriptionParams,
};
use crate::state::ServerState;

pub const OPEN_HOTSPOT_COMMAND: &str = "lintbridge.openHotspotInBrowser";
pub const CHANGE_SEVERITY_COMMAND: &str = "lintbridge.changeIssueSeverity";
pub const RESOLVE_ISSUE_COMMAND: &str = "lintbridge.resolveIssue";
pub const SHOW_RULE_DESCRIPTION_COMMAND: &str = "lintbridge.showRuleDescription";
/// Relays a callback from the analysis backend; see [`BackendCallback`].
pub const BACKEND_CALLBACK_COMMAND: &str = "lintbridge.backendCallback";

pub const COMMANDS: [&str; 5] = [
    OPEN_HOTSPOT_COMMAND,
    CHANGE_SEVERITY_COMMAND,
    RESOLVE_ISSUE_COMMAND,
    SHOW_RULE_DESCRIPTION_COMMAND,
    BACKEND_CALLBACK_COMMAND,
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenHotspotArgs {
    file_uri: Url,
    hotspot_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSeverityArgs {
    uri: Url,
    tracking_key: TrackingKey,
    /// `None` clears the override.
    #[serde(default)]
    severity: Option<IssueSeverity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveIssueArgs {
    uri: Url,
    tracking_key: TrackingKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShowRuleDescriptionArgs {
    rule_key: String,
    name: String,
    html_description: String,
    #[serde(default)]
    tabs: Vec<RuleDescriptionTab>,
    #[serde(rename = "type")]
    rule_type: RuleType,
    severity: IssueSeverity,
    #[serde(default)]
    parameters: Vec<RuleParameter>,
}

pub async fn execute_command(
    state: &ServerState,
    params: ExecuteCommandParams,
) -> jsonrpc::Result<Option<Value>> {
    let start = Instant::now();
    let result = match params.command.as_str() {
        OPEN_HOTSPOT_COMMAND => open_hotspot(state, parse_args(params.arguments)?).await,
        CHANGE_SEVERITY_COMMAND => change_severity(state, parse_args(params.arguments)?).await,
        RESOLVE_ISSUE_COMMAND => resolve_issue(state, parse_args(params.arguments)?).await,
        SHOW_RULE_DESCRIPTION_COMMAND => {
            show_rule_description(state, parse_args(params.arguments)?).await
        }
        BACKEND_CALLBACK_COMMAND => backend_callback(state, parse_args(params.arguments)?).await,
        other => {
            warn!("Unknown command: {other}");
            return Ok(None);
        }
    };
    state.record_command(&params.command, start.elapsed());
    result
}

async fn open_hotspot(
    state: &ServerState,
    args: OpenHotspotArgs,
) -> jsonrpc::Result<Option<Value>> {
    let folder = state
        .folder_for(&args.file_uri)
        .ok_or_else(|| invalid_params(format!("{} is outside the workspace", args.file_uri)))?;
    let branch = state
        .client()
        .get_branch_name_for_folder(folder.uri.to_string())
        .await
        .unwrap_or_else(|err| {
            debug!("Branch of {} unavailable: {}", folder.uri, err.message);
            None
        });
    state
        .backend()
        .open_hotspot_in_browser(OpenHotspotInBrowserParams {
            config_scope_id: folder.uri.to_string(),
            branch,
            hotspot_key: args.hotspot_key,
        })
        .await
        .map_err(|err| to_rpc_error(&err))?;
    Ok(None)
}

async fn change_severity(
    state: &ServerState,
    args: ChangeSeverityArgs,
) -> jsonrpc::Result<Option<Value>> {
    let changed = state.with_tracker(&args.uri, |tracker| {
        tracker.override_severity(args.tracking_key, args.severity)
    });
    if !changed {
        return Err(unknown_tracking_key(args.tracking_key));
    }
    analyze_document(state, &args.uri).await;
    Ok(Some(Value::Bool(true)))
}

async fn resolve_issue(
    state: &ServerState,
    args: ResolveIssueArgs,
) -> jsonrpc::Result<Option<Value>> {
    let resolved = state.with_tracker(&args.uri, |tracker| tracker.mark_resolved(args.tracking_key));
    if !resolved {
        return Err(unknown_tracking_key(args.tracking_key));
    }
    analyze_document(state, &args.uri).await;
    Ok(Some(Value::Bool(true)))
}

async fn show_rule_description(
    state: &ServerState,
    args: ShowRuleDescriptionArgs,
) -> jsonrpc::Result<Option<Value>> {
    let params = ShowRuleDescriptionParams::new(
        args.rule_key,
        args.name,
        args.html_description,
        args.rule_type,
        args.severity,
    )
    .with_tabs(args.tabs)
    .with_parameters(args.parameters);
    state
        .client()
        .notify(ClientNotification::ShowRuleDescription(params))
        .await;
    Ok(None)
}

async fn backend_callback(
    state: &ServerState,
    callback: BackendCallback,
) -> jsonrpc::Result<Option<Value>> {
    let value = state
        .lint_client()
        .dispatch(callback)
        .await
        .map_err(|err| to_rpc_error(&err))?;
    Ok(Some(value))
}

/// Commands take exactly one JSON object argument.
fn parse_args<T: DeserializeOwned>(arguments: Vec<Value>) -> jsonrpc::Result<T> {
    let [argument]: [Value; 1] = arguments
        .try_into()
        .map_err(|_| invalid_params("expected exactly one argument"))?;
    serde_json::from_value(argument).map_err(|err| invalid_params(err.to_string()))
}

fn unknown_tracking_key(key: TrackingKey) -> jsonrpc::Error {
    invalid_params(format!("unknown tracking key {}", key.value()))
}

fn invalid_params(message: impl Into<String>) -> jsonrpc::Error {
    jsonrpc::Error::invalid_params(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExtendedClient;
    use crate::test_support::{RecordingClient, ScriptedEngineProvider};
    use lintbridge_core::{EngineSetup, Finding, TextRange};
    use serde_json::json;
    use std::sync::Arc;
    use tower_lsp::jsonrpc::ErrorCode;
    use tower_lsp::lsp_types::{DiagnosticSeverity, WorkspaceFolder};

    fn state_with(findings: Vec<Finding>) -> (ServerState, Arc<RecordingClient>) {
        let recording = Arc::new(RecordingClient::default());
        let provider = ScriptedEngineProvider::default();
        provider.set_findings(findings);
        let state = ServerState::new(
            Arc::clone(&recording) as Arc<dyn ExtendedClient>,
            Arc::new(provider),
        );
        state.install_factory(EngineSetup::new());
        state.set_workspace_folders(vec![WorkspaceFolder {
            uri: Url::parse("file:///work/api").unwrap(),
            name: "api".to_string(),
        }]);
        (state, recording)
    }

    fn unused_local() -> Finding {
        Finding {
            rule_key: "python:S1481".to_string(),
            message: "Remove the unused local variable \"tmp\".".to_string(),
            severity: IssueSeverity::Minor,
            rule_type: Some(RuleType::CodeSmell),
            text_range: Some(TextRange {
                start_line: 4,
                start_line_offset: 4,
                end_line: 4,
                end_line_offset: 7,
            }),
            input_file: None,
            flows: Vec::new(),
            quick_fixes: Vec::new(),
            rule_description_context_key: None,
            vulnerability_probability: None,
        }
    }

    fn command(name: &str, arguments: Vec<Value>) -> ExecuteCommandParams {
        ExecuteCommandParams {
            command: name.to_string(),
            arguments,
            work_done_progress_params: Default::default(),
        }
    }

    #[tokio::test]
    async fn unknown_command_returns_none() {
        let (state, _) = state_with(Vec::new());
        let result = execute_command(&state, command("lintbridge.nope", Vec::new())).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn arguments_are_validated() {
        let (state, _) = state_with(Vec::new());
        let err = execute_command(&state, command(CHANGE_SEVERITY_COMMAND, Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);

        let err = execute_command(
            &state,
            command(CHANGE_SEVERITY_COMMAND, vec![json!({"uri": "file:///work/api/a.py"})]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn change_severity_republishes_with_override() {
        let (state, recording) = state_with(vec![unused_local()]);
        let uri = Url::parse("file:///work/api/a.py").unwrap();
        analyze_document(&state, &uri).await;
        let key = state.standalone_tracker().records_for(uri.as_str())[0].0;

        let result = execute_command(
            &state,
            command(
                CHANGE_SEVERITY_COMMAND,
                vec![json!({"uri": uri, "trackingKey": key, "severity": "CRITICAL"})],
            ),
        )
        .await
        .unwrap();

        assert_eq!(result, Some(Value::Bool(true)));
        let diagnostics = recording.last_diagnostics(&uri).unwrap();
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));
    }

    #[tokio::test]
    async fn change_severity_rejects_unknown_key() {
        let (state, _) = state_with(Vec::new());
        let err = execute_command(
            &state,
            command(
                CHANGE_SEVERITY_COMMAND,
                vec![json!({"uri": "file:///work/api/a.py", "trackingKey": 99, "severity": null})],
            ),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.message, "unknown tracking key 99");
    }

    #[tokio::test]
    async fn resolved_issue_disappears() {
        let (state, recording) = state_with(vec![unused_local()]);
        let uri = Url::parse("file:///work/api/a.py").unwrap();
        analyze_document(&state, &uri).await;
        let key = state.standalone_tracker().records_for(uri.as_str())[0].0;

        execute_command(
            &state,
            command(
                RESOLVE_ISSUE_COMMAND,
                vec![json!({"uri": uri, "trackingKey": key})],
            ),
        )
        .await
        .unwrap();

        assert_eq!(recording.last_diagnostics(&uri), Some(Vec::new()));
    }

    #[tokio::test]
    async fn rule_description_is_forwarded() {
        let (state, recording) = state_with(Vec::new());
        execute_command(
            &state,
            command(
                SHOW_RULE_DESCRIPTION_COMMAND,
                vec![json!({
                    "ruleKey": "javasecurity:S3649",
                    "name": "SQL queries should not be vulnerable to injection attacks",
                    "htmlDescription": "<p>Injection</p>",
                    "type": "VULNERABILITY",
                    "severity": "BLOCKER",
                })],
            ),
        )
        .await
        .unwrap();

        let notifications = recording.notifications();
        let [ClientNotification::ShowRuleDescription(params)] = notifications.as_slice() else {
            panic!("expected a rule description, got {notifications:?}");
        };
        assert!(params.is_taint);
        assert!(params.html_description_tabs.is_empty());
    }

    #[tokio::test]
    async fn unsupported_backend_callbacks_fail_with_method_not_found() {
        let (state, recording) = state_with(Vec::new());
        for (method, params) in [
            ("getHostInfo", Value::Null),
            ("showMessage", json!({"level": 3, "text": "hello"})),
            ("getHttpClientNoAuth", json!({"serverUrl": "https://sq.example"})),
            ("assistCreatingConnection", json!({"serverUrl": "https://sq.example"})),
            ("assistBinding", json!({"connectionId": "corp", "projectKey": "api"})),
            (
                "showHotspot",
                json!({
                    "key": "AYh",
                    "message": "Make sure this is safe",
                    "ruleKey": "java:S2245",
                    "filePath": "src/Main.java",
                }),
            ),
        ] {
            let mut callback = json!({"method": method});
            if !params.is_null() {
                callback["params"] = params;
            }
            let err = execute_command(&state, command(BACKEND_CALLBACK_COMMAND, vec![callback]))
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::MethodNotFound, "{method}");
            assert_eq!(err.message, format!("unsupported operation: {method}"));
        }
        assert!(recording.notifications().is_empty());
    }

    #[tokio::test]
    async fn backend_callback_relays_supported_calls() {
        let (state, recording) = state_with(Vec::new());
        let result = execute_command(
            &state,
            command(
                BACKEND_CALLBACK_COMMAND,
                vec![json!({
                    "method": "openUrlInBrowser",
                    "params": {"url": "https://sq.corp.example/project"},
                })],
            ),
        )
        .await
        .unwrap();
        assert_eq!(result, Some(Value::Null));
        assert_eq!(
            recording.notifications(),
            vec![ClientNotification::BrowseTo(
                "https://sq.corp.example/project".to_string()
            )]
        );

        let err = execute_command(
            &state,
            command(BACKEND_CALLBACK_COMMAND, vec![json!({"method": "reboot"})]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn hotspot_in_unbound_folder_is_rejected() {
        let (state, recording) = state_with(Vec::new());
        let err = execute_command(
            &state,
            command(
                OPEN_HOTSPOT_COMMAND,
                vec![json!({"fileUri": "file:///work/api/a.py", "hotspotKey": "AYx1"})],
            ),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert!(recording.notifications().is_empty());
    }
}
