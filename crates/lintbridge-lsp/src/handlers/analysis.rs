//! Document analysis and diagnostics publication.

use std::sync::Arc;
use std::time::Instant;

use lintbridge_core::{
    AnalysisRequest, EngineError, InputFile, IssueSeverity, MergedFinding, ProjectBindingWrapper, RuleType,
    TextRange, TrackingKey,
};
use serde_json::json;
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, Location, MessageType, NumberOrString,
    Position, PublishDiagnosticsParams, Range, Url, WorkspaceFolder,
};
use tracing::{debug, info, warn};

use crate::client::ClientNotification;
use crate::state::ServerState;

pub(crate) const DIAGNOSTIC_SOURCE: &str = "lintbridge";

const SECRETS_RULE_PREFIX: &str = "secrets:";

pub async fn did_open(state: &ServerState, params: DidOpenTextDocumentParams) {
    let uri = params.text_document.uri;
    info!("Document opened: {uri}");
    analyze_document(state, &uri).await;
}

pub async fn did_save(state: &ServerState, params: DidSaveTextDocumentParams) {
    let uri = params.text_document.uri;
    debug!("Document saved: {uri}");
    analyze_document(state, &uri).await;
}

pub async fn did_close(state: &ServerState, params: DidCloseTextDocumentParams) {
    let uri = params.text_document.uri;
    debug!("Document closed: {uri}");
    state.client().publish_diagnostics(uri, Vec::new()).await;
}

/// Analyzes `uri` with the engine responsible for it and publishes the
/// tracked findings.
pub(crate) async fn analyze_document(state: &ServerState, uri: &Url) {
    if uri.scheme() != "file" {
        return;
    }
    match state.client().is_ignored_by_scm(uri.to_string()).await {
        Ok(true) => {
            debug!("Skipping {uri}: ignored by SCM");
            return;
        }
        Ok(false) => {}
        Err(err) => debug!("SCM status of {uri} unavailable: {}", err.message),
    }

    let folder = state.folder_for(uri);
    let wrapper = folder
        .as_ref()
        .and_then(|folder| state.bindings().get(folder.uri.as_str()));
    let engine = match &wrapper {
        Some(wrapper) => Arc::clone(wrapper.engine()),
        None => match state.standalone_engine() {
            Ok(Some(engine)) => engine,
            Ok(None) => {
                debug!("No engine available for {uri}");
                return;
            }
            Err(err) => {
                warn!("Unable to start standalone engine: {}", err.cause_chain());
                state
                    .client()
                    .log_message(MessageType::ERROR, err.cause_chain())
                    .await;
                if !matches!(err, EngineError::AlreadyShuttingDown) {
                    state.client().notify(ClientNotification::ShowOutput).await;
                }
                return;
            }
        },
    };

    let request = analysis_request(uri, folder.as_ref(), wrapper.as_deref());
    let kind = engine.kind().clone();
    let start = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || engine.analyze(&request)).await;
    let findings = match outcome {
        Ok(Ok(findings)) => findings,
        Ok(Err(err)) => {
            warn!("Analysis of {uri} failed: {}", err.cause_chain());
            state
                .client()
                .log_message(
                    MessageType::WARNING,
                    format!("Analysis of {uri} failed: {err}"),
                )
                .await;
            return;
        }
        Err(err) => {
            warn!("Analysis task for {uri} did not complete: {err}");
            return;
        }
    };
    state.record_analysis(&kind, findings.len(), start.elapsed());

    let found_secret = findings
        .iter()
        .any(|finding| finding.rule_key.starts_with(SECRETS_RULE_PREFIX));
    let tracked = match &wrapper {
        Some(wrapper) => wrapper.issue_tracker().track(uri.as_str(), findings),
        None => state.standalone_tracker().track(uri.as_str(), findings),
    };
    debug!("Publishing {} findings for {uri}", tracked.len());

    let (hotspots, issues): (Vec<_>, Vec<_>) = if wrapper.is_some() {
        tracked
            .into_iter()
            .partition(|(_, finding)| finding.rule_type() == RuleType::SecurityHotspot)
    } else {
        (Vec::new(), tracked)
    };
    let diagnostics = issues
        .iter()
        .map(|(key, finding)| to_diagnostic(uri, *key, finding))
        .collect();
    state
        .client()
        .publish_diagnostics(uri.clone(), diagnostics)
        .await;
    if wrapper.is_some() {
        let diagnostics = hotspots
            .iter()
            .map(|(key, finding)| to_diagnostic(uri, *key, finding))
            .collect();
        state
            .client()
            .notify(ClientNotification::PublishSecurityHotspots(
                PublishDiagnosticsParams {
                    uri: uri.clone(),
                    diagnostics,
                    version: None,
                },
            ))
            .await;
    }
    if found_secret && state.take_first_secrets_notification() {
        state
            .client()
            .notify(ClientNotification::ShowNotificationForFirstSecretsIssue)
            .await;
    }
}

fn analysis_request(
    uri: &Url,
    folder: Option<&WorkspaceFolder>,
    wrapper: Option<&ProjectBindingWrapper>,
) -> AnalysisRequest {
    let relative = folder.and_then(|folder| relative_path(&folder.uri, uri));
    let relative = match (relative, wrapper) {
        (Some(path), Some(wrapper)) => wrapper.binding().server_path(&path).or(Some(path)),
        (path, _) => path,
    };
    AnalysisRequest {
        base_dir: folder.and_then(|folder| folder.uri.to_file_path().ok()),
        files: vec![InputFile {
            uri: uri.to_string(),
            relative_path: relative,
        }],
    }
}

/// Path of `uri` relative to `folder`, percent-decoded.
pub(crate) fn relative_path(folder: &Url, uri: &Url) -> Option<String> {
    let base = folder.as_str().trim_end_matches('/');
    let rest = uri.as_str().strip_prefix(base)?.strip_prefix('/')?;
    urlencoding::decode(rest).ok().map(|path| path.into_owned())
}

pub(crate) fn to_diagnostic(uri: &Url, key: TrackingKey, finding: &MergedFinding) -> Diagnostic {
    Diagnostic {
        range: finding.text_range().map(to_lsp_range).unwrap_or_default(),
        severity: Some(diagnostic_severity(finding.severity())),
        code: Some(NumberOrString::String(finding.rule_key().to_string())),
        code_description: None,
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: finding.message().to_string(),
        related_information: related_information(uri, finding),
        tags: None,
        data: Some(json!({
            "trackingKey": key,
            "serverIssueKey": finding.server_issue_key(),
            "ruleType": finding.rule_type(),
            "isTaint": finding.is_taint(),
        })),
    }
}

fn diagnostic_severity(severity: IssueSeverity) -> DiagnosticSeverity {
    match severity {
        IssueSeverity::Blocker | IssueSeverity::Critical => DiagnosticSeverity::ERROR,
        IssueSeverity::Major => DiagnosticSeverity::WARNING,
        IssueSeverity::Minor => DiagnosticSeverity::INFORMATION,
        IssueSeverity::Info => DiagnosticSeverity::HINT,
    }
}

/// Lines are 1-based in findings and 0-based in LSP.
fn to_lsp_range(range: TextRange) -> Range {
    Range::new(
        Position::new(range.start_line.saturating_sub(1), range.start_line_offset),
        Position::new(range.end_line.saturating_sub(1), range.end_line_offset),
    )
}

fn related_information(
    uri: &Url,
    finding: &MergedFinding,
) -> Option<Vec<DiagnosticRelatedInformation>> {
    let related: Vec<_> = finding
        .flows()
        .iter()
        .flat_map(|flow| &flow.locations)
        .filter_map(|location| {
            let range = to_lsp_range(location.text_range?);
            let target = match &location.input_file {
                Some(file) => Url::parse(&file.uri).ok()?,
                None => uri.clone(),
            };
            Some(DiagnosticRelatedInformation {
                location: Location::new(target, range),
                message: location.message.clone().unwrap_or_default(),
            })
        })
        .collect();
    (!related.is_empty()).then_some(related)
}
