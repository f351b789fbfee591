//! Engine log sink writing to the editor output channel.

use std::sync::Arc;

use lintbridge_core::{LogLevel, LogOutput, TracingLogOutput};
use tokio::runtime::Handle;
use tower_lsp::lsp_types::MessageType;

use crate::client::ExtendedClient;

/// Forwards engine records to `window/logMessage` and to `tracing`.
///
/// Records below `min_level` only reach `tracing`.
pub struct ClientLogOutput {
    client: Arc<dyn ExtendedClient>,
    runtime: Option<Handle>,
    min_level: LogLevel,
}

impl ClientLogOutput {
    pub fn new(client: Arc<dyn ExtendedClient>, min_level: LogLevel) -> Self {
        Self {
            client,
            runtime: Handle::try_current().ok(),
            min_level,
        }
    }
}

impl LogOutput for ClientLogOutput {
    fn log(&self, level: LogLevel, message: &str) {
        TracingLogOutput.log(level, message);
        if level < self.min_level {
            return;
        }
        let Some(runtime) = &self.runtime else {
            return;
        };
        let client = Arc::clone(&self.client);
        let message = message.to_string();
        runtime.spawn(async move {
            client.log_message(message_type(level), message).await;
        });
    }
}

fn message_type(level: LogLevel) -> MessageType {
    match level {
        LogLevel::Error => MessageType::ERROR,
        LogLevel::Warn => MessageType::WARNING,
        LogLevel::Info => MessageType::INFO,
        LogLevel::Debug | LogLevel::Trace => MessageType::LOG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingClient;
    use std::time::Duration;

    #[tokio::test]
    async fn records_at_or_above_threshold_reach_client() {
        let recording = Arc::new(RecordingClient::default());
        let output = ClientLogOutput::new(
            Arc::clone(&recording) as Arc<dyn ExtendedClient>,
            LogLevel::Info,
        );
        output.log(LogLevel::Debug, "loading plugin");
        output.log(LogLevel::Warn, "plugin is slow");

        for _ in 0..50 {
            if !recording.logs().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            recording.logs(),
            vec![(MessageType::WARNING, "plugin is slow".to_string())]
        );
    }

    #[test]
    fn without_runtime_only_tracing_receives_records() {
        let recording = Arc::new(RecordingClient::default());
        let output = ClientLogOutput::new(
            Arc::clone(&recording) as Arc<dyn ExtendedClient>,
            LogLevel::Trace,
        );
        output.log(LogLevel::Error, "boom");
        assert!(recording.logs().is_empty());
    }
}
