//! Engine lifecycle errors.

use std::error::Error as StdError;

use thiserror::Error;

use crate::engine::EngineKind;

/// Boxed cause carried by provisioning failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by the engine registry, engines, and capability adapters.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The process-wide lifecycle has terminated; no engine may be created.
    #[error("language server is shutting down, won't create engine")]
    AlreadyShuttingDown,

    /// The underlying engine construction failed.
    #[error("error starting {kind} engine")]
    ProvisioningFailure {
        kind: EngineKind,
        #[source]
        source: BoxError,
    },

    /// The capability is intentionally not implemented.
    #[error("unsupported operation: {capability}")]
    UnsupportedOperation { capability: &'static str },

    /// No connection settings are known for the connection id.
    #[error("unknown connection '{0}'")]
    UnknownConnection(String),

    /// An analyzer plugin produced output that could not be used.
    #[error("analyzer plugin {plugin} failed: {reason}")]
    InvalidPluginOutput { plugin: String, reason: String },

    /// The engine has been stopped and can no longer analyze.
    #[error("{0} engine is stopped")]
    EngineStopped(EngineKind),
}

impl EngineError {
    /// Wraps a construction error for an engine of `kind`.
    pub fn provisioning(kind: EngineKind, source: impl Into<BoxError>) -> Self {
        EngineError::ProvisioningFailure {
            kind,
            source: source.into(),
        }
    }

    /// Builds the error returned by capabilities that are not implemented.
    pub fn unsupported(capability: &'static str) -> Self {
        EngineError::UnsupportedOperation { capability }
    }

    /// Renders the error together with its full `source` chain.
    pub fn cause_chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = StdError::source(self);
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn cause_chain_includes_provisioning_source() {
        let err = EngineError::provisioning(
            EngineKind::Standalone,
            std::io::Error::new(std::io::ErrorKind::NotFound, "plugin missing"),
        );
        assert_eq!(
            err.cause_chain(),
            "error starting standalone engine: plugin missing"
        );
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn unsupported_names_capability() {
        let err = EngineError::unsupported("showMessage");
        assert_eq!(err.to_string(), "unsupported operation: showMessage");
    }

    #[test]
    fn messages_render_engine_kind() {
        let connected = EngineKind::Connected {
            connection_id: "corp".to_string(),
        };
        let rendered = [
            EngineError::AlreadyShuttingDown,
            EngineError::UnknownConnection("corp".to_string()),
            EngineError::InvalidPluginOutput {
                plugin: "python".to_string(),
                reason: "missing ruleKey".to_string(),
            },
            EngineError::EngineStopped(connected),
        ]
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
        expect![[r#"
            language server is shutting down, won't create engine
            unknown connection 'corp'
            analyzer plugin python failed: missing ruleKey
            connected 'corp' engine is stopped"#]]
        .assert_eq(&rendered);
    }
}
