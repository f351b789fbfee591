//! Engine handles and the pluggable engine provider seam.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{BoxError, EngineError, EngineResult};
use crate::finding::{Finding, InputFile};

/// Identity of an engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// The single engine with no server association.
    Standalone,
    /// An engine bound to a server connection.
    Connected { connection_id: String },
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Standalone => f.write_str("standalone"),
            EngineKind::Connected { connection_id } => write!(f, "connected '{connection_id}'"),
        }
    }
}

/// Files submitted for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Root the input files' relative paths are resolved against.
    pub base_dir: Option<PathBuf>,
    pub files: Vec<InputFile>,
}

/// An opaque analysis engine.
///
/// Implementations are not required to support concurrent `analyze` calls;
/// callers serialize access when the engine needs it.
pub trait AnalysisEngine: Send + Sync {
    fn analyze(&self, config: &EngineConfig, request: &AnalysisRequest)
        -> EngineResult<Vec<Finding>>;

    /// Releases engine resources. Called at most once per instance.
    fn stop(&self) {}
}

/// Constructs engine instances from a validated configuration.
pub trait EngineProvider: Send + Sync {
    fn new_standalone_engine(
        &self,
        config: &EngineConfig,
    ) -> Result<Box<dyn AnalysisEngine>, BoxError>;

    fn new_connected_engine(
        &self,
        config: &EngineConfig,
    ) -> Result<Box<dyn AnalysisEngine>, BoxError>;
}

/// A live engine together with the configuration it was created from.
pub struct EngineHandle {
    config: EngineConfig,
    engine: Box<dyn AnalysisEngine>,
    stopped: AtomicBool,
}

impl EngineHandle {
    pub(crate) fn new(config: EngineConfig, engine: Box<dyn AnalysisEngine>) -> Self {
        Self {
            config,
            engine,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &EngineKind {
        self.config.kind()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the engine over `request`.
    pub fn analyze(&self, request: &AnalysisRequest) -> EngineResult<Vec<Finding>> {
        if self.is_stopped() {
            return Err(EngineError::EngineStopped(self.kind().clone()));
        }
        self.engine.analyze(&self.config, request)
    }

    /// Stops the engine; later calls are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.engine.stop();
        debug!("Stopped {} engine", self.kind());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("kind", self.kind())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSetup;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingEngine {
        stops: Arc<AtomicUsize>,
    }

    impl AnalysisEngine for CountingEngine {
        fn analyze(&self, _: &EngineConfig, _: &AnalysisRequest) -> EngineResult<Vec<Finding>> {
            Ok(Vec::new())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stop_is_idempotent_and_blocks_analysis() {
        let stops = Arc::new(AtomicUsize::new(0));
        let handle = EngineHandle::new(
            EngineConfig::standalone(&EngineSetup::new()),
            Box::new(CountingEngine {
                stops: Arc::clone(&stops),
            }),
        );
        assert!(handle.analyze(&AnalysisRequest::default()).is_ok());

        handle.stop();
        handle.stop();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(matches!(
            handle.analyze(&AnalysisRequest::default()),
            Err(EngineError::EngineStopped(EngineKind::Standalone))
        ));
    }

    #[test]
    fn kind_display_names_connection() {
        let kind = EngineKind::Connected {
            connection_id: "sq".to_string(),
        };
        assert_eq!(kind.to_string(), "connected 'sq'");
    }
}
