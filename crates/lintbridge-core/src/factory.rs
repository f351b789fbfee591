//! Engine registry and factory.
//!
//! The factory owns every engine it creates: at most one standalone engine and
//! one connected engine per connection id. Callers receive shared handles and
//! release them through the factory.
//!
//! [`EnginesFactory::stop_all`] closes the registry. An engine whose
//! provisioning was already under way at that point is handed back to its
//! caller stopped, never registered.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::config::{ConnectionSettings, EngineConfig, EngineSetup};
use crate::engine::{AnalysisEngine, EngineHandle, EngineKind, EngineProvider};
use crate::error::{BoxError, EngineError, EngineResult};
use crate::language::{Language, CONNECTED_ADDITIONAL_LANGUAGES, STANDALONE_LANGUAGES};
use crate::lifecycle::Lifecycle;

pub struct EnginesFactory {
    setup: EngineSetup,
    provider: Arc<dyn EngineProvider>,
    lifecycle: Arc<Lifecycle>,
    standalone: RwLock<Option<Arc<EngineHandle>>>,
    connected: RwLock<FxHashMap<String, Arc<EngineHandle>>>,
    /// Set by `stop_all`; checked under the registry write lock.
    closed: AtomicBool,
}

impl EnginesFactory {
    pub fn new(
        setup: EngineSetup,
        provider: Arc<dyn EngineProvider>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            setup,
            provider,
            lifecycle,
            standalone: RwLock::new(None),
            connected: RwLock::new(FxHashMap::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Languages enabled on every engine.
    pub fn standalone_languages() -> BTreeSet<Language> {
        STANDALONE_LANGUAGES.iter().copied().collect()
    }

    /// Languages enabled only on connected engines.
    pub fn connected_additional_languages() -> BTreeSet<Language> {
        CONNECTED_ADDITIONAL_LANGUAGES.iter().copied().collect()
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Provisions a new standalone engine.
    ///
    /// Every call creates a fresh instance; a previously registered standalone
    /// engine is stopped and replaced.
    pub fn create_standalone_engine(&self) -> EngineResult<Arc<EngineHandle>> {
        self.lifecycle.ensure_active()?;
        debug!("Starting standalone engine...");
        debug!("Using {} analyzers", self.setup.standalone_analyzers.len());

        let config = EngineConfig::standalone(&self.setup);
        let handle = self.provision(config, |provider, config| {
            provider.new_standalone_engine(config)
        })?;
        debug!("Standalone engine started");

        let previous = {
            let mut slot = self.standalone.write();
            if self.is_closed() {
                None
            } else {
                Some(slot.replace(Arc::clone(&handle)))
            }
        };
        match previous {
            None => discard(&handle),
            Some(Some(previous)) => {
                warn!("Replacing live standalone engine");
                previous.stop();
            }
            Some(None) => {}
        }
        Ok(handle)
    }

    /// Provisions a new engine bound to `connection_id`.
    ///
    /// A live engine already registered for the same id is stopped and
    /// replaced by the new instance.
    pub fn create_connected_engine(
        &self,
        connection_id: &str,
        settings: &ConnectionSettings,
    ) -> EngineResult<Arc<EngineHandle>> {
        self.lifecycle.ensure_active()?;
        debug!("Starting engine for connection '{connection_id}'...");

        let config = EngineConfig::connected(&self.setup, connection_id, settings);
        let handle = self.provision(config, |provider, config| {
            provider.new_connected_engine(config)
        })?;
        debug!("Engine started for connection '{connection_id}'");

        let previous = {
            let mut registry = self.connected.write();
            if self.is_closed() {
                None
            } else {
                Some(registry.insert(connection_id.to_string(), Arc::clone(&handle)))
            }
        };
        match previous {
            None => discard(&handle),
            Some(Some(previous)) => {
                warn!("Replacing live engine for connection '{connection_id}'");
                previous.stop();
            }
            Some(None) => {}
        }
        Ok(handle)
    }

    fn provision<F>(&self, config: EngineConfig, construct: F) -> EngineResult<Arc<EngineHandle>>
    where
        F: FnOnce(&dyn EngineProvider, &EngineConfig) -> Result<Box<dyn AnalysisEngine>, BoxError>,
    {
        let kind = config.kind().clone();
        let result = config
            .validate()
            .map_err(|err| EngineError::provisioning(kind.clone(), err))
            .and_then(|()| {
                construct(self.provider.as_ref(), &config)
                    .map_err(|err| EngineError::provisioning(kind.clone(), err))
            });
        match result {
            Ok(engine) => Ok(Arc::new(EngineHandle::new(config, engine))),
            Err(err) => {
                error!("{}", err.cause_chain());
                Err(err)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// One-way transition into shutdown. Live engines are left untouched.
    pub fn shutdown(&self) {
        self.lifecycle.begin_shutdown();
    }

    pub fn standalone_engine(&self) -> Option<Arc<EngineHandle>> {
        self.standalone.read().clone()
    }

    pub fn connected_engine(&self, connection_id: &str) -> Option<Arc<EngineHandle>> {
        self.connected.read().get(connection_id).cloned()
    }

    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.connected.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops and unregisters the standalone engine.
    pub fn stop_standalone_engine(&self) -> bool {
        let Some(handle) = self.standalone.write().take() else {
            return false;
        };
        handle.stop();
        true
    }

    /// Stops and unregisters the engine for `connection_id`.
    pub fn stop_connected_engine(&self, connection_id: &str) -> bool {
        let Some(handle) = self.connected.write().remove(connection_id) else {
            return false;
        };
        handle.stop();
        true
    }

    /// Stops every registered engine and closes the registry.
    pub fn stop_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_standalone_engine();
        let handles: Vec<_> = self.connected.write().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop();
        }
    }

    /// Returns the kinds of all registered engines.
    pub fn live_engines(&self) -> Vec<EngineKind> {
        let mut kinds = Vec::new();
        if let Some(handle) = self.standalone.read().as_ref() {
            kinds.push(handle.kind().clone());
        }
        for id in self.connection_ids() {
            kinds.push(EngineKind::Connected { connection_id: id });
        }
        kinds
    }
}

fn discard(handle: &EngineHandle) {
    warn!("Registry closed while the {} engine was starting, stopping it", handle.kind());
    handle.stop();
}
