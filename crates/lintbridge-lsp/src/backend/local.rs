//! In-process backend.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use lintbridge_core::EngineError;

use super::{
    Backend, BackendError, BackendResult, ConfigurationScopeDto, ConfigurationService,
    DidUpdateBindingParams, HotspotService, OpenHotspotInBrowserParams,
};
use crate::client::LintClient;
use crate::config::ConnectionStore;

/// Backend keeping configuration scopes in memory and answering hotspot
/// requests by pointing the editor at the server web application.
pub struct LocalBackend {
    scopes: RwLock<FxHashMap<String, ConfigurationScopeDto>>,
    connections: Arc<ConnectionStore>,
    client: Arc<LintClient>,
}

impl LocalBackend {
    pub fn new(client: Arc<LintClient>, connections: Arc<ConnectionStore>) -> Self {
        Self {
            scopes: RwLock::new(FxHashMap::default()),
            connections,
            client,
        }
    }

    pub fn scope(&self, config_scope_id: &str) -> Option<ConfigurationScopeDto> {
        self.scopes.read().get(config_scope_id).cloned()
    }

    fn hotspot_url(&self, params: &OpenHotspotInBrowserParams) -> BackendResult<String> {
        let scope = self
            .scope(&params.config_scope_id)
            .ok_or_else(|| BackendError::UnknownScope(params.config_scope_id.clone()))?;
        let (Some(connection_id), Some(project_key)) = (
            scope.binding.connection_id.as_deref(),
            scope.binding.sonar_project_key.as_deref(),
        ) else {
            return Err(BackendError::ScopeNotBound(scope.id));
        };
        let connection = self
            .connections
            .get(connection_id)
            .ok_or_else(|| EngineError::UnknownConnection(connection_id.to_string()))?;

        let mut url = format!(
            "{}/security_hotspots?id={}",
            connection.server_url(),
            urlencoding::encode(project_key)
        );
        if let Some(branch) = params.branch.as_deref().filter(|branch| !branch.is_empty()) {
            url.push_str("&branch=");
            url.push_str(&urlencoding::encode(branch));
        }
        url.push_str("&hotspots=");
        url.push_str(&urlencoding::encode(&params.hotspot_key));
        Ok(url)
    }
}

#[tower_lsp::async_trait]
impl HotspotService for LocalBackend {
    async fn open_hotspot_in_browser(
        &self,
        params: OpenHotspotInBrowserParams,
    ) -> BackendResult<()> {
        let url = self.hotspot_url(&params)?;
        self.client.open_url_in_browser(&url).await;
        Ok(())
    }
}

#[tower_lsp::async_trait]
impl ConfigurationService for LocalBackend {
    async fn did_add_configuration_scopes(
        &self,
        scopes: Vec<ConfigurationScopeDto>,
    ) -> BackendResult<()> {
        let mut guard = self.scopes.write();
        for scope in scopes {
            info!("Added configuration scope {}", scope.id);
            guard.insert(scope.id.clone(), scope);
        }
        Ok(())
    }

    async fn did_remove_configuration_scope(&self, config_scope_id: String) -> BackendResult<()> {
        if self.scopes.write().remove(&config_scope_id).is_none() {
            return Err(BackendError::UnknownScope(config_scope_id));
        }
        info!("Removed configuration scope {config_scope_id}");
        Ok(())
    }

    async fn did_update_binding(&self, params: DidUpdateBindingParams) -> BackendResult<()> {
        let mut guard = self.scopes.write();
        let scope = guard
            .get_mut(&params.config_scope_id)
            .ok_or_else(|| BackendError::UnknownScope(params.config_scope_id.clone()))?;
        debug!(
            "Scope {} bound to {:?}/{:?}",
            scope.id, params.updated_binding.connection_id, params.updated_binding.sonar_project_key
        );
        scope.binding = params.updated_binding;
        Ok(())
    }
}

impl Backend for LocalBackend {
    fn hotspot_service(&self) -> &dyn HotspotService {
        self
    }

    fn configuration_service(&self) -> &dyn ConfigurationService {
        self
    }
}
