//! Backend facade.
//!
//! [`BackendService`] translates server intents into calls on the backend's
//! sub-services and converts between workspace state and the backend DTOs.

mod local;

use std::sync::Arc;

use lintbridge_core::{EngineError, ProjectBindingWrapper};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_lsp::lsp_types::WorkspaceFolder;
use tracing::{debug, warn};

pub use local::LocalBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    /// No configuration scope is registered under the id.
    #[error("unknown configuration scope '{0}'")]
    UnknownScope(String),

    /// The scope exists but has no server binding.
    #[error("configuration scope '{0}' is not bound")]
    ScopeNotBound(String),

    /// A request to the editor client failed.
    #[error("client request failed: {0}")]
    Client(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl BackendError {
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            BackendError::Engine(EngineError::UnsupportedOperation { .. })
        )
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHotspotInBrowserParams {
    pub config_scope_id: String,
    pub branch: Option<String>,
    pub hotspot_key: String,
}

/// Binding section of a configuration scope. All fields are empty for
/// unbound scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingConfigurationDto {
    pub connection_id: Option<String>,
    pub sonar_project_key: Option<String>,
    pub binding_suggestion_disabled: bool,
}

impl BindingConfigurationDto {
    pub fn is_bound(&self) -> bool {
        self.connection_id.is_some() && self.sonar_project_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationScopeDto {
    pub id: String,
    pub parent_id: Option<String>,
    pub bindable: bool,
    pub name: String,
    pub binding: BindingConfigurationDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidUpdateBindingParams {
    pub config_scope_id: String,
    pub updated_binding: BindingConfigurationDto,
}

#[tower_lsp::async_trait]
pub trait HotspotService: Send + Sync {
    async fn open_hotspot_in_browser(&self, params: OpenHotspotInBrowserParams)
        -> BackendResult<()>;
}

#[tower_lsp::async_trait]
pub trait ConfigurationService: Send + Sync {
    async fn did_add_configuration_scopes(
        &self,
        scopes: Vec<ConfigurationScopeDto>,
    ) -> BackendResult<()>;

    async fn did_remove_configuration_scope(&self, config_scope_id: String) -> BackendResult<()>;

    async fn did_update_binding(&self, params: DidUpdateBindingParams) -> BackendResult<()>;
}

/// The analysis backend, split into sub-services.
pub trait Backend: Send + Sync {
    fn hotspot_service(&self) -> &dyn HotspotService;

    fn configuration_service(&self) -> &dyn ConfigurationService;
}

pub struct BackendService {
    backend: Arc<dyn Backend>,
}

impl BackendService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn open_hotspot_in_browser(
        &self,
        params: OpenHotspotInBrowserParams,
    ) -> BackendResult<()> {
        debug!(
            "Opening hotspot {} of scope {}",
            params.hotspot_key, params.config_scope_id
        );
        let hotspot_key = params.hotspot_key.clone();
        self.backend
            .hotspot_service()
            .open_hotspot_in_browser(params)
            .await
            .inspect_err(|err| warn!("Unable to open hotspot {hotspot_key}: {err}"))
    }

    pub async fn update_binding(&self, params: DidUpdateBindingParams) -> BackendResult<()> {
        debug!("Updating binding of scope {}", params.config_scope_id);
        self.backend
            .configuration_service()
            .did_update_binding(params)
            .await
    }

    pub async fn add_configuration_scopes(
        &self,
        scopes: Vec<ConfigurationScopeDto>,
    ) -> BackendResult<()> {
        if scopes.is_empty() {
            return Ok(());
        }
        self.backend
            .configuration_service()
            .did_add_configuration_scopes(scopes)
            .await
    }

    pub async fn remove_configuration_scope(&self, config_scope_id: &str) -> BackendResult<()> {
        self.backend
            .configuration_service()
            .did_remove_configuration_scope(config_scope_id.to_string())
            .await
    }

    /// Describes a workspace folder as a top-level configuration scope.
    pub fn resolve_scope_config(
        folder: &WorkspaceFolder,
        binding: Option<&ProjectBindingWrapper>,
    ) -> ConfigurationScopeDto {
        ConfigurationScopeDto {
            id: folder.uri.to_string(),
            parent_id: None,
            bindable: true,
            name: folder.name.clone(),
            binding: binding_dto(binding),
        }
    }
}

pub fn binding_dto(binding: Option<&ProjectBindingWrapper>) -> BindingConfigurationDto {
    match binding {
        Some(wrapper) => BindingConfigurationDto {
            connection_id: Some(wrapper.connection_id().to_string()),
            sonar_project_key: Some(wrapper.binding().project_key.clone()),
            binding_suggestion_disabled: false,
        },
        None => BindingConfigurationDto::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use lintbridge_core::{
        EngineSetup, EnginesFactory, IssueTracker, Lifecycle, ProjectBinding,
    };
    use parking_lot::Mutex;
    use tower_lsp::lsp_types::Url;

    use crate::test_support::NoopEngineProvider;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        fail_hotspots: bool,
    }

    #[tower_lsp::async_trait]
    impl HotspotService for RecordingBackend {
        async fn open_hotspot_in_browser(
            &self,
            params: OpenHotspotInBrowserParams,
        ) -> BackendResult<()> {
            self.calls
                .lock()
                .push(format!("hotspot {}", params.hotspot_key));
            if self.fail_hotspots {
                return Err(BackendError::ScopeNotBound(params.config_scope_id));
            }
            Ok(())
        }
    }

    #[tower_lsp::async_trait]
    impl ConfigurationService for RecordingBackend {
        async fn did_add_configuration_scopes(
            &self,
            scopes: Vec<ConfigurationScopeDto>,
        ) -> BackendResult<()> {
            self.calls.lock().push(format!("add {}", scopes.len()));
            Ok(())
        }

        async fn did_remove_configuration_scope(
            &self,
            config_scope_id: String,
        ) -> BackendResult<()> {
            self.calls.lock().push(format!("remove {config_scope_id}"));
            Ok(())
        }

        async fn did_update_binding(&self, params: DidUpdateBindingParams) -> BackendResult<()> {
            self.calls
                .lock()
                .push(format!("binding {}", params.config_scope_id));
            Ok(())
        }
    }

    impl Backend for RecordingBackend {
        fn hotspot_service(&self) -> &dyn HotspotService {
            self
        }

        fn configuration_service(&self) -> &dyn ConfigurationService {
            self
        }
    }

    fn folder() -> WorkspaceFolder {
        WorkspaceFolder {
            uri: Url::parse("file:///work/api").unwrap(),
            name: "api".to_string(),
        }
    }

    fn wrapper() -> ProjectBindingWrapper {
        let factory = EnginesFactory::new(
            EngineSetup::new(),
            Arc::new(NoopEngineProvider),
            Lifecycle::shared(),
        );
        let settings = lintbridge_core::ConnectionSettings {
            is_cloud_alias: false,
            token: None,
            organization_or_url: "https://sq.corp.example".to_string(),
        };
        let engine = factory.create_connected_engine("corp", &settings).unwrap();
        ProjectBindingWrapper::new(
            "corp",
            ProjectBinding::new("org.example:api"),
            engine,
            IssueTracker::new(),
        )
    }

    #[test]
    fn unbound_scope_has_empty_binding() {
        let scope = BackendService::resolve_scope_config(&folder(), None);
        assert_eq!(scope.id, "file:///work/api");
        assert_eq!(scope.parent_id, None);
        assert_eq!(scope.binding.connection_id, None);
        assert_eq!(scope.binding.sonar_project_key, None);
        assert!(!scope.binding.binding_suggestion_disabled);
        assert!(!scope.binding.is_bound());
    }

    #[test]
    fn bound_scope_reports_wrapper_identity() {
        let wrapper = wrapper();
        let scope = BackendService::resolve_scope_config(&folder(), Some(&wrapper));
        assert_eq!(scope.binding.connection_id.as_deref(), Some("corp"));
        assert_eq!(
            scope.binding.sonar_project_key.as_deref(),
            Some("org.example:api")
        );
        assert!(!scope.binding.binding_suggestion_disabled);
        assert_eq!(scope.parent_id, None);

        let actual = serde_json::to_string_pretty(&scope).unwrap();
        expect![[r#"
            {
              "id": "file:///work/api",
              "parentId": null,
              "bindable": true,
              "name": "api",
              "binding": {
                "connectionId": "corp",
                "sonarProjectKey": "org.example:api",
                "bindingSuggestionDisabled": false
              }
            }"#]]
        .assert_eq(&actual);
    }

    #[tokio::test]
    async fn intents_dispatch_to_sub_services() {
        let backend = Arc::new(RecordingBackend::default());
        let service = BackendService::new(Arc::clone(&backend) as Arc<dyn Backend>);

        service
            .open_hotspot_in_browser(OpenHotspotInBrowserParams {
                config_scope_id: "file:///work/api".to_string(),
                branch: Some("main".to_string()),
                hotspot_key: "AYh1".to_string(),
            })
            .await
            .unwrap();
        service
            .update_binding(DidUpdateBindingParams {
                config_scope_id: "file:///work/api".to_string(),
                updated_binding: BindingConfigurationDto::default(),
            })
            .await
            .unwrap();
        service.add_configuration_scopes(Vec::new()).await.unwrap();
        service
            .remove_configuration_scope("file:///work/api")
            .await
            .unwrap();

        assert_eq!(
            *backend.calls.lock(),
            vec![
                "hotspot AYh1".to_string(),
                "binding file:///work/api".to_string(),
                "remove file:///work/api".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn sub_service_errors_propagate() {
        let backend = Arc::new(RecordingBackend {
            fail_hotspots: true,
            ..RecordingBackend::default()
        });
        let service = BackendService::new(backend);
        let err = service
            .open_hotspot_in_browser(OpenHotspotInBrowserParams {
                config_scope_id: "file:///work/api".to_string(),
                branch: None,
                hotspot_key: "AYh1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ScopeNotBound(_)));
        assert!(!err.is_unsupported());
    }
}
