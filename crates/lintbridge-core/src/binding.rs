//! Workspace scope bindings.
//!
//! A bound workspace folder has exactly one [`ProjectBindingWrapper`], which
//! ties together the connection id, the server project, the connected engine,
//! and the folder's issue tracker. Unbound folders have no wrapper.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::engine::EngineHandle;
use crate::tracker::IssueTracker;

/// Association between a local folder and a server project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBinding {
    pub project_key: String,
    /// Path prefix of the project's files on the server.
    pub server_path_prefix: String,
    /// Path prefix of the same files relative to the folder.
    pub ide_path_prefix: String,
}

impl ProjectBinding {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            server_path_prefix: String::new(),
            ide_path_prefix: String::new(),
        }
    }

    #[must_use]
    pub fn with_path_prefixes(
        mut self,
        server_path_prefix: impl Into<String>,
        ide_path_prefix: impl Into<String>,
    ) -> Self {
        self.server_path_prefix = server_path_prefix.into();
        self.ide_path_prefix = ide_path_prefix.into();
        self
    }

    /// Maps a folder-relative path to the server-side path. Prefixes match
    /// whole path segments only.
    pub fn server_path(&self, ide_path: &str) -> Option<String> {
        let rest = strip_segments(ide_path, &self.ide_path_prefix)?;
        let server_prefix = self.server_path_prefix.trim_end_matches('/');
        Some(match (server_prefix.is_empty(), rest.is_empty()) {
            (true, _) => rest.to_string(),
            (false, true) => server_prefix.to_string(),
            (false, false) => format!("{server_prefix}/{rest}"),
        })
    }
}

fn strip_segments<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest.trim_start_matches('/'))
    } else {
        None
    }
}

#[derive(Debug)]
pub struct ProjectBindingWrapper {
    connection_id: String,
    binding: ProjectBinding,
    engine: Arc<EngineHandle>,
    issue_tracker: IssueTracker,
}

impl ProjectBindingWrapper {
    pub fn new(
        connection_id: impl Into<String>,
        binding: ProjectBinding,
        engine: Arc<EngineHandle>,
        issue_tracker: IssueTracker,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            binding,
            engine,
            issue_tracker,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn binding(&self) -> &ProjectBinding {
        &self.binding
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    pub fn issue_tracker(&self) -> &IssueTracker {
        &self.issue_tracker
    }
}

/// Binding wrappers keyed by workspace folder URI.
#[derive(Debug, Default)]
pub struct ScopeBindings {
    wrappers: RwLock<FxHashMap<String, Arc<ProjectBindingWrapper>>>,
}

impl ScopeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `wrapper` for `folder_uri`, returning the wrapper it replaces.
    pub fn bind(
        &self,
        folder_uri: &str,
        wrapper: ProjectBindingWrapper,
    ) -> Option<Arc<ProjectBindingWrapper>> {
        info!(
            "Binding {folder_uri} to project '{}' on connection '{}'",
            wrapper.binding.project_key, wrapper.connection_id
        );
        self.wrappers
            .write()
            .insert(folder_uri.to_string(), Arc::new(wrapper))
    }

    pub fn unbind(&self, folder_uri: &str) -> Option<Arc<ProjectBindingWrapper>> {
        let removed = self.wrappers.write().remove(folder_uri);
        if removed.is_some() {
            info!("Unbound {folder_uri}");
        }
        removed
    }

    pub fn get(&self, folder_uri: &str) -> Option<Arc<ProjectBindingWrapper>> {
        self.wrappers.read().get(folder_uri).cloned()
    }

    /// Folders whose binding uses `connection_id`, sorted.
    pub fn folders_bound_to(&self, connection_id: &str) -> Vec<String> {
        let mut folders: Vec<_> = self
            .wrappers
            .read()
            .iter()
            .filter(|(_, wrapper)| wrapper.connection_id == connection_id)
            .map(|(folder, _)| folder.clone())
            .collect();
        folders.sort();
        folders
    }

    pub fn bound_folders(&self) -> Vec<String> {
        let mut folders: Vec<_> = self.wrappers.read().keys().cloned().collect();
        folders.sort();
        folders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_path_applies_prefixes() {
        let binding = ProjectBinding {
            project_key: "proj".to_string(),
            server_path_prefix: "module/src".to_string(),
            ide_path_prefix: "src".to_string(),
        };
        assert_eq!(
            binding.server_path("src/main/App.java").as_deref(),
            Some("module/src/main/App.java")
        );
        assert_eq!(binding.server_path("test/AppTest.java"), None);

        let plain = ProjectBinding::new("proj");
        assert_eq!(plain.server_path("a/b.py").as_deref(), Some("a/b.py"));
    }

    #[test]
    fn ide_prefix_matches_whole_segments_only() {
        let binding = ProjectBinding::new("proj").with_path_prefixes("module/src/", "/src/");
        assert_eq!(binding.server_path("srcgen/Gen.java"), None);
        assert_eq!(binding.server_path("src").as_deref(), Some("module/src"));
        assert_eq!(
            binding.server_path("src/App.java").as_deref(),
            Some("module/src/App.java")
        );
    }
}
