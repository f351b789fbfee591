//! `lintbridge-core` - Analysis engine lifecycle and issue identity reconciliation.
//!
//! This crate is the coordination core of the lintbridge language server:
//!
//! - **Engine registry**: provisions one standalone engine and any number of
//!   connected engines (keyed by connection id), guarded by a one-way
//!   shutdown lifecycle
//! - **Engine configuration**: immutable per-engine records built by one
//!   constructor per engine kind
//! - **Issue overlay**: merges freshly computed findings with persisted
//!   tracking metadata (severity overrides, server identity)
//! - **Scope bindings**: one binding wrapper per bound workspace folder,
//!   owning the folder's issue tracker
//!
//! The analysis itself is delegated to an [`EngineProvider`]; the crate ships a
//! [`ProcessEngineProvider`] that runs external analyzer executables.
//!
//! # Example
//!
//! ```ignore
//! use lintbridge_core::{EnginesFactory, EngineSetup, Lifecycle};
//!
//! let factory = EnginesFactory::new(setup, provider, Lifecycle::shared());
//! let engine = factory.create_standalone_engine()?;
//! let findings = engine.analyze(&request)?;
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![allow(clippy::module_name_repetitions)]

pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod finding;
pub mod language;
pub mod lifecycle;
pub mod overlay;
pub mod process_engine;
pub mod tracker;

pub use binding::{ProjectBinding, ProjectBindingWrapper, ScopeBindings};
pub use config::{
    ConfigError, ConnectionSettings, EngineConfig, EngineSetup, LogLevel, LogOutput,
    ModulesProvider, RuntimeInfo, ServerFlavor, TracingLogOutput,
};
pub use engine::{AnalysisEngine, AnalysisRequest, EngineHandle, EngineKind, EngineProvider};
pub use error::{EngineError, EngineResult};
pub use factory::EnginesFactory;
pub use finding::{
    is_taint, Finding, Flow, InputFile, IssueLocation, IssueSeverity, QuickFix, RuleType,
    TextEdit, TextRange, VulnerabilityProbability,
};
pub use language::Language;
pub use lifecycle::Lifecycle;
pub use overlay::{merge, MergedFinding, TrackedRecord};
pub use process_engine::ProcessEngineProvider;
pub use tracker::{IssueTracker, TrackingKey};
