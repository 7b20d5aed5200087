//! Error types for the agent runtime.
//!
//! Runtime operations return `anyhow::Result`; the hard failures below are
//! raised as `RuntimeError` values so callers can classify them with
//! `err.downcast_ref::<RuntimeError>()`.

use thiserror::Error;

use crate::types::model::ModelType;
use crate::types::primitives::{UUIDError, UUID};

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A required setting is missing or a configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An identifier did not parse as a UUID.
    #[error(transparent)]
    InvalidUuid(#[from] UUIDError),

    /// Plugins depend on each other in a cycle.
    #[error("Plugin dependency cycle detected involving: {0}")]
    DependencyCycle(String),

    /// A plugin names a dependency that is neither registered nor supplied.
    #[error("Plugin '{plugin}' depends on '{dependency}', which is not available")]
    MissingDependency {
        /// Dependent plugin
        plugin: String,
        /// Missing dependency
        dependency: String,
    },

    /// A structurally required room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(UUID),

    /// The operation needs a persistence adapter and none is configured.
    #[error("No database adapter configured")]
    NoAdapter,

    /// No handler is registered for the model type.
    #[error("No handler registered for model type {0}")]
    ModelNotFound(ModelType),

    /// A service of this type is already registered.
    #[error("Service '{0}' is already registered")]
    DuplicateService(String),

    /// A service failed to start.
    #[error("Failed to start service '{service}': {source:#}")]
    ServiceStart {
        /// Service type
        service: String,
        /// Underlying failure
        source: anyhow::Error,
    },

    /// A plugin's init hook failed.
    #[error("Failed to initialize plugin '{plugin}': {source:#}")]
    PluginInit {
        /// Plugin name
        plugin: String,
        /// Underlying failure
        source: anyhow::Error,
    },

    /// A plugin failed validation.
    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    /// The knowledge semaphore was closed while waiting.
    #[error("Semaphore closed")]
    SemaphoreClosed,
}

/// Result type for runtime operations that do not need `anyhow`.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
