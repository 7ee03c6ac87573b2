// src/infra/errors.rs — Error types for Switchboard

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    // Load-time errors (local to one load attempt)
    #[error("Plugin '{name}' not found")]
    NotFound { name: String },

    #[error("Plugin '{name}' violates the plugin contract: {reason}")]
    ContractViolation { name: String, reason: String },

    #[error("Plugin '{name}' failed to initialize: {message}")]
    InstantiationError { name: String, message: String },

    // Request-time errors (always caught at the router boundary)
    #[error("Plugin '{name}' failed to handle request: {message}")]
    HandleError { name: String, message: String },

    #[error("Classifier error: {0}")]
    ClassifierError(String),

    #[error("Empty request")]
    EmptyRequest,

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
