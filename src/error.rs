//! Error types for store definition, assembly, and lookup.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No store registry is installed in the current application context")]
    RegistryNotInstalled,

    #[error("A store registry is already installed on this application")]
    RegistryAlreadyInstalled,

    #[error("This store registry is already installed on another application")]
    RegistryInUse,

    #[error("Invalid store definition: {0}")]
    InvalidDefinition(String),

    #[error("Store `{store}`: `{name}` is defined as both {first} and {second}")]
    NameCollision {
        store: String,
        name: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("Store `{store}` has no action `{name}`")]
    UnknownAction { store: String, name: String },

    #[error("Store `{store}` has no getter `{name}`")]
    UnknownGetter { store: String, name: String },

    #[error("State factory for store `{store}` failed: {source}")]
    StateFactory {
        store: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Plugin #{index} failed while assembling store `{store}`: {source}")]
    Plugin {
        store: String,
        index: usize,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Application(String),
}

impl StoreError {
    /// Error raised by application code (actions, state factories, plugins).
    pub fn application(message: impl Into<String>) -> Self {
        StoreError::Application(message.into())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
