//! Error types for configuration loading and process setup

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration or initializing the process
#[derive(Debug, Error)]
pub enum Error {
    /// A file referenced by the configuration could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to load
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected schema
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configuration parsed but is semantically invalid
    #[error("configuration error for {cluster}: {message}")]
    Config {
        /// Cluster id the problem relates to
        cluster: String,
        /// Description of what's invalid
        message: String,
    },

    /// Telemetry could not be initialized
    #[error("failed to initialize telemetry: {0}")]
    Telemetry(String),
}

impl Error {
    /// Create a configuration error for a cluster
    pub fn config(cluster: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            cluster: cluster.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
