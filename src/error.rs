//! Error types for document loading and configuration.
//!
//! Only failures that stop a run live here. Everything the engine can work
//! around is reported as a [`crate::Diagnostic`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading a schema document.
///
/// Fatal when raised for the top-level input; for external documents the
/// resolver downgrades them to a `FetchFailed` diagnostic.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot fetch {url}: HTTP fetching requires the 'remote' feature")]
    RemoteDisabled { url: String },

    // Parse errors (exit code 2)
    #[error("{locator} is neither JSON nor YAML: {message}")]
    InvalidDocument { locator: String, message: String },

    #[error("{locator} does not contain an object at its root")]
    NotAnObject { locator: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. }
            | LoadError::ReadError { .. }
            | LoadError::RemoteDisabled { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors in the injected graph configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid prefix pattern \"{pattern}\": {source}")]
    InvalidPrefixPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot load configuration: {0}")]
    Load(#[from] LoadError),

    #[error("invalid configuration in {locator}: {source}")]
    InvalidConfig {
        locator: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::Load(e) => e.exit_code(),
            _ => 2,
        }
    }
}

/// Errors from [`crate::analyze`].
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AnalyzeError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            AnalyzeError::Load(e) => e.exit_code(),
            AnalyzeError::Config(e) => e.exit_code(),
        }
    }
}
