//! Unified error types for deptrail.
//!
//! Per-dependency and per-commit failures are caught at the point of use and
//! logged; only structural failures propagate through these types to abort the
//! current project or repository.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for deptrail operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DepTrailError {
    /// Errors while grouping raw file paths into parse contexts
    #[error("Extraction failed: {context}")]
    Extraction {
        context: String,
        #[source]
        source: ExtractionErrorKind,
    },

    /// Errors while parsing a manifest, lockfile or dependency tree
    #[error("Failed to parse dependency data: {context}")]
    Parse {
        context: String,
        #[source]
        source: ParseErrorKind,
    },

    /// Errors from upstream package registries
    #[error("Registry lookup failed: {context}")]
    Registry {
        context: String,
        #[source]
        source: RegistryErrorKind,
    },

    /// Errors from the cache layer
    #[error("Cache operation failed: {context}")]
    Cache {
        context: String,
        #[source]
        source: CacheErrorKind,
    },

    /// Errors reading git objects or manipulating a working tree
    #[error("Git access failed: {0}")]
    Git(String),

    /// External build-tool invocation failed or produced no output
    #[error("Build tool failed: {0}")]
    BuildTool(String),

    /// IO errors with context
    #[error("IO error at {path:?}: {message}")]
    Io {
        path: Option<PathBuf>,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Specific extraction error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExtractionErrorKind {
    #[error("No parser available for context kind '{0}'")]
    NoParser(String),

    #[error("Context kind '{kind}' is not supported yet: {detail}")]
    UnsupportedContext { kind: String, detail: String },

    #[error("Lockfile generation failed for {manifest}: {message}")]
    LockfileGeneration { manifest: String, message: String },
}

/// Specific parse error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ParseErrorKind {
    #[error("Invalid JSON structure: {0}")]
    InvalidJson(String),

    #[error("Invalid XML structure: {0}")]
    InvalidXml(String),

    #[error("Missing required field: {field} in {context}")]
    MissingField { field: String, context: String },

    #[error("Malformed dependency-tree line: {0}")]
    MalformedTreeLine(String),

    #[error("Empty or unreadable input: {0}")]
    EmptyInput(String),
}

/// Specific registry error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryErrorKind {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("All registrars in the chain failed for '{0}'")]
    ChainExhausted(String),
}

/// Specific cache error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CacheErrorKind {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Convenient Result type for deptrail operations
pub type Result<T> = std::result::Result<T, DepTrailError>;

impl DepTrailError {
    /// Create an extraction error with context
    pub fn extraction(context: impl Into<String>, source: ExtractionErrorKind) -> Self {
        Self::Extraction {
            context: context.into(),
            source,
        }
    }

    /// Create a parse error with context
    pub fn parse(context: impl Into<String>, source: ParseErrorKind) -> Self {
        Self::Parse {
            context: context.into(),
            source,
        }
    }

    /// Create a parse error for a missing field
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::parse(
            "missing required field",
            ParseErrorKind::MissingField {
                field: field.into(),
                context: context.into(),
            },
        )
    }

    /// Create a registry error with context
    pub fn registry(context: impl Into<String>, source: RegistryErrorKind) -> Self {
        Self::Registry {
            context: context.into(),
            source,
        }
    }

    /// Create a cache error with context
    pub fn cache(context: impl Into<String>, source: CacheErrorKind) -> Self {
        Self::Cache {
            context: context.into(),
            source,
        }
    }

    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        let message = format!("{source}");
        Self::Io {
            path: Some(path),
            message,
            source,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<std::io::Error> for DepTrailError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: None,
            message: format!("{err}"),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DepTrailError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(
            "JSON deserialization",
            ParseErrorKind::InvalidJson(err.to_string()),
        )
    }
}

impl From<git2::Error> for DepTrailError {
    fn from(err: git2::Error) -> Self {
        Self::Git(err.to_string())
    }
}
