use std::path::PathBuf;
use thiserror::Error;

/// Build error codes.
pub mod codes {
    pub const BUILD_ENTRY_NOT_FOUND: &str = "BUILD_ENTRY_NOT_FOUND";
    pub const BUILD_RESOLVE_ERROR: &str = "BUILD_RESOLVE_ERROR";
    pub const BUILD_READ_ERROR: &str = "BUILD_READ_ERROR";
    pub const BUILD_TRANSFORM_ERROR: &str = "BUILD_TRANSFORM_ERROR";
    pub const BUILD_SOURCEMAP_ERROR: &str = "BUILD_SOURCEMAP_ERROR";
    pub const PLUGIN_ERROR: &str = "PLUGIN_ERROR";
    pub const BUILD_INTERNAL_ERROR: &str = "BUILD_INTERNAL_ERROR";
}

/// A failure while reading, transforming, bundling or post-processing source.
///
/// Returned as a value rather than raised so the watch loop can route it to
/// the error sink and keep running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub code: &'static str,
    pub message: String,
    pub path: Option<String>,
}

impl BuildError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} ({})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BuildError {}

/// What kind of capability failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Transform,
    Preset,
    Plugin,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Preset => "preset",
            Self::Plugin => "plugin",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for sluice.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Environment '{env}' is not defined in {path}")]
    UnknownEnvironment { env: String, path: PathBuf },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot resolve {kind} '{name}': {reason}")]
    Resolution {
        kind: CapabilityKind,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("File watcher failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    #[must_use]
    pub fn resolution(kind: CapabilityKind, name: &str, reason: impl Into<String>) -> Self {
        Self::Resolution {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build and IO failures are contained per cycle in watch mode;
    /// everything else aborts startup.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Build(_) | Self::Io { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
