//! Error types for logdev-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while arming or servicing the watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The configured target path could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A watch group, mark, or the read buffer could not be created.
    #[error("failed to allocate {resource}: {reason}")]
    Allocation { resource: Resource, reason: String },

    /// The mark could not be bound to the target.
    #[error("failed to attach mark to {path}: {reason}")]
    Attach { path: PathBuf, reason: String },

    /// Reading the target's current contents failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// YAML parse error on config load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Underlying I/O failure outside of the read path (config load).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    /// Stable single-word failure reason, suitable for exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            WatchError::Resolution(_) => "resolution",
            WatchError::Allocation { .. } => "allocation",
            WatchError::Attach { .. } => "attach",
            WatchError::Read(_) => "read",
            WatchError::Config(_) | WatchError::ConfigParse { .. } | WatchError::Io { .. } => {
                "config"
            }
        }
    }

    pub fn allocation(resource: Resource, reason: impl Into<String>) -> Self {
        WatchError::Allocation {
            resource,
            reason: reason.into(),
        }
    }

    pub fn attach(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WatchError::Attach {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to turn a configured path into a watch target.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("watch target {path} not found")]
    TargetNotFound { path: PathBuf },

    /// The path exists in some form but cannot be followed or used
    /// (permissions, dangling symlink, not a regular file).
    #[error("watch target {path} unreachable: {reason}")]
    TargetUnreachable { path: PathBuf, reason: String },
}

/// Failure inside the content reader.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Zero bytes came back from the read.
    #[error("{path} is empty or unreadable")]
    EmptyOrUnreadable { path: PathBuf },
}

/// Resources that can fail to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Group,
    Mark,
    Buffer,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Group => "watch group",
            Resource::Mark => "watch mark",
            Resource::Buffer => "read buffer",
        };
        f.write_str(s)
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
