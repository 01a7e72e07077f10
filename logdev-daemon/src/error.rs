use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, backend, protocol and devices.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watch error: {0}")]
    Watch(#[from] logdev_core::WatchError),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("device {0} is busy")]
    DeviceBusy(String),

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("device {0} does not accept writes")]
    ReadOnlyDevice(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
