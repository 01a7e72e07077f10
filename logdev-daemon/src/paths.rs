use std::path::{Path, PathBuf};
use std::time::Duration;

pub use logdev_core::config::{config_path_at, logdev_root};

pub const DAEMON_SOCKET: &str = "logdev.sock";

/// Upper bound on one dispatch (read + log) before the worker moves on.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Floor for the trailing-edge tick.
pub const MIN_TRAILING_TICK: Duration = Duration::from_millis(10);

pub fn socket_path(home: &Path) -> PathBuf {
    logdev_root(home).join(DAEMON_SOCKET)
}

/// Tick period for trailing-edge flushes: half the debounce interval.
pub fn trailing_tick(debounce: Duration) -> Duration {
    (debounce / 2).max(MIN_TRAILING_TICK)
}
