//! `logdev status` / `logdev stop`.

use anyhow::{Context, Result};

use logdev_daemon::paths::socket_path;
use logdev_daemon::{request_status, request_stop, DaemonError};

pub fn status() -> Result<()> {
    let home = super::home_dir()?;
    let payload = match request_status(&home) {
        Ok(status) => status,
        Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
            "running": false,
            "socket": socket_path(&home).display().to_string(),
        }),
        Err(err) => return Err(err).context("failed to query daemon status"),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render daemon status JSON")?
    );
    Ok(())
}

pub fn stop() -> Result<()> {
    let home = super::home_dir()?;
    match request_stop(&home) {
        Ok(()) => println!("daemon stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
        Err(err) => return Err(err).context("failed to stop daemon"),
    }
    Ok(())
}
