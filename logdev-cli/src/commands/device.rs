//! `logdev hello` / `logdev echo`: the device siblings, served by the daemon.

use anyhow::{Context, Result};
use clap::Args;

use logdev_daemon::{request_read, request_write, DeviceKind};

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Text to write to null2.
    pub text: String,
}

pub fn hello() -> Result<()> {
    let home = super::home_dir()?;
    let reply = request_read(&home, DeviceKind::Hello).context("failed to read hello device")?;
    print!("{reply}");
    Ok(())
}

impl EchoArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let written = request_write(&home, DeviceKind::Null2, &self.text)
            .context("failed to write null2 device")?;
        println!("wrote {written} bytes to null2");
        Ok(())
    }
}
