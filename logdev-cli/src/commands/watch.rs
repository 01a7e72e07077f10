//! `logdev watch`: run the daemon with layered configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use logdev_core::{config, ConfigFile, WatchConfig};
use logdev_daemon::start_blocking;

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// YAML config file (default: ~/.logdev/config.yaml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File to watch.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Minimum spacing between reads, in milliseconds.
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Bytes read per accepted event.
    #[arg(long)]
    pub buffer_capacity: Option<usize>,

    /// Read once more after a suppressed burst settles.
    #[arg(long)]
    pub trailing_edge: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let config = self.resolve(&home)?;
        start_blocking(&home, config).context("daemon exited with error")
    }

    /// Defaults, then the config file, then flags.
    pub fn resolve(&self, home: &std::path::Path) -> Result<WatchConfig> {
        let base = match &self.config {
            Some(path) => WatchConfig::default().apply(
                &config::load_file(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
            ),
            None => config::load_at(home).context("failed to load config")?,
        };

        let resolved = base.apply(&self.flag_layer());
        resolved.validate().context("invalid watch configuration")?;
        Ok(resolved)
    }

    fn flag_layer(&self) -> ConfigFile {
        ConfigFile {
            path: self.path.clone(),
            debounce_ms: self.debounce_ms,
            buffer_capacity: self.buffer_capacity,
            trailing_edge: self.trailing_edge.then_some(true),
        }
    }
}
