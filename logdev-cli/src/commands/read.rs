//! `logdev read`: one bounded read of the watched file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use logdev_core::{config, dispatcher::read_header_line, ContentReader};

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// File to read (default: the configured watch path).
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Maximum bytes to read (default: the configured capacity).
    #[arg(long)]
    pub buffer_capacity: Option<usize>,
}

impl ReadArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let defaults = config::load_at(&home).context("failed to load config")?;
        let path = self.path.unwrap_or(defaults.path);
        let capacity = self.buffer_capacity.unwrap_or(defaults.buffer_capacity);

        let mut reader = ContentReader::new(&path, capacity)
            .with_context(|| format!("cannot prepare reader for {}", path.display()))?;
        let contents = reader
            .read_current_contents()
            .with_context(|| format!("failed to read {}", path.display()))?;

        println!("{}", read_header_line(contents.bytes_read()));
        println!("{}", contents.to_string_lossy());
        Ok(())
    }
}
