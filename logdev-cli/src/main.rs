//! logdev: watch one file for write-close and read it back.
//!
//! # Usage
//!
//! ```text
//! logdev watch [--config <file>] [--path <file>] [--debounce-ms <n>] [--buffer-capacity <n>] [--trailing-edge]
//! logdev status
//! logdev stop
//! logdev hello
//! logdev echo <text>
//! logdev read [--path <file>] [--buffer-capacity <n>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{device::EchoArgs, read::ReadArgs, watch::WatchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "logdev",
    version,
    about = "Watch a file for write-close events and log its contents",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the watch daemon in the foreground.
    Watch(WatchArgs),

    /// Query the running daemon over its control socket.
    Status,

    /// Ask the running daemon to shut down.
    Stop,

    /// Print the hello device's greeting.
    Hello,

    /// Write text to the null2 device.
    Echo(EchoArgs),

    /// Read the watched file once, the way the daemon does after a write-close.
    Read(ReadArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Watch(args) => args.run(),
        Commands::Status => commands::control::status(),
        Commands::Stop => commands::control::stop(),
        Commands::Hello => commands::device::hello(),
        Commands::Echo(args) => args.run(),
        Commands::Read(args) => args.run(),
    }
}
