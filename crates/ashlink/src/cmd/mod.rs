use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod loopback;
pub mod presets;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the built-in configuration presets.
    Presets(PresetsArgs),
    /// Exchange frames with a simulated NCP and report link counters.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Presets(args) => presets::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PresetsArgs {
    /// Show every setting of one preset.
    pub index: Option<usize>,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Configuration preset index.
    #[arg(long, short = 'p', default_value = "0", conflicts_with = "config")]
    pub preset: usize,
    /// Read the configuration from a JSON file instead of a preset.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Number of frames to send.
    #[arg(long, short = 'n', default_value = "5")]
    pub count: usize,
    /// Payload size in bytes (3-128).
    #[arg(long, short = 's', default_value = "16")]
    pub size: usize,
    /// Override the transmit window size (1-7).
    #[arg(long)]
    pub window: Option<u8>,
    /// Send payloads without data randomization.
    #[arg(long)]
    pub no_randomize: bool,
    /// Lose the first transmission of every Nth frame.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub drop_every: Option<u32>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
