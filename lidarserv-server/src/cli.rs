use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Realtime LiDAR perception: background subtraction, clustering and
/// tracking over a recorded or live stream of sensor frames.
#[derive(Debug, Parser)]
pub struct PerceptionOptions {
    /// Verbosity of the command line output.
    #[clap(long, default_value = "info")]
    pub log_level: log::Level,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the perception pipeline over a recorded frame sequence.
    Run(RunOptions),
}

#[derive(Args, Debug)]
pub struct RunOptions {
    /// Sensor id this run processes frames for.
    #[clap(long, default_value = "0")]
    pub sensor_id: u32,

    /// Path to a `SensorParams` JSON config file. A default configuration
    /// is used if omitted.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Path to a JSON array of recorded frames (`{frame_ts_ns, points}`).
    pub frames: PathBuf,

    /// Write the final background grid snapshot to this path on exit.
    #[clap(long)]
    pub snapshot_out: Option<PathBuf>,
}
