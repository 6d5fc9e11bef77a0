#![deny(unused_must_use)]

mod cli;
mod collaborators;
mod commands;
mod config;
mod foreground;
mod observers;
mod pipeline;
mod queue;
mod registry;
mod snapshot;

pub use lidarserv_common as common;

use clap::Parser;
use human_panic::setup_panic;

use crate::cli::{Command, PerceptionOptions};

fn main() -> anyhow::Result<()> {
    // panic handler
    setup_panic!();

    let args = PerceptionOptions::parse();

    // logger
    // unwrap: will only fail, if the logger is already initialized - which it clearly is not
    simple_logger::init_with_level(args.log_level).unwrap();

    // run the passed command
    match args.command {
        Command::Run(options) => commands::run::run(options),
    }
}
