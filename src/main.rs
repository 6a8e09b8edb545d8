//! Spend Analyzer - command-line entry point
//!
//! Loads a transaction CSV, runs one analysis and renders it as a chart.

use anyhow::Result;
use clap::Parser;
use spend_analyzer::{run, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    run(&args)?;
    Ok(())
}
