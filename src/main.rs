use clap::Parser;
use color_eyre::eyre::{Report, Result};
use vocsample::{cli::Command, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Report> {
    // ------------------------------------------------------------------------
    // CLI Setup

    // Parse CLI parameters
    let args = Cli::parse();

    // initialize color_eyre crate for colorized logs
    color_eyre::install()?;

    // Set logging/verbosity level via RUST_LOG
    std::env::set_var("RUST_LOG", args.verbosity.to_string());

    // initialize env_logger crate for logging/verbosity level
    env_logger::init();

    // check which CLI command we're running (run, stats)
    match args.command {
        // Run
        Command::Run(args) => _ = vocsample::run(&args).await?,
        // Stats
        Command::Stats(args) => _ = vocsample::stats::run(&args)?,
    }

    Ok(())
}
