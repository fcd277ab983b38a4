//! [Command-line interface](Cli) (CLI) of the main binary.

use crate::run::RunArgs;
use crate::stats::StatsArgs;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

// ----------------------------------------------------------------------------
// CLI Entry Point
// ----------------------------------------------------------------------------

/// The command-line interface (CLI).
/// ---
/// The CLI is intended for parsing user input from the command-line in the main function.
/// ```no_run
/// use clap::Parser;
/// let args = vocsample::Cli::parse();
/// ```
/// Arguments can also be given manually:
/// ```rust
/// # use clap::Parser;
/// let input = ["vocsample", "stats", "--combined", "Pango_Random_Genomes.tsv", "--mapping", "mapping.tsv"];
/// let args = vocsample::Cli::parse_from(input);
/// serde_json::to_string_pretty(&args)?;
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Debug, Deserialize, Parser, Serialize)]
#[clap(name = "vocsample", author, version)]
#[clap(about = "vocsample samples genomes per lineage, calls their variants, and summarizes them.")]
pub struct Cli {
    #[clap(subcommand)]
    /// Pass CLI arguments to a particular [Command].
    #[clap(help = "Set the command.")]
    pub command: Command,

    /// Set the output [Verbosity] level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    #[clap(help = "Set the output verbosity level.")]
    pub verbosity: Verbosity,
}

/// CLI [commands](#variants).
#[derive(Debug, Deserialize, Serialize, Subcommand)]
pub enum Command {
    /// Sample, call variants, reconcile, then add statistics.
    #[clap(about = "Sample genomes per lineage, call their variants, and summarize them.")]
    Run(RunArgs),
    /// Deduplicate an existing combined table and add statistics.
    #[clap(about = "Add statistics to the combined table of a previous run.")]
    Stats(StatsArgs),
}

// ----------------------------------------------------------------------------
// Verbosity
// ----------------------------------------------------------------------------

/// The output verbosity level.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, ValueEnum)]
pub enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Convert to lowercase for RUST_LOG env var compatibility
        let lowercase = format!("{:?}", self).to_lowercase();
        write!(f, "{lowercase}")
    }
}
