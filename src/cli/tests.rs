use crate::cli::{Cli, Command, Verbosity};
use crate::run::RunMode;
use clap::Parser;
use color_eyre::eyre::{eyre, Report, Result};
use std::path::Path;

const RUN: [&str; 12] = [
    "vocsample",
    "run",
    "-p",
    "lineage_report.csv",
    "-f",
    "sequences.fasta",
    "-l",
    "lineages.txt",
    "--ref-path",
    "references",
    "-m",
    "mapping.tsv",
];

#[test]
fn run_defaults() -> Result<(), Report> {
    let args = Cli::try_parse_from(RUN)?;
    assert_eq!(args.verbosity, Verbosity::Info);

    let Command::Run(args) = args.command else { return Err(eyre!("Expected the run command.")) };
    assert_eq!(args.mode()?, RunMode::Standard);
    assert_eq!(args.seq_num.get(), 30);
    assert_eq!(args.cpus, 16);
    assert_eq!(args.output_dir, Path::new("."));
    assert_eq!(args.columns.mapping_key, "GISAID_ID");
    assert_eq!(args.tools.reformat, "reformat.sh");
    assert_eq!(args.combined(), Path::new("./Pango_Random_Genomes.tsv"));
    Ok(())
}

#[test]
fn run_modes() -> Result<(), Report> {
    let parse = |extra: &[&str]| Cli::try_parse_from(RUN.iter().chain(extra));

    let Command::Run(args) = parse(&["-a", "-n", "5"])?.command else { return Err(eyre!("Expected run.")) };
    assert_eq!(args.mode()?, RunMode::AllSamples);
    assert_eq!(args.seq_num.get(), 5);

    let Command::Run(args) = parse(&["--random-only", "--seed", "7"])?.command else {
        return Err(eyre!("Expected run."));
    };
    assert_eq!(args.mode()?, RunMode::RandomOnly);
    assert_eq!(args.seed, Some(7));

    assert!(parse(&["-r", "-a"]).is_err());
    assert!(parse(&["-n", "0"]).is_err());
    Ok(())
}

#[test]
fn random_only_without_fasta() -> Result<(), Report> {
    let input = ["vocsample", "run", "-p", "r.csv", "-l", "l.txt", "--ref-path", "refs", "-m", "m.tsv"];
    assert!(Cli::try_parse_from(input).is_err());
    assert!(Cli::try_parse_from(input.iter().chain(&["-r"])).is_ok());
    Ok(())
}

#[test]
fn verbosity_for_rust_log() {
    assert_eq!(Verbosity::Debug.to_string(), "debug");
    assert_eq!(Verbosity::default().to_string(), "info");
}
