//! Run the sampling, variant calling and reconciliation of every lineage.

use crate::lineage;
use crate::manifest;
use crate::merge::{self, MergeReport, Reconciled};
use crate::stats::{self, IdReport, MappingArgs, StatsArgs};
use crate::tools::{ExternalTools, ToolReport, Toolkit, Tools};
use crate::utils;
use crate::working_set::{LineageWorkingSet, Scope};
use clap::Parser;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vocsample_table::Table;

#[cfg(test)]
mod tests;

/// File name of the provenance summary.
pub const SUMMARY_FILE: &str = "run_summary.json";

// ----------------------------------------------------------------------------
// RunArgs
// ----------------------------------------------------------------------------

/// Sample genomes per lineage, call their variants, and summarize them.
#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct RunArgs {
    /// Lineage classification report (pangolin .csv or .tsv).
    #[clap(short = 'p', long, required = true)]
    pub pangolin_report: PathBuf,

    /// Sequences of every classified genome.
    ///
    /// Not needed with --random-only, which reuses the filtered sequences of a previous run.
    #[clap(short = 'f', long, required_unless_present = "random_only")]
    pub fasta: Option<PathBuf>,

    /// Lineages to process, one per line.
    #[clap(short = 'l', long, required = true)]
    pub lineages: PathBuf,

    /// Sample again from the filtered sequences of a previous run.
    #[clap(short = 'r', long, conflicts_with = "all_samples")]
    pub random_only: bool,

    /// Number of genomes sampled per lineage.
    #[clap(short = 'n', long, default_value_t = RunArgs::default().seq_num)]
    pub seq_num: NonZeroUsize,

    /// Call variants of every genome of each lineage instead of a sample.
    #[clap(short = 'a', long = "all")]
    pub all_samples: bool,

    /// Directory of reference sequences, one {lineage}.fasta per lineage.
    #[clap(long, required = true)]
    pub ref_path: PathBuf,

    /// Tab-separated id mapping table.
    #[clap(short = 'm', long, required = true)]
    pub mapping: PathBuf,

    #[clap(flatten)]
    pub columns: MappingArgs,

    /// Output directory.
    ///
    /// If the directory does not exist, it will be created.
    #[clap(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Number of CPU threads given to the variant caller.
    #[clap(short = 't', long, default_value_t = RunArgs::default().cpus)]
    pub cpus: usize,

    /// Seed of the random sampling, for reproducible samples.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Maximum number of seconds for each external tool.
    #[clap(long)]
    pub timeout: Option<u64>,

    #[clap(flatten)]
    pub tools: Tools,
}

impl Default for RunArgs {
    fn default() -> Self {
        RunArgs {
            pangolin_report: PathBuf::new(),
            fasta: None,
            lineages: PathBuf::new(),
            random_only: false,
            seq_num: NonZeroUsize::new(30).unwrap_or(NonZeroUsize::MIN),
            all_samples: false,
            ref_path: PathBuf::new(),
            mapping: PathBuf::new(),
            columns: MappingArgs::default(),
            output_dir: PathBuf::from("."),
            cpus: 16,
            seed: None,
            timeout: None,
            tools: Tools::default(),
        }
    }
}

impl RunArgs {
    /// The run mode selected by the mutually exclusive mode flags.
    pub fn mode(&self) -> Result<RunMode, Report> {
        match (self.random_only, self.all_samples) {
            (false, false) => Ok(RunMode::Standard),
            (true, false) => Ok(RunMode::RandomOnly),
            (false, true) => Ok(RunMode::AllSamples),
            (true, true) => Err(eyre!("--random-only and --all cannot be used together.")),
        }
    }

    pub fn combined(&self) -> PathBuf {
        self.output_dir.join(stats::COMBINED_FILE)
    }

    pub fn summary(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }

    /// Full sequence file, required by every mode that filters sequences.
    fn full_fasta(&self) -> Result<&Path, Report> {
        self.fasta
            .as_deref()
            .ok_or_else(|| eyre!("No sequences were provided."))
            .suggestion("Use --fasta, or --random-only to reuse previously filtered sequences.")
    }
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// How the genomes of each lineage are selected.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, strum::Display)]
pub enum RunMode {
    /// Filter the lineage sequences, then sample them.
    Standard,
    /// Sample the filtered sequences of a previous run.
    RandomOnly,
    /// Filter the lineage sequences and use all of them.
    AllSamples,
}

/// Steps of one lineage, in order.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Cleanup,
    Headers,
    Filter,
    Sample,
    Manifest,
    VariantCalling,
    Reconcile,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    /// Variant calls were reconciled.
    Completed,
    /// The lineage has no sequences.
    Empty,
    /// A step failed, the lineage contributed no rows.
    Failed { step: Step, diagnostic: String },
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Status::Completed => write!(f, "completed"),
            Status::Empty => write!(f, "empty"),
            Status::Failed { step, .. } => write!(f, "failed ({step})"),
        }
    }
}

/// Result of processing one lineage.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LineageOutcome {
    pub lineage: String,
    pub status: Status,
    /// Classification rows of the lineage.
    pub sequences: usize,
    /// Samples in the manifest.
    pub samples: usize,
    pub merge: Option<MergeReport>,
    /// Tools used, in order.
    pub tools: Vec<ToolReport>,
}

impl LineageOutcome {
    pub fn new(lineage: &str) -> Self {
        LineageOutcome {
            lineage: lineage.to_string(),
            status: Status::Empty,
            sequences: 0,
            samples: 0,
            merge: None,
            tools: Vec::new(),
        }
    }
}

/// Provenance of a run, written as JSON next to the outputs.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub mode: RunMode,
    pub args: RunArgs,
    pub outcomes: Vec<LineageOutcome>,
    pub ids: Option<IdReport>,
}

impl RunSummary {
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let output = serde_json::to_string_pretty(self).wrap_err("Failed to serialize run summary.")?;
        std::fs::write(path, output).wrap_err(format!("Failed to write run summary: {path:?}"))?;
        Ok(())
    }

    /// One row per lineage, for display.
    pub fn to_table(&self) -> Result<Table<String>, Report> {
        let headers = ["lineage", "status", "sequences", "samples", "joined"].map(String::from);
        let mut table = Table::with_headers(&headers);
        for outcome in &self.outcomes {
            let joined = outcome.merge.as_ref().map(|m| m.joined.to_string()).unwrap_or_default();
            table.add_row([
                outcome.lineage.clone(),
                outcome.status.to_string(),
                outcome.sequences.to_string(),
                outcome.samples.to_string(),
                joined,
            ])?;
        }
        Ok(table)
    }

    pub fn failed(&self) -> Vec<&LineageOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.status, Status::Failed { .. })).collect()
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

/// A step failure.
type StepError = (Step, Report);

trait AtStep<T> {
    /// Record the step an error occurred in.
    fn at(self, step: Step) -> Result<T, StepError>;
}

impl<T> AtStep<T> for Result<T, Report> {
    fn at(self, step: Step) -> Result<T, StepError> {
        self.map_err(|e| (step, e))
    }
}

/// Inputs shared by every lineage.
pub struct Pipeline<'a, K> {
    pub toolkit: &'a K,
    pub args: &'a RunArgs,
    pub mode: RunMode,
    /// Classification rows of every requested lineage.
    pub classification: &'a Table<String>,
}

impl<'a, K> Pipeline<'a, K>
where
    K: Toolkit,
{
    /// Process every lineage in order, accumulating the combined table.
    ///
    /// The combined table is written after each lineage, so the rows of
    /// completed lineages survive a later interruption.
    pub async fn run(&self, lineages: &[String]) -> Result<(Table<String>, Vec<LineageOutcome>), Report> {
        let combined_path = self.args.combined();
        let mut combined = Table::new();
        let mut outcomes = Vec::new();

        for (i, lineage) in lineages.iter().enumerate() {
            info!("Processing lineage {}/{}: {lineage}", i + 1, lineages.len());
            let (next, outcome) = self.lineage(lineage, combined).await;
            combined = next;
            info!("Lineage {lineage}: {}", outcome.status);
            outcomes.push(outcome);

            if let Err(e) = utils::write_table_atomic(&combined, &combined_path) {
                warn!("Failed to checkpoint the combined table: {e}");
            }
        }

        utils::write_table_atomic(&combined, &combined_path)?;
        info!("Wrote {} combined rows: {combined_path:?}", combined.len());
        Ok((combined, outcomes))
    }

    /// Process one lineage and fold its rows into the combined table.
    ///
    /// A failure is recorded in the outcome, the combined table is returned unchanged.
    pub async fn lineage(&self, lineage: &str, combined: Table<String>) -> (Table<String>, LineageOutcome) {
        let mut outcome = LineageOutcome::new(lineage);
        let working_set = LineageWorkingSet::new(lineage, &self.args.output_dir);

        match self.steps(&working_set, &mut outcome).await {
            Ok(Some(reconciled)) => {
                outcome.status = Status::Completed;
                outcome.merge = Some(reconciled.report.clone());
                (reconciled.accumulate(combined), outcome)
            }
            Ok(None) => {
                outcome.status = Status::Empty;
                (combined, outcome)
            }
            Err((step, e)) => {
                error!("Lineage {lineage} failed at {step}: {e:?}");
                outcome.status = Status::Failed { step, diagnostic: format!("{e:#}") };
                (combined, outcome)
            }
        }
    }

    /// Steps of one lineage. Returns `None` if the lineage has no sequences.
    async fn steps(
        &self,
        working_set: &LineageWorkingSet,
        outcome: &mut LineageOutcome,
    ) -> Result<Option<Reconciled>, StepError> {
        let lineage = working_set.lineage.as_str();

        let scope = match self.mode {
            RunMode::RandomOnly => Scope::KeepFiltered,
            RunMode::Standard | RunMode::AllSamples => Scope::All,
        };
        working_set.clean(scope).at(Step::Cleanup)?;

        let subset = lineage::filter(self.classification, &[lineage]).at(Step::Headers)?;
        outcome.sequences = subset.len();

        // filtered sequences of the lineage
        let fasta = working_set.fasta();
        match self.mode {
            RunMode::Standard | RunMode::AllSamples => {
                let headers = working_set.headers();
                let n = manifest::write_headers(&subset, &headers).at(Step::Headers)?;
                if n == 0 {
                    std::fs::write(&fasta, "").wrap_err(format!("Failed to write: {fasta:?}")).at(Step::Filter)?;
                } else {
                    let full = self.args.full_fasta().at(Step::Filter)?;
                    let report = self.toolkit.filter(&headers, full, &fasta).await.at(Step::Filter)?;
                    outcome.tools.push(report);
                }
            }
            RunMode::RandomOnly => {
                if !fasta.is_file() {
                    return Err(eyre!("Filtered sequences of {lineage} do not exist: {fasta:?}"))
                        .suggestion("Run without --random-only first to filter the sequences.")
                        .at(Step::Sample);
                }
            }
        }

        let empty = std::fs::metadata(&fasta)
            .wrap_err(format!("Failed to inspect: {fasta:?}"))
            .at(Step::Filter)?
            .len()
            == 0;

        // sequences to call variants on
        let sequences = match self.mode {
            RunMode::Standard | RunMode::RandomOnly if !empty => {
                let sampled = working_set.sampled(self.args.seq_num);
                let report = self
                    .toolkit
                    .sample(&fasta, &sampled, self.args.seq_num, self.args.seed)
                    .await
                    .at(Step::Sample)?;
                outcome.tools.push(report);
                sampled
            }
            _ => fasta,
        };

        let samples = manifest::build(working_set, &sequences).at(Step::Manifest)?;
        outcome.samples = samples.len();
        if samples.is_empty() {
            warn!("Lineage {lineage} has no sequences, variant calling is skipped.");
            return Ok(None);
        }

        let reference = self.args.ref_path.join(format!("{lineage}.fasta"));
        let report = self
            .toolkit
            .call_variants(&working_set.manifest(), &reference, &working_set.dir(), self.args.cpus)
            .await
            .at(Step::VariantCalling)?;
        outcome.tools.push(report);

        let variant_calls = merge::read_variant_calls(&working_set.core()).at(Step::Reconcile)?;
        let reconciled = merge::reconcile(self.classification, &variant_calls, lineage).at(Step::Reconcile)?;
        let report = &reconciled.report;
        info!(
            "Reconciled {lineage}: {} joined, {} classification rows unmatched, {} variant calls unmatched, {} duplicate ids, {} malformed taxa.",
            report.joined,
            report.unmatched_classification,
            report.unmatched_variant_calls,
            report.duplicates,
            report.malformed
        );

        Ok(Some(reconciled))
    }
}

// ----------------------------------------------------------------------------
// Run
// ----------------------------------------------------------------------------

/// Run the pipeline with the external tools, then check ids and add statistics.
///
/// Returns an error after every output is written if any lineage failed.
pub async fn run(args: &RunArgs) -> Result<RunSummary, Report> {
    let mode = args.mode()?;
    info!("Run mode: {mode}");

    std::fs::create_dir_all(&args.output_dir)
        .wrap_err_with(|| format!("Failed to create output directory: {:?}", args.output_dir))?;

    let lineages = lineage::read_list(&args.lineages)?;
    let classification = Table::read(&args.pangolin_report, None)?;
    let classification = lineage::filter(&classification, &lineages)?;
    let malformed = lineage::validate_taxa(&classification)?;
    if malformed > 0 {
        warn!("{malformed} classification rows have no sample id and will not be reconciled.");
    }

    let timeout = args.timeout.map(Duration::from_secs);
    let toolkit = ExternalTools::probe(&args.tools, timeout).await;

    let pipeline = Pipeline { toolkit: &toolkit, args, mode, classification: &classification };
    let (combined, outcomes) = pipeline.run(&lineages).await?;

    let mut summary = RunSummary {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Local::now(),
        mode,
        args: args.clone(),
        outcomes,
        ids: None,
    };

    // the summary is written even if the statistics fail
    let ids = match combined.headers.is_empty() {
        true => {
            warn!("No lineage was reconciled, statistics are skipped.");
            Ok(None)
        }
        false => {
            let stats_args = StatsArgs {
                combined: args.combined(),
                mapping: args.mapping.clone(),
                columns: args.columns.clone(),
                output: Some(args.output_dir.join(stats::STATS_FILE)),
            };
            stats::run(&stats_args).map(Some)
        }
    };
    summary.ids = ids.as_ref().ok().cloned().flatten();

    summary.write(&args.summary())?;
    info!("Lineage outcomes:\n\n{}", summary.to_table()?.to_markdown());
    ids?;

    let failed = summary.failed();
    if !failed.is_empty() {
        let names = failed.iter().map(|o| o.lineage.as_str()).collect::<Vec<_>>().join(", ");
        return Err(eyre!("{} lineages failed: {names}", failed.len()))
            .suggestion(format!("Diagnostics are recorded in {:?}", args.summary()));
    }

    Ok(summary)
}
