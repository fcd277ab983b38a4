//! Deduplication of the combined table against the id mapping, and per-lineage statistics.

use crate::lineage::LINEAGE_COLUMN;
use crate::merge::ID_COLUMN;
use crate::utils;
use clap::{Args, Parser};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use vocsample_table::Table;


/// Default file name of the combined table.
pub const COMBINED_FILE: &str = "Pango_Random_Genomes.tsv";
/// Default file name of the statistics table.
pub const STATS_FILE: &str = "Pango_Random_Genomes_Stats.tsv";

/// Quality metrics summarized per lineage.
pub const METRICS: [&str; 2] = ["VARIANT", "LOWCOV"];

// ----------------------------------------------------------------------------
// Arguments
// ----------------------------------------------------------------------------

/// Column names of the id mapping table.
#[derive(Args, Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MappingArgs {
    /// Mapping column joined with the sample id of the combined table.
    #[clap(long, default_value_t = MappingArgs::default().mapping_key)]
    pub mapping_key: String,

    /// Mapping column that must be unique in the output.
    #[clap(long, default_value_t = MappingArgs::default().mapping_secondary)]
    pub mapping_secondary: String,
}

impl Default for MappingArgs {
    fn default() -> Self {
        MappingArgs { mapping_key: "GISAID_ID".to_string(), mapping_secondary: "SRR_ID".to_string() }
    }
}

/// Deduplicate an existing combined table and add per-lineage statistics.
#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct StatsArgs {
    /// Combined table written by a previous run.
    #[clap(short = 'c', long, required = true)]
    pub combined: PathBuf,

    /// Tab-separated id mapping table.
    #[clap(short = 'm', long, required = true)]
    pub mapping: PathBuf,

    #[clap(flatten)]
    pub columns: MappingArgs,

    /// Output statistics table.
    ///
    /// Defaults to Pango_Random_Genomes_Stats.tsv next to the combined table.
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,
}

impl StatsArgs {
    /// Output path, resolving the default.
    pub fn output(&self) -> PathBuf {
        match &self.output {
            Some(output) => output.clone(),
            None => self.combined.with_file_name(STATS_FILE),
        }
    }
}

// ----------------------------------------------------------------------------
// Id Check
// ----------------------------------------------------------------------------

/// Rows removed while checking ids.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct IdReport {
    /// Rows repeating a sample id.
    pub duplicate_ids: usize,
    /// Rows whose sample id is not in the mapping.
    pub unmapped: usize,
    /// Rows repeating a secondary id.
    pub duplicate_secondary: usize,
}

/// Deduplicate the combined table and join it with the id mapping.
///
/// Duplicate sample ids keep their first row. The sample id column is renamed
/// to the mapping key, and each row is joined with every mapping row sharing
/// its key. Duplicate secondary ids then keep their first row.
pub fn check_ids(
    combined: &Table<String>,
    mapping: &Table<String>,
    columns: &MappingArgs,
) -> Result<(Table<String>, IdReport), Report> {
    let (key, secondary) = (&columns.mapping_key, &columns.mapping_secondary);
    for column in [key, secondary] {
        if !mapping.has_header(column) {
            return Err(eyre!("The id mapping table has no column {column}."))
                .suggestion("Use --mapping-key and --mapping-secondary to set the mapping columns.");
        }
    }

    let mut report = IdReport::default();
    let mut table = combined.clone();

    report.duplicate_ids = table.dedup(ID_COLUMN)?;
    info!("Removed {} rows with a duplicate {ID_COLUMN}.", report.duplicate_ids);

    table.rename_header(ID_COLUMN, key.clone())?;

    let mapped = mapping.get_column(key)?.into_iter().collect::<HashSet<_>>();
    report.unmapped = table.get_column(key)?.into_iter().filter(|id| !mapped.contains(id)).count();
    info!("{} rows have no {key} in the id mapping.", report.unmapped);

    let mut table = table.inner_join(mapping, key)?;
    report.duplicate_secondary = table.dedup(secondary)?;
    info!("Removed {} rows with a duplicate {secondary}.", report.duplicate_secondary);

    Ok((table, report))
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Running summary of one metric over one lineage.
///
/// ```
/// use vocsample::stats::MetricSummary;
/// let mut summary = MetricSummary::default();
/// for token in ["2", "4", "6"] {
///     summary.add(token)?;
/// }
/// assert_eq!(summary.mean(), Some(4.0));
/// assert_eq!(summary.range(), Some("2-6".to_string()));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricSummary {
    pub sum: f64,
    pub count: usize,
    /// Smallest value, and its token as written.
    pub min: Option<(f64, String)>,
    /// Largest value, and its token as written.
    pub max: Option<(f64, String)>,
}

impl MetricSummary {
    /// Add one value. Blank values are skipped, other non-numeric values are an error.
    pub fn add(&mut self, token: &str) -> Result<(), Report> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(());
        }
        let value = token.parse::<f64>().wrap_err(format!("{token:?} is not a number."))?;

        self.sum += value;
        self.count += 1;
        if self.min.as_ref().map_or(true, |(min, _)| value < *min) {
            self.min = Some((value, token.to_string()));
        }
        if self.max.as_ref().map_or(true, |(max, _)| value > *max) {
            self.max = Some((value, token.to_string()));
        }
        Ok(())
    }

    /// Mean rounded to 2 decimals.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.sum / self.count as f64 * 100.0).round_ties_even() / 100.0)
    }

    /// `{min}-{max}`, using the tokens as written.
    pub fn range(&self) -> Option<String> {
        match (&self.min, &self.max) {
            (Some((_, min)), Some((_, max))) => Some(format!("{min}-{max}")),
            _ => None,
        }
    }
}

/// Summarize one metric column per lineage.
pub fn summarize_metric(table: &Table<String>, metric: &str) -> Result<HashMap<String, MetricSummary>, Report> {
    let lineage_i = table.get_header_index(LINEAGE_COLUMN)?;
    let metric_i = table.get_header_index(metric)?;

    let mut summaries: HashMap<String, MetricSummary> = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        summaries
            .entry(row[lineage_i].clone())
            .or_default()
            .add(&row[metric_i])
            .wrap_err_with(|| format!("Invalid {metric} in row {}.", i + 1))?;
    }
    Ok(summaries)
}

/// Add the `{METRIC}_mean` and `{METRIC}_Range` columns of every metric.
///
/// Every row gets the statistics of its lineage. A lineage with no values
/// gets empty statistics.
pub fn add_stats(table: &mut Table<String>) -> Result<(), Report> {
    let lineage_i = table.get_header_index(LINEAGE_COLUMN)?;

    for metric in METRICS {
        let summaries = summarize_metric(table, metric)?;
        let (means, ranges): (Vec<_>, Vec<_>) = table
            .rows
            .iter()
            .map(|row| {
                let summary = summaries.get(&row[lineage_i]);
                let mean = summary.and_then(MetricSummary::mean).map(|m| format!("{m:?}"));
                let range = summary.and_then(MetricSummary::range);
                (mean.unwrap_or_default(), range.unwrap_or_default())
            })
            .unzip();

        table.add_column(format!("{metric}_mean"), means)?;
        table.add_column(format!("{metric}_Range"), ranges)?;
    }

    Ok(())
}

/// Check ids of a combined table, add statistics, and write the statistics table.
pub fn run(args: &StatsArgs) -> Result<IdReport, Report> {
    let combined = Table::read(&args.combined, None)?;
    if combined.headers.is_empty() {
        return Err(eyre!("The combined table is empty: {:?}", args.combined))
            .suggestion("No lineage was reconciled, check the run summary.");
    }
    let mapping = Table::read(&args.mapping, Some('\t'))?;

    let (mut table, report) = check_ids(&combined, &mapping, &args.columns)?;
    add_stats(&mut table)?;

    let output = args.output();
    utils::write_table_atomic(&table, &output)?;
    let lineages = table.get_column(LINEAGE_COLUMN)?.into_iter().unique().count();
    info!("Wrote statistics of {} rows across {lineages} lineages: {output:?}", table.len());

    Ok(report)
}
