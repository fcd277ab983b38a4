//! Reconciliation of variant calls with the classification table, and the combined table.

use crate::lineage::{self, LINEAGE_COLUMN, TAXON_COLUMN};
use color_eyre::eyre::{eyre, Report, Result};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::path::Path;
use vocsample_table::Table;


/// Sample id column shared by the variant calls and the combined table.
pub const ID_COLUMN: &str = "ID";

/// Columns the joined rows of one lineage are sorted by, ascending and numeric.
pub const SORT_COLUMNS: [&str; 2] = ["VARIANT", "LOWCOV"];

// ----------------------------------------------------------------------------
// MergeReport
// ----------------------------------------------------------------------------

/// Row counts of one reconciliation.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MergeReport {
    /// Rows added to the combined table.
    pub joined: usize,
    /// Classification rows of the reconciled lineage with no variant calls.
    pub unmatched_classification: usize,
    /// Variant-call rows with no classification.
    pub unmatched_variant_calls: usize,
    /// Sample ids dropped for occurring more than once on either side.
    pub duplicates: usize,
    /// Classification rows whose taxon has no sample id.
    pub malformed: usize,
}

// ----------------------------------------------------------------------------
// Reconciled
// ----------------------------------------------------------------------------

/// The joined rows of one lineage, ready to be accumulated.
#[derive(Clone, Debug)]
pub struct Reconciled {
    pub table: Table<String>,
    pub report: MergeReport,
}

impl Reconciled {
    /// Append the joined rows to the combined table, aligning columns by name.
    pub fn accumulate(self, mut combined: Table<String>) -> Table<String> {
        combined.append(self.table, String::new());
        combined
    }
}

/// Read the core summary of the variant caller (tab-separated).
pub fn read_variant_calls<P>(path: &P) -> Result<Table<String>, Report>
where
    P: AsRef<Path> + Debug,
{
    Table::read(path, Some('\t'))
}

/// Join the variant calls of one lineage with the classification table.
///
/// The sample id of each classification row is the second segment of its
/// taxon. A sample id must occur exactly once on each side, ids repeated on
/// either side are dropped. Output columns are the classification columns,
/// then [`ID_COLUMN`], then the remaining variant-call columns. Rows are
/// sorted by [`SORT_COLUMNS`].
///
/// Rows of every lineage in `classification` may join, but only rows of
/// `lineage` count as unmatched when they have no variant calls.
pub fn reconcile(
    classification: &Table<String>,
    variant_calls: &Table<String>,
    lineage: &str,
) -> Result<Reconciled, Report> {
    if classification.has_header(ID_COLUMN) {
        return Err(eyre!("The classification table already has an {ID_COLUMN} column."))
            .suggestion(format!("Rename the {ID_COLUMN} column of the classification table."));
    }

    let mut report = MergeReport::default();
    let lineage_i = classification.get_header_index(LINEAGE_COLUMN)?;
    let of_lineage = |row: &Vec<String>| row[lineage_i] == lineage;

    // variant caller produced a summary without a header line
    if variant_calls.headers.is_empty() {
        report.unmatched_classification = classification.rows.iter().filter(|&row| of_lineage(row)).count();
        let headers = classification.headers.iter().cloned().chain([ID_COLUMN.to_string()]).collect_vec();
        return Ok(Reconciled { table: Table::with_headers(&headers), report });
    }

    let call_ids = variant_calls.get_column(ID_COLUMN)?.into_iter().map(String::as_str).collect_vec();
    let call_counts = call_ids.iter().copied().counts();

    // derive the sample id of every classification row
    let taxon_i = classification.get_header_index(TAXON_COLUMN)?;
    let mut ids = Vec::with_capacity(classification.len());
    for row in &classification.rows {
        match lineage::sample_id(&row[taxon_i]) {
            Ok(id) => ids.push(Some(id)),
            Err(e) => {
                debug!("{e}");
                report.malformed += 1;
                ids.push(None);
            }
        }
    }
    let class_counts: HashMap<&str, usize> = ids.iter().flatten().copied().counts();

    let duplicated = class_counts
        .iter()
        .filter(|(id, n)| call_counts.get(*id).is_some_and(|m| **n > 1 || *m > 1))
        .map(|(id, _)| *id)
        .collect::<HashSet<_>>();
    for id in duplicated.iter().sorted() {
        warn!("Sample {id} occurs more than once, it was not reconciled.");
    }
    report.duplicates = duplicated.len();
    report.unmatched_classification = classification
        .rows
        .iter()
        .zip(&ids)
        .filter(|&(row, id)| of_lineage(row) && id.is_some_and(|id| !call_counts.contains_key(id)))
        .count();
    report.unmatched_variant_calls = call_ids.iter().filter(|id| !class_counts.contains_key(*id)).count();

    // classification rows that have exactly one counterpart
    let mut headers = classification.headers.clone();
    headers.push(ID_COLUMN.to_string());
    let mut left = Table::with_headers(&headers);
    for (row, id) in classification.rows.iter().zip(&ids) {
        let Some(id) = id else { continue };
        if !call_counts.contains_key(id) || duplicated.contains(id) {
            continue;
        }
        left.add_row(row.iter().cloned().chain([id.to_string()]))?;
    }

    let mut table = left.inner_join(variant_calls, ID_COLUMN)?;
    sort_by_metrics(&mut table)?;
    report.joined = table.len();

    Ok(Reconciled { table, report })
}

/// Stable sort by the numeric value of each of [`SORT_COLUMNS`] in turn.
///
/// Values that are not numbers sort after every number.
pub fn sort_by_metrics(table: &mut Table<String>) -> Result<(), Report> {
    let columns: Vec<usize> = SORT_COLUMNS.iter().map(|c| table.get_header_index(c)).collect::<Result<_, _>>()?;
    table.sort_by(|a, b| {
        columns
            .iter()
            .map(|i| compare_numeric(&a[*i], &b[*i]))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(())
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>().ok(), b.trim().parse::<f64>().ok()) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
