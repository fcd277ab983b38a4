//! Lineage labels, the lineage filter over the classification [`Table`], and taxon identifiers.

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use log::{debug, warn};
use std::fmt::Debug;
use std::path::Path;
use vocsample_table::Table;

#[cfg(test)]
mod tests;

/// Column of the classification table holding the lineage label.
pub const LINEAGE_COLUMN: &str = "lineage";
/// Column of the classification table holding the pipe-delimited taxon string.
pub const TAXON_COLUMN: &str = "taxon";

/// Read the lineages of interest, one label per line.
///
/// Blank lines are skipped and surrounding whitespace is trimmed. Labels are
/// used as file names, so a label containing a path separator is an error.
/// Repeated labels are kept once.
pub fn read_list<P>(path: &P) -> Result<Vec<String>, Report>
where
    P: AsRef<Path> + Debug,
{
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read lineage list: {path:?}"))?;

    let mut lineages = Vec::new();
    for label in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if label.contains(['/', '\\']) || label == "." || label == ".." {
            return Err(eyre!("Lineage label {label:?} cannot be used as a file name."))
                .suggestion(format!("Check the lineage list: {path:?}"));
        }
        if lineages.iter().any(|l| l == label) {
            warn!("Lineage {label} is listed more than once, it will be processed once.");
            continue;
        }
        lineages.push(label.to_string());
    }

    if lineages.is_empty() {
        return Err(eyre!("No lineages were found in: {path:?}"))
            .suggestion("The lineage list should have one lineage label per line.");
    }

    Ok(lineages)
}

/// Restrict the classification table to rows whose lineage is one of `lineages`.
///
/// Matching is exact and case-sensitive, row order is preserved. An empty
/// result is not an error.
pub fn filter<S>(table: &Table<String>, lineages: &[S]) -> Result<Table<String>, Report>
where
    S: AsRef<str>,
{
    let filtered = table.filter(LINEAGE_COLUMN, |l| lineages.iter().any(|x| x.as_ref() == l.as_str()))?;
    debug!("Kept {} of {} classification rows.", filtered.len(), table.len());
    Ok(filtered)
}

/// Returns the sample id of a taxon string: its second pipe-delimited segment.
///
/// ```
/// use vocsample::lineage::sample_id;
/// assert_eq!(sample_id("hCoV-19/England/MILK-9E05B3/2020|EPI_ISL_601443|2020-09-20")?, "EPI_ISL_601443");
/// assert!(sample_id("hCoV-19/England/MILK-9E05B3/2020").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn sample_id(taxon: &str) -> Result<&str, Report> {
    taxon.split('|').nth(1).filter(|id| !id.is_empty()).ok_or_else(|| {
        eyre!("Malformed taxon {taxon:?}, the sample id is expected after the first '|'.")
    })
}

/// Warn about every classification row whose taxon has no sample id.
///
/// Returns the number of malformed rows. These rows can never be reconciled
/// with variant calls.
pub fn validate_taxa(table: &Table<String>) -> Result<usize, Report> {
    let mut malformed = 0;
    for (i, taxon) in table.get_column(TAXON_COLUMN)?.into_iter().enumerate() {
        if let Err(e) = sample_id(taxon) {
            warn!("Classification row {}: {e}", i + 1);
            malformed += 1;
        }
    }
    Ok(malformed)
}
