//! Header-id lists, single-sequence files, and the sample manifest of the variant caller.

use crate::lineage::{self, TAXON_COLUMN};
use crate::working_set::LineageWorkingSet;
use color_eyre::eyre::{Report, Result, WrapErr};
use itertools::Itertools;
use log::{debug, warn};
use noodles::fasta;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use vocsample_table::Table;


/// Known inconsistencies between classification taxa and sequence headers.
///
/// GISAID headers spell Northern Ireland with a space, the classifier
/// reports it with an underscore. Applied verbatim, nothing else is rewritten.
pub const HEADER_CORRECTIONS: &[(&str, &str)] = &[("Northern_Ireland", "Northern Ireland")];

/// Apply [`HEADER_CORRECTIONS`] to one header id.
///
/// ```
/// use vocsample::manifest::correct_header;
/// assert_eq!(correct_header("hCoV-19/Northern_Ireland/X/2021|EPI_1|2021"), "hCoV-19/Northern Ireland/X/2021|EPI_1|2021");
/// assert_eq!(correct_header("hCoV-19/South_Africa/X/2021|EPI_2|2021"), "hCoV-19/South_Africa/X/2021|EPI_2|2021");
/// ```
pub fn correct_header(id: &str) -> String {
    HEADER_CORRECTIONS.iter().fold(id.to_string(), |id, (bad, good)| id.replace(bad, good))
}

/// One sample of the manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub id: String,
    pub path: PathBuf,
}

/// Write the taxa of one lineage as a header-id list, one per line.
///
/// Returns the number of ids written.
pub fn write_headers<P>(subset: &Table<String>, path: &P) -> Result<usize, Report>
where
    P: AsRef<Path> + std::fmt::Debug,
{
    let ids = subset
        .get_column(TAXON_COLUMN)?
        .into_iter()
        .map(|taxon| correct_header(&taxon.replace(['\r', '\n'], "")))
        .collect_vec();

    let content = ids.iter().map(|id| format!("{id}\n")).join("");
    std::fs::write(path, content).wrap_err_with(|| format!("Failed to write header ids: {path:?}"))?;
    Ok(ids.len())
}

/// Full definition line of a record, without the leading `>`.
fn definition(record: &fasta::Record) -> String {
    match record.description() {
        Some(description) => format!("{} {description}", record.name()),
        None => record.name().to_string(),
    }
}

/// Whether a sample id can name a file directly inside the split directory.
fn is_file_safe(id: &str) -> bool {
    !id.contains(['/', '\\']) && id != "." && id != ".."
}

/// Split a multi-sequence file into one file per sequence inside `dir`.
///
/// Each file is named by the sample id of its header (second `|` segment).
/// Records with a malformed header are skipped, as are ids containing a path
/// separator (or `.`/`..`) and repeats of an id already written. The directory
/// is created if needed.
pub fn split_fasta(input: &Path, dir: &Path) -> Result<Vec<Sample>, Report> {
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("Failed to create directory: {dir:?}"))?;
    let dir = dir.canonicalize().wrap_err_with(|| format!("Failed to resolve directory: {dir:?}"))?;

    let mut reader = File::open(input)
        .map(BufReader::new)
        .map(fasta::Reader::new)
        .wrap_err_with(|| format!("Failed to open sequences: {input:?}"))?;

    let mut samples = Vec::new();
    let mut observed = HashSet::new();

    for result in reader.records() {
        let record = result.wrap_err_with(|| format!("Failed to parse sequences: {input:?}"))?;
        let header = definition(&record);

        let id = match lineage::sample_id(&header) {
            Ok(id) => id.to_string(),
            Err(e) => {
                warn!("Skipping sequence in {input:?}: {e}");
                continue;
            }
        };
        if !is_file_safe(&id) {
            warn!("Skipping sequence in {input:?}: sample id {id:?} is not a valid file name.");
            continue;
        }
        if !observed.insert(id.clone()) {
            warn!("Skipping repeated sample {id} in {input:?}");
            continue;
        }

        let path = dir.join(format!("{id}.fasta"));
        let file = File::create(&path).wrap_err_with(|| format!("Failed to create: {path:?}"))?;
        let mut writer = fasta::Writer::new(file);
        writer.write_record(&record).wrap_err_with(|| format!("Failed to write: {path:?}"))?;

        samples.push(Sample { id, path });
    }

    debug!("Split {} sequences from {input:?} into {dir:?}", samples.len());
    Ok(samples)
}

/// Write the tab-separated manifest: `sample-id<TAB>path`, no header.
///
/// The manifest is always created fresh.
pub fn write_manifest(samples: &[Sample], path: &Path) -> Result<(), Report> {
    let mut file = File::create(path).wrap_err_with(|| format!("Failed to create manifest: {path:?}"))?;
    for sample in samples {
        writeln!(file, "{}\t{}", sample.id, sample.path.display())
            .wrap_err_with(|| format!("Failed to write manifest: {path:?}"))?;
    }
    Ok(())
}

/// Split the sequences of a lineage into its working directory and write its manifest.
pub fn build(working_set: &LineageWorkingSet, sequences: &Path) -> Result<Vec<Sample>, Report> {
    let samples = split_fasta(sequences, &working_set.dir())?;
    write_manifest(&samples, &working_set.manifest())?;
    Ok(samples)
}
