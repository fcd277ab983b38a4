//! Per-lineage working artifacts and their cleanup.

use crate::{tools, utils};
use color_eyre::eyre::{Report, Result, WrapErr};
use log::debug;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};


/// Which artifacts [`LineageWorkingSet::clean`] removes.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Scope {
    /// Every artifact of the lineage.
    All,
    /// Everything except the header-id list and the filtered sequences.
    KeepFiltered,
}

/// Paths of the artifacts derived for one lineage, all under one output directory.
///
/// ```text
/// {output}/{L}.txt                       header ids
/// {output}/{L}.fasta                     filtered sequences
/// {output}/{L}_{N}RandomGenomes.fasta    sampled sequences
/// {output}/{L}/                          split sequences, manifest, variant calls
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct LineageWorkingSet {
    pub lineage: String,
    pub output_dir: PathBuf,
}

impl LineageWorkingSet {
    pub fn new<P>(lineage: &str, output_dir: &P) -> Self
    where
        P: AsRef<Path>,
    {
        LineageWorkingSet { lineage: lineage.to_string(), output_dir: output_dir.as_ref().to_path_buf() }
    }

    pub fn headers(&self) -> PathBuf {
        self.output_dir.join(format!("{}.txt", self.lineage))
    }

    pub fn fasta(&self) -> PathBuf {
        self.output_dir.join(format!("{}.fasta", self.lineage))
    }

    pub fn sampled(&self, count: NonZeroUsize) -> PathBuf {
        self.output_dir.join(format!("{}_{count}RandomGenomes.fasta", self.lineage))
    }

    /// Working directory of the lineage.
    pub fn dir(&self) -> PathBuf {
        self.output_dir.join(&self.lineage)
    }

    /// Sample manifest for the variant caller.
    pub fn manifest(&self) -> PathBuf {
        self.dir().join(format!("{}.tab", self.lineage))
    }

    /// Core summary written by the variant caller.
    pub fn core(&self) -> PathBuf {
        self.dir().join(tools::CORE_FILE)
    }

    /// Sampled sequence files of any previous sample count.
    fn sampled_files(&self) -> Result<Vec<PathBuf>, Report> {
        let prefix = format!("{}_", self.lineage);
        let entries = match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).wrap_err(format!("Failed to list: {:?}", self.output_dir)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.wrap_err(format!("Failed to list: {:?}", self.output_dir))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let count = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix("RandomGenomes.fasta"));
            if count.is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())) {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Remove the artifacts of a previous run.
    ///
    /// Every artifact is removed independently, a missing artifact is not
    /// an error and does not stop the others from being removed.
    pub fn clean(&self, scope: Scope) -> Result<(), Report> {
        let mut targets = self.sampled_files()?;
        targets.push(self.dir());
        // manifest location used by older runs
        targets.push(self.output_dir.join(format!("{}.tab", self.lineage)));
        if scope == Scope::All {
            targets.push(self.headers());
            targets.push(self.fasta());
        }

        // attempt every target before reporting the first failure
        let mut failure = None;
        for target in targets {
            match utils::remove_if_exists(&target) {
                Ok(true) => debug!("Removed: {target:?}"),
                Ok(false) => (),
                Err(e) => _ = failure.get_or_insert(e),
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
