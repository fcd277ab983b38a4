//! `vocsample` draws reproducible random samples of genomes per **VOC**/VOI lineage,
//! calls their variants, and summarizes them.
//!
//! ## Pipeline
//!
//! 1. Restrict a lineage classification report (ex. pangolin) to the lineages of interest.
//! 1. For each lineage, in order:
//!
//!     1. Remove the artifacts of a previous run.
//!     1. Extract the lineage sequences (seqkit) and draw a random sample (BBMap `reformat.sh`).
//!     1. Split the sample into one file per genome and write the manifest of the variant caller.
//!     1. Call variants of the whole lineage at once (snippy).
//!     1. Join the variant calls with the classification, sorted by number of variants
//!        and low coverage sites.
//!
//! 1. Deduplicate the combined table against an id mapping (ex. GISAID to SRA), and add
//!    the mean and range of each quality metric per lineage.
//!
//! A failing lineage is recorded and skipped, the combined table is written after every
//! lineage, and a provenance summary (`run_summary.json`) is written at the end.

pub mod cli;
pub mod lineage;
pub mod manifest;
pub mod merge;
pub mod run;
pub mod stats;
pub mod tools;
mod utils;
pub mod working_set;

#[doc(inline)]
pub use crate::cli::{Cli, Verbosity};
#[doc(inline)]
pub use crate::run::{run, RunArgs, RunMode};
#[doc(inline)]
pub use crate::tools::Toolkit;
#[doc(inline)]
pub use vocsample_table::Table;
