use color_eyre::eyre::{Report, Result, WrapErr};
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::Path;
use tempfile::NamedTempFile;
use vocsample_table::Table;

/// Remove a file or directory (recursively), tolerating its absence.
///
/// Returns `true` if something was removed. Errors other than
/// [`ErrorKind::NotFound`] are returned.
pub fn remove_if_exists<P>(path: &P) -> Result<bool, Report>
where
    P: AsRef<Path> + Debug,
{
    let path = path.as_ref();
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).wrap_err(format!("Failed to inspect: {path:?}")),
    };
    let result = match metadata.is_dir() {
        true => std::fs::remove_dir_all(path),
        false => std::fs::remove_file(path),
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).wrap_err(format!("Failed to remove: {path:?}")),
    }
}

/// Write a table by replacing the destination in one step.
///
/// The table is written to a temporary file next to `path` and renamed
/// over it, so a reader never observes a partial table.
pub fn write_table_atomic<P>(table: &Table<String>, path: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    let dir = match path.as_ref().parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let delim = vocsample_table::get_delimiter(path)?;
    let tmp = NamedTempFile::new_in(dir).wrap_err(format!("Failed to create temporary file in: {dir:?}"))?;
    table.write(&tmp.path(), Some(delim))?;
    tmp.persist(path).wrap_err(format!("Failed to write: {path:?}"))?;
    Ok(())
}
