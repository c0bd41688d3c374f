//! Mapping of inputs to outputs and writing of prepared files.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;

use crate::asset::{FileRef, ProcessContext, WriteResult};
use crate::error::BuildError;
use crate::output::find_unique_paths;

/// Output path paired with `input` by position.
pub fn output_path<'a>(
    inputpaths: &[Utf8PathBuf],
    outputpaths: &'a [Utf8PathBuf],
    input: &Utf8Path,
) -> Option<&'a Utf8Path> {
    inputpaths
        .iter()
        .position(|path| path == input)
        .and_then(|index| outputpaths.get(index))
        .map(Utf8PathBuf::as_path)
}

/// Remove every artifact previously written for the unique path `path`.
pub fn remove_unique(path: &Utf8Path) -> Result<(), BuildError> {
    for existing in find_unique_paths(path)? {
        match fs::remove_file(&existing) {
            Ok(()) => tracing::debug!("removed stale {}", existing),
            Err(e) => tracing::debug!("couldn't remove stale {}: {}", existing, e),
        }
    }

    Ok(())
}

/// Write all `files` in parallel, stamping each result with `prefix`.
/// Results are in the order of `files`.
pub fn write_files(
    files: &[FileRef],
    ctx: &ProcessContext<'_>,
    prefix: &str,
) -> Result<Vec<WriteResult>, BuildError> {
    files
        .par_iter()
        .map(|file| {
            let mut result = file.write(ctx)?;
            result.prefix = prefix.to_string();
            Ok(result)
        })
        .collect()
}
