/// Utilities for dealing with the file system.
///
/// This module contains variations on some of the functions provided by
/// `std::fs` that instead of returning `std::io::Error` log that error and
/// return our own [`Failed`] instead.

use std::{fs, io};
use std::path::Path;
use log::error;
use crate::error::Failed;


/// Opens a file for reading.
pub fn open_file(path: &Path) -> Result<io::BufReader<fs::File>, Failed> {
    fs::File::open(path).map(io::BufReader::new).map_err(|err| {
        error!(
            "Fatal: failed to open file {}: {}",
            path.display(), err
        );
        Failed
    })
}

/// Creates the parent directory of `path` if it doesn’t exist yet.
pub fn create_parent_all(path: &Path) -> Result<(), Failed> {
    if let Some(path) = path.parent() {
        if path.as_os_str().is_empty() {
            return Ok(())
        }
        fs::create_dir_all(path).map_err(|err| {
            error!(
                "Fatal: failed to create directory {}: {}",
                path.display(), err
            );
            Failed
        })?;
    }
    Ok(())
}

/// Writes the contents to a file, replacing what may have been there.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), Failed> {
    fs::write(path, contents).map_err(|err| {
        error!(
            "Fatal: failed to write file {}: {}",
            path.display(), err
        );
        Failed
    })
}


//============ Tests =========================================================
