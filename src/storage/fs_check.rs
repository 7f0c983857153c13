//! Checks that a directory or file exists and can be used, creating it when
//! missing.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::info;

use crate::error_handling::types::StorageError;

pub fn ensure_directory_usable(dir: &Path) -> Result<(), StorageError> {
    let metadata = match fs::metadata(dir) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Directory {} doesn't exist. Will create it now.", dir.display());
            return fs::create_dir_all(dir).map_err(|e| StorageError::CreateFailed(dir.to_path_buf(), e));
        }
        Err(e) => return Err(StorageError::ReadFailed(dir.to_path_buf(), e)),
    };
    if !metadata.is_dir() {
        return Err(StorageError::NotADirectory(dir.to_path_buf()));
    }
    if fs::read_dir(dir).is_err() {
        return Err(StorageError::Unusable(dir.to_path_buf(), "cannot be read"));
    }
    if metadata.permissions().readonly() {
        return Err(StorageError::Unusable(dir.to_path_buf(), "cannot be written to"));
    }
    Ok(())
}

/// Creates `file` with `initial_contents` if it does not exist yet.
pub fn ensure_file_usable(file: &Path, initial_contents: &[u8]) -> Result<(), StorageError> {
    match fs::metadata(file) {
        Ok(m) if m.is_dir() => Err(StorageError::Unusable(
            file.to_path_buf(),
            "is a directory, expected a file",
        )),
        Ok(m) if m.permissions().readonly() => {
            Err(StorageError::Unusable(file.to_path_buf(), "cannot be written to"))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("File {} doesn't exist. Will create it now.", file.display());
            fs::write(file, initial_contents).map_err(|e| StorageError::CreateFailed(file.to_path_buf(), e))
        }
        Err(e) => Err(StorageError::ReadFailed(file.to_path_buf(), e)),
    }
}
