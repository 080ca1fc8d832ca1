//! Path resolution and PDF loading from the filesystem

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Normalize a user-supplied path into an absolute path.
///
/// - empty input is returned unchanged (callers substitute their default)
/// - `~` / `~/rest` expand to the user's home directory
/// - absolute paths are returned as-is
/// - anything else is resolved against the current working directory
///
/// Purely lexical: the path is not required to exist.
pub fn resolve_path(input: &str) -> PathBuf {
    if input.is_empty() {
        return PathBuf::from(input);
    }

    if let Some(rest) = input.strip_prefix('~') {
        return match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(input),
        };
    }

    let path = Path::new(input);
    if path.is_absolute() {
        return path.to_path_buf();
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Read a PDF file from an already resolved path
pub fn read_pdf<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path).map_err(Error::Io)?;

    // Validate PDF header
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: format!("{} is not a valid PDF file", path.display()),
        });
    }

    Ok(data)
}

/// File name component of a path, for display
pub fn display_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.as_ref().display().to_string())
}
