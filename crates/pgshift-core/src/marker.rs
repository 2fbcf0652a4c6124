use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};

pub const VERSION_MARKER_FILE: &str = "PG_VERSION";

/// Reads the format-version marker at the root of `data_dir`.
///
/// Returns `None` when the marker is missing or blank, which means the
/// directory holds no existing cluster.
pub fn read_version_marker(data_dir: &Path) -> Result<Option<String>> {
    let path = data_dir.join(VERSION_MARKER_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read version marker: {}", path.display()));
        }
    };

    let version = raw.trim();
    if version.is_empty() {
        return Ok(None);
    }

    Ok(Some(version.to_string()))
}
