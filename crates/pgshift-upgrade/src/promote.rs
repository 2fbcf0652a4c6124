use std::ffi::OsString;
use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::fs_utils::{entry_exists, move_entries, remove_file_if_exists};
use crate::layout::DataDirLayout;

/// Moves the converted cluster out of `new` into the live directory.
pub fn promote_new_contents(layout: &DataDirLayout) -> Result<Vec<OsString>> {
    let moved = move_entries(&layout.new_dir(), layout.root(), &[])?;
    info!(entries = moved.len(), "promoted converted data");
    Ok(moved)
}

/// Copies operator-maintained files from the old cluster over the defaults
/// that initdb wrote. Files absent from the old cluster are skipped.
pub fn carry_forward_files(layout: &DataDirLayout, names: &[String]) -> Result<Vec<String>> {
    let old_dir = layout.old_dir();
    let mut copied = Vec::new();
    for name in names {
        let source = old_dir.join(name);
        if !entry_exists(&source)? {
            warn!(file = %name, "not present in old cluster, keeping the new default");
            continue;
        }
        let destination = layout.root().join(name);
        fs::copy(&source, &destination).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                destination.display()
            )
        })?;
        copied.push(name.clone());
    }
    info!(files = ?copied, "carried forward configuration");
    Ok(copied)
}

pub fn remove_staging(layout: &DataDirLayout) -> Result<()> {
    for dir in [layout.new_dir(), layout.old_dir()] {
        if entry_exists(&dir)? {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove staging dir: {}", dir.display()))?;
        }
    }
    Ok(())
}

pub fn remove_helper_scripts(layout: &DataDirLayout) -> Result<()> {
    for path in layout.helper_script_paths() {
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to remove helper script: {}", path.display()))?;
    }
    Ok(())
}
