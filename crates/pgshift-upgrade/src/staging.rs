use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::fs_utils::{create_private_dir, entry_exists, move_entries};
use crate::host::UpgradeHost;
use crate::layout::{DataDirLayout, OLD_STAGING_DIR};

/// Creates the `old` staging directory and moves every live entry into it.
pub fn stage_live_contents(layout: &DataDirLayout) -> Result<()> {
    let old_dir = layout.old_dir();
    create_private_dir(&old_dir)
        .with_context(|| format!("failed to create old staging dir: {}", old_dir.display()))?;

    let moved = move_entries(layout.root(), &old_dir, &[OLD_STAGING_DIR])?;
    info!(
        entries = moved.len(),
        path = %old_dir.display(),
        "staged live data"
    );
    Ok(())
}

pub fn create_new_staging<H: UpgradeHost + ?Sized>(
    host: &mut H,
    layout: &DataDirLayout,
) -> Result<()> {
    let new_dir = layout.new_dir();
    host.create_dir(&new_dir)
        .with_context(|| format!("failed to create new staging dir: {}", new_dir.display()))
}

/// Puts the staged data back in the live directory. Only valid before
/// conversion has started: anything in `new` is discarded.
pub fn rollback_staging(layout: &DataDirLayout) -> Result<()> {
    warn!(path = %layout.root().display(), "rolling back staged data directory");

    let new_dir = layout.new_dir();
    if entry_exists(&new_dir)? {
        fs::remove_dir_all(&new_dir)
            .with_context(|| format!("failed to remove new staging dir: {}", new_dir.display()))?;
    }

    let old_dir = layout.old_dir();
    if entry_exists(&old_dir)? {
        move_entries(&old_dir, layout.root(), &[])?;
        fs::remove_dir(&old_dir)
            .with_context(|| format!("failed to remove old staging dir: {}", old_dir.display()))?;
    }

    info!(path = %layout.root().display(), "restored original data directory");
    Ok(())
}
