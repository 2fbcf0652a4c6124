use tracing::error;

use crate::error::UpgradeError;
use crate::fs_utils::entry_exists;
use crate::layout::DataDirLayout;

/// Refuses to start when an earlier run left staging directories behind.
///
/// Nothing is ever removed here: a leftover `old` or `new` may hold the only
/// copy of a half-converted cluster.
pub fn check_staging_clear(layout: &DataDirLayout) -> Result<(), UpgradeError> {
    let old_dir = layout.old_dir();
    if staging_entry_present(&old_dir)? {
        error!(path = %old_dir.display(), "old staging directory left by an earlier run");
        return Err(UpgradeError::OldStagingPresent { path: old_dir });
    }

    let new_dir = layout.new_dir();
    if staging_entry_present(&new_dir)? {
        error!(path = %new_dir.display(), "new staging directory left by an earlier run");
        return Err(UpgradeError::NewStagingPresent { path: new_dir });
    }

    Ok(())
}

fn staging_entry_present(path: &std::path::Path) -> Result<bool, UpgradeError> {
    entry_exists(path).map_err(|err| UpgradeError::DataDirUnreadable {
        detail: format!("{err:#}"),
    })
}
