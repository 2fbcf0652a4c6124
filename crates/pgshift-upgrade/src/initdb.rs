use std::path::Path;
use std::process::Command;

use anyhow::Result;
use tracing::info;

use crate::host::UpgradeHost;
use crate::probe::CollationSetting;

pub(crate) fn build_initdb_command(
    target_bin_dir: &Path,
    superuser: &str,
    collation: &CollationSetting,
    new_dir: &Path,
) -> Command {
    let mut command = Command::new(target_bin_dir.join("initdb"));
    command
        .arg(format!("--username={superuser}"))
        .arg(format!("--locale={collation}"))
        .arg(new_dir);
    command
}

/// Initializes an empty target-version cluster in `new_dir` with the locale
/// of the old cluster.
pub fn initialize_cluster<H: UpgradeHost + ?Sized>(
    host: &mut H,
    target_bin_dir: &Path,
    superuser: &str,
    collation: &CollationSetting,
    new_dir: &Path,
) -> Result<()> {
    let mut command = build_initdb_command(target_bin_dir, superuser, collation, new_dir);
    host.run(&mut command, "failed to initialize new cluster")?;
    info!(path = %new_dir.display(), collation = %collation, "initialized new cluster");
    Ok(())
}
