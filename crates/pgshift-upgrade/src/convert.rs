use std::process::Command;

use anyhow::Result;
use tracing::info;

use crate::host::UpgradeHost;
use crate::plan::UpgradePlan;

pub(crate) fn build_upgrade_command(
    plan: &UpgradePlan,
    superuser: &str,
    jobs: Option<u32>,
) -> Command {
    let mut command = Command::new(plan.target_bin_dir.join("pg_upgrade"));
    command.arg(format!("--username={superuser}"));
    if plan.link_mode {
        command.arg("--link");
    }
    if let Some(jobs) = jobs {
        command.arg(format!("--jobs={jobs}"));
    }
    command
        .arg("-d")
        .arg(&plan.old_dir)
        .arg("-D")
        .arg(&plan.new_dir)
        .arg("-b")
        .arg(plan.toolchain.bin_dir())
        .arg("-B")
        .arg(&plan.target_bin_dir)
        // pg_upgrade writes its logs and helper scripts into the working directory.
        .current_dir(&plan.data_dir);
    command
}

/// Converts the staged old cluster into the freshly initialized new one.
/// Only the exit status of `pg_upgrade` is interpreted.
pub fn run_conversion<H: UpgradeHost + ?Sized>(
    host: &mut H,
    plan: &UpgradePlan,
    superuser: &str,
    jobs: Option<u32>,
) -> Result<()> {
    let mut command = build_upgrade_command(plan, superuser, jobs);
    info!(
        from = %plan.from,
        to = %plan.to,
        link_mode = plan.link_mode,
        "running pg_upgrade"
    );
    host.run(&mut command, "pg_upgrade exited unsuccessfully")
}
