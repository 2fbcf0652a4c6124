use std::path::PathBuf;

use pgshift_core::{
    read_version_marker, MajorVersion, NoUpgradeReason, ToolchainEntry, ToolchainTable,
    UpgradeConfig, UpgradeDecision,
};
use serde::Serialize;
use tracing::{error, info};

use crate::error::UpgradeError;
use crate::layout::DataDirLayout;
use crate::preflight::check_staging_clear;

/// Everything the destructive phase needs, fixed before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradePlan {
    pub from: MajorVersion,
    pub to: MajorVersion,
    pub toolchain: ToolchainEntry,
    pub target_bin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub old_dir: PathBuf,
    pub new_dir: PathBuf,
    pub link_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    NoUpgrade(NoUpgradeReason),
    Upgrade(UpgradePlan),
}

/// Reads the version marker and selects the toolchain. Read-only.
pub fn detect(config: &UpgradeConfig, table: &ToolchainTable) -> Result<PlanDecision, UpgradeError> {
    let layout = DataDirLayout::new(&config.data_dir);
    let marker = read_version_marker(layout.root()).map_err(|err| {
        UpgradeError::DataDirUnreadable {
            detail: format!("{err:#}"),
        }
    })?;

    match table.decide(marker.as_deref(), config.target_version) {
        UpgradeDecision::NoUpgrade(reason) => {
            info!(
                marker = marker.as_deref().unwrap_or("<absent>"),
                target = %config.target_version,
                reason = reason.describe(),
                "no upgrade needed"
            );
            Ok(PlanDecision::NoUpgrade(reason))
        }
        UpgradeDecision::Unrecognized { marker } => {
            error!(marker = %marker, "data directory version has no legacy toolchain");
            Err(UpgradeError::UnrecognizedVersion { marker })
        }
        UpgradeDecision::Upgrade { from, entry } => {
            info!(
                from = %from,
                to = %config.target_version,
                legacy_bin_dir = entry.bin_dir,
                "upgrade required"
            );
            Ok(PlanDecision::Upgrade(UpgradePlan {
                from,
                to: config.target_version,
                toolchain: entry.clone(),
                target_bin_dir: config.target_bin_dir.clone(),
                data_dir: layout.root().to_path_buf(),
                old_dir: layout.old_dir(),
                new_dir: layout.new_dir(),
                link_mode: config.link_mode,
            }))
        }
    }
}

/// Detection followed by the staging preflight, without touching anything.
pub fn plan_upgrade(
    config: &UpgradeConfig,
    table: &ToolchainTable,
) -> Result<PlanDecision, UpgradeError> {
    let decision = detect(config, table)?;
    if matches!(
        decision,
        PlanDecision::Upgrade(_) | PlanDecision::NoUpgrade(NoUpgradeReason::FreshDirectory)
    ) {
        check_staging_clear(&DataDirLayout::new(&config.data_dir))?;
    }
    Ok(decision)
}
