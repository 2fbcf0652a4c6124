mod convert;
mod error;
mod fs_utils;
mod host;
mod initdb;
mod layout;
mod orchestrator;
mod plan;
mod preflight;
mod probe;
mod promote;
mod staging;

pub use convert::run_conversion;
pub use error::{ErrorClass, RollbackStatus, UpgradeError};
pub use host::{SystemHost, UpgradeHost};
pub use initdb::initialize_cluster;
pub use layout::{DataDirLayout, HELPER_SCRIPTS, NEW_STAGING_DIR, OLD_STAGING_DIR};
pub use orchestrator::{UpgradeOutcome, UpgradeStage, Upgrader, UPGRADE_STEP_COUNT};
pub use plan::{detect, plan_upgrade, PlanDecision, UpgradePlan};
pub use preflight::check_staging_clear;
pub use probe::{parse_collation, probe_collation, CollationSetting, PROBE_QUERY};
pub use promote::{carry_forward_files, promote_new_contents, remove_helper_scripts, remove_staging};
pub use staging::{create_new_staging, rollback_staging, stage_live_contents};

#[cfg(test)]
mod tests;
