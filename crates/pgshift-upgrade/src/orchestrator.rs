use pgshift_core::{MajorVersion, NoUpgradeReason, ToolchainTable, UpgradeConfig};
use tracing::{error, info, warn};

use crate::convert::run_conversion;
use crate::error::{RollbackStatus, UpgradeError};
use crate::host::UpgradeHost;
use crate::initdb::initialize_cluster;
use crate::layout::DataDirLayout;
use crate::plan::{detect, PlanDecision, UpgradePlan};
use crate::preflight::check_staging_clear;
use crate::probe::probe_collation;
use crate::promote::{
    carry_forward_files, promote_new_contents, remove_helper_scripts, remove_staging,
};
use crate::staging::{create_new_staging, rollback_staging, stage_live_contents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStage {
    Detecting,
    NoUpgrade,
    Preflighting,
    Staging,
    Probing,
    Initializing,
    Converting,
    Promoting,
    Done,
    Aborted(i32),
}

impl UpgradeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detecting => "detecting",
            Self::NoUpgrade => "no-upgrade",
            Self::Preflighting => "preflighting",
            Self::Staging => "staging",
            Self::Probing => "probing",
            Self::Initializing => "initializing",
            Self::Converting => "converting",
            Self::Promoting => "promoting",
            Self::Done => "done",
            Self::Aborted(_) => "aborted",
        }
    }

    /// Position among the steps of an actual upgrade, for progress display.
    pub fn step_index(self) -> Option<u64> {
        match self {
            Self::Detecting => Some(0),
            Self::Preflighting => Some(1),
            Self::Staging => Some(2),
            Self::Probing => Some(3),
            Self::Initializing => Some(4),
            Self::Converting => Some(5),
            Self::Promoting => Some(6),
            Self::Done => Some(7),
            Self::NoUpgrade | Self::Aborted(_) => None,
        }
    }
}

pub const UPGRADE_STEP_COUNT: u64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    NoUpgradeNeeded(NoUpgradeReason),
    UpgradeSucceeded { from: MajorVersion, to: MajorVersion },
    UpgradeAborted(UpgradeError),
}

impl UpgradeOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoUpgradeNeeded(_) | Self::UpgradeSucceeded { .. } => 0,
            Self::UpgradeAborted(err) => err.exit_code(),
        }
    }
}

/// Drives one upgrade attempt from detection to promotion.
pub struct Upgrader<'a, H> {
    config: &'a UpgradeConfig,
    table: &'a ToolchainTable,
    layout: DataDirLayout,
    host: H,
}

impl<'a, H: UpgradeHost> Upgrader<'a, H> {
    pub fn new(config: &'a UpgradeConfig, table: &'a ToolchainTable, host: H) -> Self {
        Self {
            config,
            table,
            layout: DataDirLayout::new(&config.data_dir),
            host,
        }
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn run<F>(&mut self, mut observe: F) -> UpgradeOutcome
    where
        F: FnMut(UpgradeStage),
    {
        match self.execute(&mut observe) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    class = err.class().as_str(),
                    exit_code = err.exit_code(),
                    "{err}"
                );
                observe(UpgradeStage::Aborted(err.exit_code()));
                UpgradeOutcome::UpgradeAborted(err)
            }
        }
    }

    fn execute<F>(&mut self, observe: &mut F) -> Result<UpgradeOutcome, UpgradeError>
    where
        F: FnMut(UpgradeStage),
    {
        observe(UpgradeStage::Detecting);
        let plan = match detect(self.config, self.table)? {
            PlanDecision::NoUpgrade(reason) => {
                if reason == NoUpgradeReason::FreshDirectory {
                    // Staging dirs beside an empty live dir mean an interrupted upgrade.
                    observe(UpgradeStage::Preflighting);
                    check_staging_clear(&self.layout)?;
                }
                observe(UpgradeStage::NoUpgrade);
                return Ok(UpgradeOutcome::NoUpgradeNeeded(reason));
            }
            PlanDecision::Upgrade(plan) => plan,
        };

        observe(UpgradeStage::Preflighting);
        check_staging_clear(&self.layout)?;

        observe(UpgradeStage::Staging);
        self.stage(&plan)?;

        observe(UpgradeStage::Probing);
        let collation = probe_collation(&mut self.host, &plan.toolchain, &plan.old_dir)
            .map_err(|err| UpgradeError::ProbeFailure {
                detail: format!("{err:#}"),
                rollback: self.rollback(),
            })?;

        observe(UpgradeStage::Initializing);
        initialize_cluster(
            &mut self.host,
            &plan.target_bin_dir,
            &self.config.superuser,
            &collation,
            &plan.new_dir,
        )
        .map_err(|err| UpgradeError::InitializationFailure {
            detail: format!("{err:#}"),
            rollback: self.rollback(),
        })?;

        // Past this point nothing is rolled back automatically.
        observe(UpgradeStage::Converting);
        run_conversion(
            &mut self.host,
            &plan,
            &self.config.superuser,
            self.config.jobs,
        )
        .map_err(|err| UpgradeError::ConversionFailure {
            detail: format!("{err:#}"),
        })?;

        observe(UpgradeStage::Promoting);
        self.promote()?;

        observe(UpgradeStage::Done);
        info!(from = %plan.from, to = %plan.to, "upgrade complete");
        Ok(UpgradeOutcome::UpgradeSucceeded {
            from: plan.from,
            to: plan.to,
        })
    }

    fn stage(&mut self, plan: &UpgradePlan) -> Result<(), UpgradeError> {
        stage_live_contents(&self.layout).map_err(|err| UpgradeError::StagingFailure {
            detail: format!("{err:#}"),
            rollback: self.rollback(),
        })?;

        create_new_staging(&mut self.host, &self.layout).map_err(|err| {
            UpgradeError::StagingCreation {
                path: plan.new_dir.clone(),
                detail: format!("{err:#}"),
                rollback: self.rollback(),
            }
        })
    }

    fn rollback(&self) -> RollbackStatus {
        match rollback_staging(&self.layout) {
            Ok(()) => RollbackStatus::Restored,
            Err(err) => {
                error!("rollback failed: {err:#}");
                RollbackStatus::Failed(format!("{err:#}"))
            }
        }
    }

    fn promote(&mut self) -> Result<(), UpgradeError> {
        let fatal = |step: &'static str| {
            move |err: anyhow::Error| UpgradeError::PromotionFailure {
                step,
                detail: format!("{err:#}"),
            }
        };

        promote_new_contents(&self.layout).map_err(fatal("promote converted data"))?;
        carry_forward_files(&self.layout, &self.config.carry_forward)
            .map_err(fatal("carry forward configuration files"))?;
        remove_staging(&self.layout).map_err(fatal("remove staging directories"))?;

        if let Err(err) = remove_helper_scripts(&self.layout) {
            warn!("leaving pg_upgrade helper scripts in place: {err:#}");
        }
        Ok(())
    }
}
