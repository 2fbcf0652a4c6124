use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Detection,
    PreflightConflict,
    UnrecognizedFormat,
    StagingFailure,
    StagingCreationFailure,
    ProbeFailure,
    InitializationFailure,
    ConversionFailure,
    PromotionFailure,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::PreflightConflict => "preflight-conflict",
            Self::UnrecognizedFormat => "unrecognized-format",
            Self::StagingFailure => "staging-failure",
            Self::StagingCreationFailure => "staging-creation-failure",
            Self::ProbeFailure => "probe-failure",
            Self::InitializationFailure => "initialization-failure",
            Self::ConversionFailure => "conversion-failure",
            Self::PromotionFailure => "promotion-failure",
        }
    }
}

/// Result of restoring the live directory after an early-stage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatus {
    Restored,
    Failed(String),
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restored => write!(f, "original data restored"),
            Self::Failed(detail) => {
                write!(f, "rollback failed, manual recovery required: {detail}")
            }
        }
    }
}

/// Fatal conditions of an orchestrator run. Each maps to a stable exit code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("failed to inspect data directory: {detail}")]
    DataDirUnreadable { detail: String },

    #[error("old staging directory already exists: {}", .path.display())]
    OldStagingPresent { path: PathBuf },

    #[error("new staging directory already exists: {}", .path.display())]
    NewStagingPresent { path: PathBuf },

    #[error("unrecognized data directory version '{marker}'")]
    UnrecognizedVersion { marker: String },

    #[error("failed to move live data into staging: {detail} ({rollback})")]
    StagingFailure {
        detail: String,
        rollback: RollbackStatus,
    },

    #[error("failed to create new staging directory {}: {detail} ({rollback})", .path.display())]
    StagingCreation {
        path: PathBuf,
        detail: String,
        rollback: RollbackStatus,
    },

    #[error("failed to probe collation of the old cluster: {detail} ({rollback})")]
    ProbeFailure {
        detail: String,
        rollback: RollbackStatus,
    },

    #[error("failed to initialize the new cluster: {detail} ({rollback})")]
    InitializationFailure {
        detail: String,
        rollback: RollbackStatus,
    },

    #[error("pg_upgrade failed: {detail}")]
    ConversionFailure { detail: String },

    #[error("failed to {step}: {detail}")]
    PromotionFailure { step: &'static str, detail: String },
}

impl UpgradeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DataDirUnreadable { .. } => 1,
            Self::OldStagingPresent { .. } => 7,
            Self::NewStagingPresent { .. } => 8,
            Self::StagingCreation { .. } => 9,
            Self::UnrecognizedVersion { .. } => 10,
            Self::ProbeFailure { .. } => 11,
            Self::InitializationFailure { .. } => 12,
            Self::ConversionFailure { .. } => 13,
            Self::PromotionFailure { .. } => 14,
            Self::StagingFailure { .. } => 15,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DataDirUnreadable { .. } => ErrorClass::Detection,
            Self::OldStagingPresent { .. } | Self::NewStagingPresent { .. } => {
                ErrorClass::PreflightConflict
            }
            Self::UnrecognizedVersion { .. } => ErrorClass::UnrecognizedFormat,
            Self::StagingFailure { .. } => ErrorClass::StagingFailure,
            Self::StagingCreation { .. } => ErrorClass::StagingCreationFailure,
            Self::ProbeFailure { .. } => ErrorClass::ProbeFailure,
            Self::InitializationFailure { .. } => ErrorClass::InitializationFailure,
            Self::ConversionFailure { .. } => ErrorClass::ConversionFailure,
            Self::PromotionFailure { .. } => ErrorClass::PromotionFailure,
        }
    }

    /// What the operator has to do before the next start can succeed.
    pub fn operator_hint(&self) -> String {
        match self {
            Self::DataDirUnreadable { .. } => {
                "check permissions on the data directory and its PG_VERSION file".to_string()
            }
            Self::OldStagingPresent { path } | Self::NewStagingPresent { path } => format!(
                "a previous upgrade was interrupted; inspect {} and remove it manually once the data is safe",
                path.display()
            ),
            Self::UnrecognizedVersion { .. } => {
                "no legacy toolchain in this image can read the data; the data directory was left untouched"
                    .to_string()
            }
            Self::StagingFailure { rollback, .. }
            | Self::StagingCreation { rollback, .. }
            | Self::ProbeFailure { rollback, .. }
            | Self::InitializationFailure { rollback, .. } => match rollback {
                RollbackStatus::Restored => {
                    "the live data directory was restored; fix the cause and restart".to_string()
                }
                RollbackStatus::Failed(_) => {
                    "restore the contents of the old staging directory into the data directory by hand"
                        .to_string()
                }
            },
            Self::ConversionFailure { .. } | Self::PromotionFailure { .. } => {
                "the old and new staging directories were left in place; inspect them before restarting"
                    .to_string()
            }
        }
    }
}
