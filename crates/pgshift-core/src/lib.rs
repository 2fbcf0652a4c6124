mod config;
mod marker;
mod toolchain;
mod version;

pub use config::{
    ConfigOverrides, UpgradeConfig, DEFAULT_CARRY_FORWARD, DEFAULT_SUPERUSER,
    DEFAULT_TARGET_BIN_DIR,
};
pub use marker::{read_version_marker, VERSION_MARKER_FILE};
pub use toolchain::{
    NoUpgradeReason, ToolchainEntry, ToolchainTable, UpgradeDecision, UpgradePolicy,
};
pub use version::{MajorVersion, DEFAULT_TARGET_VERSION};
