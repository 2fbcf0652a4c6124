use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::version::MajorVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradePolicy {
    /// Data in this format is converted to any newer target. A target older
    /// than the data is refused as unrecognized.
    Always,
    /// Converted only when the target is strictly newer. Covers the most
    /// recent prior majors, where container and data may already agree.
    WhenTargetNewer,
}

impl UpgradePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::WhenTargetNewer => "when-target-newer",
        }
    }
}

/// Legacy binaries able to read one on-disk major version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainEntry {
    pub version: MajorVersion,
    pub bin_dir: &'static str,
    pub probe_binary: &'static str,
    pub policy: UpgradePolicy,
}

impl ToolchainEntry {
    pub fn bin_dir(&self) -> &Path {
        Path::new(self.bin_dir)
    }

    pub fn probe_binary(&self) -> PathBuf {
        PathBuf::from(self.probe_binary)
    }
}

macro_rules! toolchain {
    ($version:expr, $dir:literal, $policy:ident) => {
        ToolchainEntry {
            version: $version,
            bin_dir: concat!($dir, "/bin"),
            probe_binary: concat!($dir, "/bin/postgres"),
            policy: UpgradePolicy::$policy,
        }
    };
}

const BUILTIN_TOOLCHAINS: &[ToolchainEntry] = &[
    toolchain!(MajorVersion::legacy(9, 5), "/usr/local-pg9.5", Always),
    toolchain!(MajorVersion::legacy(9, 6), "/usr/local-pg9.6", Always),
    toolchain!(MajorVersion::new(10), "/usr/local-pg10", Always),
    toolchain!(MajorVersion::new(11), "/usr/local-pg11", Always),
    toolchain!(MajorVersion::new(12), "/usr/local-pg12", Always),
    toolchain!(MajorVersion::new(13), "/usr/local-pg13", Always),
    toolchain!(MajorVersion::new(14), "/usr/local-pg14", Always),
    toolchain!(MajorVersion::new(15), "/usr/local-pg15", WhenTargetNewer),
    toolchain!(MajorVersion::new(16), "/usr/local-pg16", WhenTargetNewer),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoUpgradeReason {
    FreshDirectory,
    AlreadyCurrent,
    TargetNotNewer,
}

impl NoUpgradeReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::FreshDirectory => "no version marker present",
            Self::AlreadyCurrent => "data directory already matches the target version",
            Self::TargetNotNewer => "target version is not newer than the data directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeDecision<'a> {
    NoUpgrade(NoUpgradeReason),
    Upgrade {
        from: MajorVersion,
        entry: &'a ToolchainEntry,
    },
    Unrecognized {
        marker: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainTable {
    entries: Vec<ToolchainEntry>,
}

impl ToolchainTable {
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN_TOOLCHAINS.to_vec())
    }

    pub fn from_entries(entries: Vec<ToolchainEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ToolchainEntry] {
        &self.entries
    }

    pub fn lookup(&self, version: MajorVersion) -> Option<&ToolchainEntry> {
        self.entries.iter().find(|entry| entry.version == version)
    }

    pub fn decide(&self, marker: Option<&str>, target: MajorVersion) -> UpgradeDecision<'_> {
        let Some(raw) = marker else {
            return UpgradeDecision::NoUpgrade(NoUpgradeReason::FreshDirectory);
        };
        let unrecognized = || UpgradeDecision::Unrecognized {
            marker: raw.trim().to_string(),
        };

        let Ok(from) = MajorVersion::parse(raw) else {
            return unrecognized();
        };
        if from == target {
            return UpgradeDecision::NoUpgrade(NoUpgradeReason::AlreadyCurrent);
        }

        let Some(entry) = self.lookup(from) else {
            return unrecognized();
        };
        if target > from {
            return UpgradeDecision::Upgrade { from, entry };
        }
        // Never downgrade; a recent-band cluster ahead of the image is left alone.
        match entry.policy {
            UpgradePolicy::WhenTargetNewer => {
                UpgradeDecision::NoUpgrade(NoUpgradeReason::TargetNotNewer)
            }
            UpgradePolicy::Always => unrecognized(),
        }
    }
}
