use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::version::{MajorVersion, DEFAULT_TARGET_VERSION};

pub const DEFAULT_SUPERUSER: &str = "postgres";
pub const DEFAULT_TARGET_BIN_DIR: &str = "/usr/local/bin";
pub const DEFAULT_CARRY_FORWARD: &[&str] = &["pg_hba.conf", "pg_ident.conf"];

/// Resolved settings for one orchestrator run. Built once at startup and
/// passed by reference to every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeConfig {
    pub data_dir: PathBuf,
    pub target_version: MajorVersion,
    pub superuser: String,
    pub target_bin_dir: PathBuf,
    pub link_mode: bool,
    pub jobs: Option<u32>,
    pub carry_forward: Vec<String>,
}

/// One layer of partially specified settings: a config file, the
/// environment, or command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub target_version: Option<MajorVersion>,
    pub superuser: Option<String>,
    pub target_bin_dir: Option<PathBuf>,
    pub link_mode: Option<bool>,
    pub jobs: Option<u32>,
    pub carry_forward: Option<Vec<String>>,
}

impl ConfigOverrides {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse pgshift config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load config file: {}", path.display()))
    }

    /// Layers `higher` on top of `self`; fields set in `higher` win.
    pub fn merge(self, higher: ConfigOverrides) -> Self {
        Self {
            data_dir: higher.data_dir.or(self.data_dir),
            target_version: higher.target_version.or(self.target_version),
            superuser: higher.superuser.or(self.superuser),
            target_bin_dir: higher.target_bin_dir.or(self.target_bin_dir),
            link_mode: higher.link_mode.or(self.link_mode),
            jobs: higher.jobs.or(self.jobs),
            carry_forward: higher.carry_forward.or(self.carry_forward),
        }
    }
}

impl UpgradeConfig {
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        let data_dir = overrides.data_dir.ok_or_else(|| {
            anyhow!("data directory is not configured: set PGDATA, --data-dir, or data_dir")
        })?;
        let target_version = match overrides.target_version {
            Some(version) => version,
            None => MajorVersion::parse(DEFAULT_TARGET_VERSION)?,
        };

        let config = Self {
            data_dir,
            target_version,
            superuser: overrides
                .superuser
                .unwrap_or_else(|| DEFAULT_SUPERUSER.to_string()),
            target_bin_dir: overrides
                .target_bin_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_BIN_DIR)),
            link_mode: overrides.link_mode.unwrap_or(true),
            jobs: overrides.jobs,
            carry_forward: overrides.carry_forward.unwrap_or_else(|| {
                DEFAULT_CARRY_FORWARD
                    .iter()
                    .map(|name| name.to_string())
                    .collect()
            }),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow!("data directory must not be empty"));
        }
        if !self.data_dir.is_absolute() {
            return Err(anyhow!(
                "data directory must be an absolute path: {}",
                self.data_dir.display()
            ));
        }
        if self.superuser.trim().is_empty() {
            return Err(anyhow!("superuser name must not be empty"));
        }
        if self.jobs == Some(0) {
            return Err(anyhow!("jobs must be at least 1"));
        }
        for name in &self.carry_forward {
            if !is_plain_file_name(name) {
                return Err(anyhow!(
                    "carry_forward entry must be a plain file name: {name}"
                ));
            }
        }
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
