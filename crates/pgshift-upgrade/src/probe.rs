use std::fmt;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use pgshift_core::ToolchainEntry;
use tracing::info;

use crate::host::UpgradeHost;

/// Database every cluster has, used as the single-user session target.
pub const PROBE_DATABASE: &str = "template1";
pub const PROBE_QUERY: &str = "SELECT datcollate FROM pg_database WHERE datname = 'template1';\n";
const PROBE_ATTRIBUTE: &str = "datcollate";

/// Locale the old cluster was initialized with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollationSetting(String);

impl CollationSetting {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollationSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn build_probe_command(probe_binary: &Path, old_dir: &Path) -> Command {
    let mut command = Command::new(probe_binary);
    command
        .arg("--single")
        .arg("-D")
        .arg(old_dir)
        .arg(PROBE_DATABASE);
    command
}

/// Starts the legacy engine in single-user mode against `old_dir` and reads
/// back the collation of its template database.
pub fn probe_collation<H: UpgradeHost + ?Sized>(
    host: &mut H,
    toolchain: &ToolchainEntry,
    old_dir: &Path,
) -> Result<CollationSetting> {
    let probe_binary = toolchain.probe_binary();
    let mut command = build_probe_command(&probe_binary, old_dir);
    let output = host.run_with_input(
        &mut command,
        PROBE_QUERY,
        "failed to run legacy engine in single-user mode",
    )?;

    let collation = parse_collation(&output).with_context(|| {
        format!(
            "unexpected single-user output from {}",
            probe_binary.display()
        )
    })?;
    info!(collation = %collation, version = %toolchain.version, "probed old cluster collation");
    Ok(collation)
}

/// Extracts the collation from single-user console output, which prints each
/// result column as `<n>: datcollate = "<value>"  (typeid = ...)`.
pub fn parse_collation(output: &str) -> Result<CollationSetting> {
    let needle = format!("{PROBE_ATTRIBUTE} = \"");
    for line in output.lines() {
        let Some(start) = line.find(&needle) else {
            continue;
        };
        let rest = &line[start + needle.len()..];
        let Some(end) = rest.find('"') else {
            return Err(anyhow!("unterminated {PROBE_ATTRIBUTE} value: {}", line.trim()));
        };
        let value = rest[..end].trim();
        if value.is_empty() {
            return Err(anyhow!("empty {PROBE_ATTRIBUTE} value"));
        }
        return Ok(CollationSetting(value.to_string()));
    }

    Err(anyhow!("no {PROBE_ATTRIBUTE} line in probe output"))
}
