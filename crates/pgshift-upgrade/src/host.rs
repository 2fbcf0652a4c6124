use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::fs_utils::create_private_dir;

/// Side effects the orchestrator needs from the machine it runs on.
///
/// Every external tool invocation goes through this seam, so the whole
/// upgrade flow can be driven without PostgreSQL binaries installed.
pub trait UpgradeHost {
    /// Runs `command` to completion; a non-zero exit is an error.
    fn run(&mut self, command: &mut Command, context_message: &str) -> Result<()>;

    /// Runs `command` with `input` on stdin and returns its stdout.
    fn run_with_input(
        &mut self,
        command: &mut Command,
        input: &str,
        context_message: &str,
    ) -> Result<String>;

    /// Creates a staging directory with the owner-only mode PostgreSQL requires.
    fn create_dir(&mut self, path: &Path) -> io::Result<()> {
        create_private_dir(path)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl UpgradeHost for SystemHost {
    fn run(&mut self, command: &mut Command, context_message: &str) -> Result<()> {
        run_command(command, context_message)
    }

    fn run_with_input(
        &mut self,
        command: &mut Command,
        input: &str,
        context_message: &str,
    ) -> Result<String> {
        run_command_with_input(command, input, context_message)
    }
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    debug!(command = ?command, "running external tool");
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    check_output(&output, context_message)
}

pub(crate) fn run_command_with_input(
    command: &mut Command,
    input: &str,
    context_message: &str,
) -> Result<String> {
    debug!(command = ?command, "running external tool with stdin");
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("{context_message}: command failed to start"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("{context_message}: failed to write command input"))?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("{context_message}: failed to wait for command"))?;
    check_output(&output, context_message)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn check_output(output: &Output, context_message: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
