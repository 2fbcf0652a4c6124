use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use pgshift_core::{MajorVersion, ToolchainTable, UpgradeDecision};
use pgshift_upgrade::{PlanDecision, UpgradeError, UpgradeOutcome, UpgradeStage, UPGRADE_STEP_COUNT};

const BANNER_RULE: &str = "************************************************************";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

/// Step-by-step progress for an upgrade run. Draws nothing in plain mode,
/// where the log lines already record every stage.
pub(crate) struct StageProgress {
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl StageProgress {
    pub(crate) fn start(style: OutputStyle) -> Self {
        let progress_bar = if style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(UPGRADE_STEP_COUNT);
            if let Ok(template) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos}/{len} {elapsed_precise}",
            ) {
                progress_bar.set_style(template.tick_chars("-=~* ").progress_chars("=>-"));
            }
            progress_bar.set_message(UpgradeStage::Detecting.as_str());
            progress_bar.enable_steady_tick(Duration::from_millis(120));
            Some(progress_bar)
        } else {
            None
        };

        Self {
            progress_bar,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn observe(&mut self, stage: UpgradeStage) {
        let Some(progress_bar) = &self.progress_bar else {
            return;
        };
        progress_bar.set_message(stage.as_str());
        if let Some(index) = stage.step_index() {
            progress_bar.set_position(index);
        }
    }

    pub(crate) fn finish(mut self, outcome: &UpgradeOutcome) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        if let UpgradeOutcome::UpgradeSucceeded { .. } = outcome {
            eprintln!(
                "{} complete in {}",
                colorize(label_style(), "upgrade"),
                format_elapsed(self.started_at.elapsed())
            );
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

/// Lines reporting the end of a run. Aborted runs get the fatal banner and
/// belong on stderr.
pub(crate) fn format_outcome_lines(outcome: &UpgradeOutcome, style: OutputStyle) -> Vec<String> {
    match outcome {
        UpgradeOutcome::NoUpgradeNeeded(reason) => vec![render_status_line(
            style,
            "ok",
            &format!("no upgrade needed: {}", reason.describe()),
        )],
        UpgradeOutcome::UpgradeSucceeded { from, to } => vec![render_status_line(
            style,
            "ok",
            &format!("upgraded data directory from {from} to {to}"),
        )],
        UpgradeOutcome::UpgradeAborted(err) => render_fatal_banner(style, err),
    }
}

pub(crate) fn format_plan_lines(decision: &PlanDecision, style: OutputStyle) -> Vec<String> {
    match decision {
        PlanDecision::NoUpgrade(reason) => vec![render_status_line(
            style,
            "ok",
            &format!("no upgrade needed: {}", reason.describe()),
        )],
        PlanDecision::Upgrade(plan) => {
            let mode = if plan.link_mode { "link" } else { "copy" };
            vec![
                render_status_line(
                    style,
                    "warn",
                    &format!("upgrade required: {} -> {}", plan.from, plan.to),
                ),
                format!("data dir: {}", plan.data_dir.display()),
                format!("legacy binaries: {}", plan.toolchain.bin_dir),
                format!("target binaries: {}", plan.target_bin_dir.display()),
                format!("staging: {} {}", plan.old_dir.display(), plan.new_dir.display()),
                format!("mode: {mode}"),
            ]
        }
    }
}

pub(crate) fn format_toolchain_lines(table: &ToolchainTable, target: MajorVersion) -> Vec<String> {
    table
        .entries()
        .iter()
        .map(|entry| {
            let version = entry.version.to_string();
            let action = match table.decide(Some(&version), target) {
                UpgradeDecision::Upgrade { .. } => "upgrade",
                UpgradeDecision::NoUpgrade(_) => "keep",
                UpgradeDecision::Unrecognized { .. } => "refuse",
            };
            format!(
                "{:<5} {:<18} {:<22} {action}",
                version,
                entry.policy.as_str(),
                entry.bin_dir
            )
        })
        .collect()
}

/// Banner printed to stderr for every fatal outcome.
pub(crate) fn render_fatal_banner(style: OutputStyle, err: &UpgradeError) -> Vec<String> {
    banner_lines(
        style,
        &format!("ERROR: {err}"),
        &[
            format!(
                "class: {}, exit code: {}",
                err.class().as_str(),
                err.exit_code()
            ),
            err.operator_hint(),
        ],
    )
}

pub(crate) fn render_config_error_banner(style: OutputStyle, err: &anyhow::Error) -> Vec<String> {
    banner_lines(
        style,
        &format!("ERROR: {err:#}"),
        &["class: configuration, exit code: 1".to_string()],
    )
}

fn banner_lines(style: OutputStyle, headline: &str, details: &[String]) -> Vec<String> {
    let rule = match style {
        OutputStyle::Plain => BANNER_RULE.to_string(),
        OutputStyle::Rich => colorize(error_style(), BANNER_RULE),
    };
    let headline = match style {
        OutputStyle::Plain => headline.to_string(),
        OutputStyle::Rich => colorize(error_style(), headline),
    };

    let mut lines = vec![rule.clone(), headline];
    lines.extend(details.iter().cloned());
    lines.push(rule);
    lines
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
