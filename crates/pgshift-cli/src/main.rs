use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgshift_core::{
    ConfigOverrides, MajorVersion, ToolchainTable, UpgradeConfig, DEFAULT_TARGET_VERSION,
};
use pgshift_upgrade::{plan_upgrade, PlanDecision, SystemHost, UpgradeOutcome, Upgrader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod render;

use render::{
    current_output_style, format_outcome_lines, format_plan_lines, format_toolchain_lines,
    render_config_error_banner, render_fatal_banner, OutputStyle, StageProgress,
};

#[derive(Parser, Debug)]
#[command(name = "pgshift")]
#[command(
    about = "Upgrades a PostgreSQL data directory to the container's major version before startup",
    long_about = None,
    version
)]
struct Cli {
    /// TOML file with default settings.
    #[arg(long, env = "PGSHIFT_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[arg(long, env = "PGDATA", global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, env = "PGTARGET", global = true)]
    target_version: Option<String>,
    #[arg(long, env = "POSTGRES_USER", global = true)]
    superuser: Option<String>,
    #[arg(long, env = "PGSHIFT_TARGET_BIN_DIR", global = true)]
    target_bin_dir: Option<PathBuf>,
    /// Copy data files instead of hard-linking them during conversion.
    #[arg(long, global = true)]
    copy: bool,
    #[arg(long, env = "PGSHIFT_JOBS", global = true)]
    jobs: Option<u32>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Upgrade the data directory if it was written by an older major version.
    Run,
    /// Report what `run` would do without changing anything.
    Plan {
        #[arg(long)]
        json: bool,
    },
    /// List the legacy toolchains this image can upgrade from.
    Toolchains {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let style = current_output_style();
    let code = match run_cli(cli, style) {
        Ok(code) => code,
        Err(err) => {
            for line in render_config_error_banner(style, &err) {
                eprintln!("{line}");
            }
            1
        }
    };
    ExitCode::from(code)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_cli(cli: Cli, style: OutputStyle) -> Result<u8> {
    let table = ToolchainTable::builtin();
    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Toolchains { json } => {
            let target = match resolve_target_version(cli.target_version.as_deref())? {
                Some(target) => target,
                None => MajorVersion::parse(DEFAULT_TARGET_VERSION)?,
            };
            if json {
                let rendered = serde_json::to_string_pretty(table.entries())
                    .context("failed to serialize toolchain table")?;
                println!("{rendered}");
            } else {
                for line in format_toolchain_lines(&table, target) {
                    println!("{line}");
                }
            }
            Ok(0)
        }
        Commands::Plan { json } => {
            let config = resolve_config(&cli)?;
            let decision = match plan_upgrade(&config, &table) {
                Ok(decision) => decision,
                Err(err) => {
                    for line in render_fatal_banner(style, &err) {
                        eprintln!("{line}");
                    }
                    return Ok(exit_code(err.exit_code()));
                }
            };
            if json {
                println!("{}", plan_json(&decision)?);
            } else {
                for line in format_plan_lines(&decision, style) {
                    println!("{line}");
                }
            }
            Ok(0)
        }
        Commands::Run => {
            let config = resolve_config(&cli)?;
            info!(
                data_dir = %config.data_dir.display(),
                target = %config.target_version,
                link_mode = config.link_mode,
                "checking data directory"
            );
            let mut progress = StageProgress::start(style);
            let mut upgrader = Upgrader::new(&config, &table, SystemHost);
            let outcome = upgrader.run(|stage| progress.observe(stage));
            progress.finish(&outcome);

            let aborted = matches!(outcome, UpgradeOutcome::UpgradeAborted(_));
            for line in format_outcome_lines(&outcome, style) {
                if aborted {
                    eprintln!("{line}");
                } else {
                    println!("{line}");
                }
            }
            Ok(exit_code(outcome.exit_code()))
        }
    }
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn resolve_target_version(raw: Option<&str>) -> Result<Option<MajorVersion>> {
    raw.map(|value| {
        MajorVersion::parse(value).with_context(|| format!("invalid target version: {value}"))
    })
    .transpose()
}

fn cli_overrides(cli: &Cli) -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        target_version: resolve_target_version(cli.target_version.as_deref())?,
        superuser: cli.superuser.clone(),
        target_bin_dir: cli.target_bin_dir.clone(),
        link_mode: cli.copy.then_some(false),
        jobs: cli.jobs,
        carry_forward: None,
    })
}

fn resolve_config(cli: &Cli) -> Result<UpgradeConfig> {
    let file = match &cli.config {
        Some(path) => ConfigOverrides::from_file(path)?,
        None => ConfigOverrides::default(),
    };
    UpgradeConfig::resolve(file.merge(cli_overrides(cli)?))
}

fn plan_json(decision: &PlanDecision) -> Result<String> {
    let value = match decision {
        PlanDecision::NoUpgrade(reason) => serde_json::json!({
            "action": "none",
            "reason": reason.describe(),
        }),
        PlanDecision::Upgrade(plan) => serde_json::json!({
            "action": "upgrade",
            "plan": plan,
        }),
    };
    serde_json::to_string_pretty(&value).context("failed to serialize upgrade plan")
}
