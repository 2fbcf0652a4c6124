use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use pgshift_core::{MajorVersion, NoUpgradeReason, ToolchainTable, UpgradeConfig};

use super::*;
use crate::convert::build_upgrade_command;
use crate::fs_utils::{create_private_dir, move_entries};
use crate::initdb::build_initdb_command;
use crate::probe::build_probe_command;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

const TARGET_BIN_DIR: &str = "/opt/pg-target/bin";

const PROBE_OUTPUT: &str = "\nPostgreSQL stand-alone backend 13.14\nbackend> \t 1: datcollate\t(typeid = 19, len = 64, typmod = -1, byval = f)\n\t----\n\t 1: datcollate = \"en_US.utf8\"\t(typeid = 19, len = 64, typmod = -1, byval = f)\n\t----\nbackend> \n";

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedCommand {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    input: Option<String>,
}

impl RecordedCommand {
    fn from_command(command: &Command, input: Option<&str>) -> Self {
        Self {
            program: PathBuf::from(command.get_program()),
            args: command
                .get_args()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            cwd: command.get_current_dir().map(Path::to_path_buf),
            input: input.map(str::to_string),
        }
    }

    fn tool(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }
}

/// Stands in for the PostgreSQL binaries: records every invocation and
/// writes what the real tools would leave on disk.
#[derive(Debug, Default)]
struct FakeHost {
    commands: Vec<RecordedCommand>,
    probe_output: Option<String>,
    fail_probe: bool,
    fail_initdb: bool,
    fail_conversion: bool,
    fail_create_dir: Option<PathBuf>,
    conversion_extra_entries: Vec<&'static str>,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            probe_output: Some(PROBE_OUTPUT.to_string()),
            ..Self::default()
        }
    }

    fn tools(&self) -> Vec<String> {
        self.commands.iter().map(RecordedCommand::tool).collect()
    }

    fn find(&self, tool: &str) -> Option<&RecordedCommand> {
        self.commands.iter().find(|command| command.tool() == tool)
    }

    fn simulate_initdb(&self, recorded: &RecordedCommand) -> Result<()> {
        let new_dir = PathBuf::from(recorded.args.last().ok_or_else(|| anyhow!("no dir"))?);
        fs::create_dir_all(new_dir.join("base"))?;
        fs::create_dir_all(new_dir.join("global"))?;
        fs::write(new_dir.join("PG_VERSION"), "17\n")?;
        fs::write(new_dir.join("postgresql.conf"), "# initdb defaults\n")?;
        fs::write(new_dir.join("pg_hba.conf"), "# initdb hba\n")?;
        fs::write(new_dir.join("pg_ident.conf"), "# initdb ident\n")?;
        Ok(())
    }

    fn simulate_conversion(&self, recorded: &RecordedCommand) -> Result<()> {
        let new_dir = PathBuf::from(recorded.flag_value("-D").ok_or_else(|| anyhow!("no -D"))?);
        fs::create_dir_all(new_dir.join("base").join("1"))?;
        fs::write(new_dir.join("base").join("1").join("1259"), b"converted relation")?;
        fs::write(new_dir.join("global").join("pg_control"), b"converted control")?;
        for name in &self.conversion_extra_entries {
            fs::create_dir_all(new_dir.join(name))?;
        }
        if let Some(cwd) = &recorded.cwd {
            fs::write(cwd.join("delete_old_cluster.sh"), "#!/bin/sh\n")?;
        }
        Ok(())
    }
}

impl UpgradeHost for FakeHost {
    fn run(&mut self, command: &mut Command, context_message: &str) -> Result<()> {
        let recorded = RecordedCommand::from_command(command, None);
        self.commands.push(recorded.clone());
        match recorded.tool().as_str() {
            "initdb" if self.fail_initdb => Err(anyhow!("{context_message}: status=1")),
            "initdb" => self.simulate_initdb(&recorded),
            "pg_upgrade" if self.fail_conversion => Err(anyhow!("{context_message}: status=1")),
            "pg_upgrade" => self.simulate_conversion(&recorded),
            other => Err(anyhow!("unexpected tool: {other}")),
        }
    }

    fn run_with_input(
        &mut self,
        command: &mut Command,
        input: &str,
        context_message: &str,
    ) -> Result<String> {
        self.commands
            .push(RecordedCommand::from_command(command, Some(input)));
        if self.fail_probe {
            return Err(anyhow!("{context_message}: command failed to start"));
        }
        Ok(self.probe_output.clone().unwrap_or_default())
    }

    fn create_dir(&mut self, path: &Path) -> io::Result<()> {
        if self.fail_create_dir.as_deref() == Some(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "staging path is not writable",
            ));
        }
        create_private_dir(path)
    }
}

fn test_data_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "pgshift-upgrade-test-{}-{nanos}-{seq}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn seed_cluster(dir: &Path, version: &str) {
    fs::write(dir.join("PG_VERSION"), format!("{version}\n")).expect("must write marker");
    fs::create_dir_all(dir.join("base").join("1")).expect("must create base");
    fs::write(dir.join("base").join("1").join("1259"), b"legacy relation").expect("write");
    fs::create_dir_all(dir.join("global")).expect("must create global");
    fs::write(dir.join("global").join("pg_control"), b"legacy control").expect("write");
    fs::write(dir.join("postgresql.conf"), "shared_buffers = 256MB\n").expect("write");
    fs::write(dir.join("pg_hba.conf"), "host all all 10.0.0.0/8 scram-sha-256\n").expect("write");
    fs::write(dir.join("pg_ident.conf"), "map os_user db_user\n").expect("write");
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    let mut entries = BTreeMap::new();
    snapshot_into(root, root, &mut entries);
    entries
}

fn snapshot_into(root: &Path, dir: &Path, entries: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
    for entry in fs::read_dir(dir).expect("must read dir") {
        let path = entry.expect("must read entry").path();
        let relative = path.strip_prefix(root).expect("under root").to_path_buf();
        if path.is_dir() {
            entries.insert(relative, None);
            snapshot_into(root, &path, entries);
        } else {
            entries.insert(relative, Some(fs::read(&path).expect("must read file")));
        }
    }
}

fn test_config(data_dir: &Path, target: &str) -> UpgradeConfig {
    UpgradeConfig {
        data_dir: data_dir.to_path_buf(),
        target_version: MajorVersion::parse(target).expect("target must parse"),
        superuser: "postgres".to_string(),
        target_bin_dir: PathBuf::from(TARGET_BIN_DIR),
        link_mode: true,
        jobs: None,
        carry_forward: vec!["pg_hba.conf".to_string(), "pg_ident.conf".to_string()],
    }
}

fn run_upgrade(
    config: &UpgradeConfig,
    host: FakeHost,
) -> (UpgradeOutcome, Vec<UpgradeStage>, FakeHost) {
    let table = ToolchainTable::builtin();
    let mut stages = Vec::new();
    let mut upgrader = Upgrader::new(config, &table, host);
    let outcome = upgrader.run(|stage| stages.push(stage));
    (outcome, stages, upgrader.into_host())
}

#[test]
fn matching_version_is_a_byte_identical_no_op() {
    let dir = test_data_dir();
    seed_cluster(&dir, "17");
    let before = snapshot(&dir);

    let (outcome, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(
        outcome,
        UpgradeOutcome::NoUpgradeNeeded(NoUpgradeReason::AlreadyCurrent)
    );
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(stages, vec![UpgradeStage::Detecting, UpgradeStage::NoUpgrade]);
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn fresh_directory_needs_no_upgrade() {
    let dir = test_data_dir();

    let (outcome, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(
        outcome,
        UpgradeOutcome::NoUpgradeNeeded(NoUpgradeReason::FreshDirectory)
    );
    assert_eq!(
        stages,
        vec![
            UpgradeStage::Detecting,
            UpgradeStage::Preflighting,
            UpgradeStage::NoUpgrade
        ]
    );
    assert!(host.commands.is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn recent_version_is_kept_when_target_is_not_newer() {
    let dir = test_data_dir();
    seed_cluster(&dir, "16");
    let before = snapshot(&dir);

    let (outcome, _, host) = run_upgrade(&test_config(&dir, "15"), FakeHost::new());

    assert_eq!(
        outcome,
        UpgradeOutcome::NoUpgradeNeeded(NoUpgradeReason::TargetNotNewer)
    );
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn leftover_old_staging_aborts_without_touching_data() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    fs::create_dir(dir.join("old")).expect("must create leftover");
    fs::write(dir.join("old").join("PG_VERSION"), "13\n").expect("write");
    let before = snapshot(&dir);

    let (outcome, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    let UpgradeOutcome::UpgradeAborted(err) = &outcome else {
        panic!("expected abort, got {outcome:?}");
    };
    assert_eq!(
        err,
        &UpgradeError::OldStagingPresent {
            path: dir.join("old")
        }
    );
    assert_eq!(outcome.exit_code(), 7);
    assert_eq!(err.class(), ErrorClass::PreflightConflict);
    assert_eq!(stages.last(), Some(&UpgradeStage::Aborted(7)));
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn leftover_new_staging_aborts_without_touching_data() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    fs::create_dir(dir.join("new")).expect("must create leftover");
    let before = snapshot(&dir);

    let (outcome, _, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(outcome.exit_code(), 8);
    assert!(matches!(
        outcome,
        UpgradeOutcome::UpgradeAborted(UpgradeError::NewStagingPresent { .. })
    ));
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn leftover_staging_file_counts_as_present() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    fs::write(dir.join("old"), b"not a directory").expect("write");

    let (outcome, _, _) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(outcome.exit_code(), 7);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unrecognized_version_aborts_with_data_untouched() {
    let dir = test_data_dir();
    seed_cluster(&dir, "9.4");
    let before = snapshot(&dir);

    let (outcome, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(
        outcome,
        UpgradeOutcome::UpgradeAborted(UpgradeError::UnrecognizedVersion {
            marker: "9.4".to_string()
        })
    );
    assert_eq!(outcome.exit_code(), 10);
    assert_eq!(
        stages,
        vec![UpgradeStage::Detecting, UpgradeStage::Aborted(10)]
    );
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn target_older_than_data_is_refused_untouched() {
    let dir = test_data_dir();
    seed_cluster(&dir, "14");
    let before = snapshot(&dir);

    let (outcome, stages, host) = run_upgrade(&test_config(&dir, "12"), FakeHost::new());

    assert_eq!(
        outcome,
        UpgradeOutcome::UpgradeAborted(UpgradeError::UnrecognizedVersion {
            marker: "14".to_string()
        })
    );
    assert_eq!(stages, vec![UpgradeStage::Detecting, UpgradeStage::Aborted(10)]);
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn staging_directories_are_private_to_the_owner() {
    use std::os::unix::fs::PermissionsExt;

    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    let layout = DataDirLayout::new(&dir);

    stage_live_contents(&layout).expect("must stage live data");
    create_new_staging(&mut SystemHost, &layout).expect("must create new staging");

    for staged in [layout.old_dir(), layout.new_dir()] {
        let mode = fs::metadata(&staged).expect("stat").permissions().mode() & 0o777;
        assert_eq!(mode, 0o700, "{} has mode {mode:o}", staged.display());
    }
    assert!(layout.old_dir().join("PG_VERSION").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn successful_upgrade_promotes_converted_data_and_carries_auth_files() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");

    let (outcome, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(
        outcome,
        UpgradeOutcome::UpgradeSucceeded {
            from: MajorVersion::new(13),
            to: MajorVersion::new(17),
        }
    );
    assert_eq!(
        stages,
        vec![
            UpgradeStage::Detecting,
            UpgradeStage::Preflighting,
            UpgradeStage::Staging,
            UpgradeStage::Probing,
            UpgradeStage::Initializing,
            UpgradeStage::Converting,
            UpgradeStage::Promoting,
            UpgradeStage::Done,
        ]
    );
    assert_eq!(host.tools(), vec!["postgres", "initdb", "pg_upgrade"]);

    let live = snapshot(&dir);
    let names = live.keys().cloned().collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            PathBuf::from("PG_VERSION"),
            PathBuf::from("base"),
            PathBuf::from("base/1"),
            PathBuf::from("base/1/1259"),
            PathBuf::from("global"),
            PathBuf::from("global/pg_control"),
            PathBuf::from("pg_hba.conf"),
            PathBuf::from("pg_ident.conf"),
            PathBuf::from("postgresql.conf"),
        ]
    );
    assert_eq!(
        fs::read_to_string(dir.join("PG_VERSION")).expect("read"),
        "17\n"
    );
    assert_eq!(
        fs::read(dir.join("base/1/1259")).expect("read"),
        b"converted relation"
    );
    assert_eq!(
        fs::read_to_string(dir.join("pg_hba.conf")).expect("read"),
        "host all all 10.0.0.0/8 scram-sha-256\n"
    );
    assert_eq!(
        fs::read_to_string(dir.join("pg_ident.conf")).expect("read"),
        "map os_user db_user\n"
    );
    assert_eq!(
        fs::read_to_string(dir.join("postgresql.conf")).expect("read"),
        "# initdb defaults\n"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn probe_and_initdb_receive_the_old_cluster_collation() {
    let dir = test_data_dir();
    seed_cluster(&dir, "12");

    let (_, _, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    let probe = host.find("postgres").expect("probe must run");
    assert_eq!(probe.program, PathBuf::from("/usr/local-pg12/bin/postgres"));
    assert_eq!(
        probe.args,
        vec![
            "--single".to_string(),
            "-D".to_string(),
            dir.join("old").display().to_string(),
            "template1".to_string(),
        ]
    );
    assert_eq!(probe.input.as_deref(), Some(PROBE_QUERY));

    let initdb = host.find("initdb").expect("initdb must run");
    assert_eq!(initdb.program, Path::new(TARGET_BIN_DIR).join("initdb"));
    assert_eq!(
        initdb.args,
        vec![
            "--username=postgres".to_string(),
            "--locale=en_US.utf8".to_string(),
            dir.join("new").display().to_string(),
        ]
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn every_known_version_converts_with_its_own_toolchain() {
    let table = ToolchainTable::builtin();
    for entry in table.entries() {
        let dir = test_data_dir();
        let version = entry.version.to_string();
        seed_cluster(&dir, &version);

        let (outcome, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

        assert!(
            stages.contains(&UpgradeStage::Converting),
            "version {version} never reached conversion: {outcome:?}"
        );
        let probe = host.find("postgres").expect("probe must run");
        assert_eq!(probe.program, entry.probe_binary(), "version {version}");

        let upgrade = host.find("pg_upgrade").expect("pg_upgrade must run");
        assert_eq!(upgrade.flag_value("-b"), Some(entry.bin_dir), "version {version}");
        assert_eq!(upgrade.flag_value("-B"), Some(TARGET_BIN_DIR), "version {version}");
        assert_eq!(
            upgrade.flag_value("-d"),
            Some(dir.join("old").display().to_string().as_str())
        );
        assert_eq!(
            upgrade.flag_value("-D"),
            Some(dir.join("new").display().to_string().as_str())
        );
        assert_eq!(outcome.exit_code(), 0, "version {version}");

        let _ = fs::remove_dir_all(&dir);
    }
}

#[test]
fn new_staging_creation_failure_restores_original_data() {
    let dir = test_data_dir();
    seed_cluster(&dir, "11");
    let before = snapshot(&dir);
    let host = FakeHost {
        fail_create_dir: Some(dir.join("new")),
        ..FakeHost::new()
    };

    let (outcome, _, host) = run_upgrade(&test_config(&dir, "17"), host);

    let UpgradeOutcome::UpgradeAborted(err) = &outcome else {
        panic!("expected abort, got {outcome:?}");
    };
    assert_eq!(err.exit_code(), 9);
    assert_eq!(err.class(), ErrorClass::StagingCreationFailure);
    assert!(matches!(
        err,
        UpgradeError::StagingCreation {
            rollback: RollbackStatus::Restored,
            ..
        }
    ));
    assert!(err.to_string().contains("staging path is not writable"));
    assert!(host.commands.is_empty());
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn probe_failure_rolls_back_and_aborts() {
    let dir = test_data_dir();
    seed_cluster(&dir, "14");
    let before = snapshot(&dir);
    let host = FakeHost {
        probe_output: Some("backend> \n".to_string()),
        ..FakeHost::new()
    };

    let (outcome, _, host) = run_upgrade(&test_config(&dir, "17"), host);

    assert_eq!(outcome.exit_code(), 11);
    assert_eq!(host.tools(), vec!["postgres"]);
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_probe_binary_rolls_back_and_aborts() {
    let dir = test_data_dir();
    seed_cluster(&dir, "14");
    let before = snapshot(&dir);
    let host = FakeHost {
        fail_probe: true,
        ..FakeHost::new()
    };

    let (outcome, _, _) = run_upgrade(&test_config(&dir, "17"), host);

    assert_eq!(outcome.exit_code(), 11);
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn initdb_failure_rolls_back_and_aborts() {
    let dir = test_data_dir();
    seed_cluster(&dir, "10");
    let before = snapshot(&dir);
    let host = FakeHost {
        fail_initdb: true,
        ..FakeHost::new()
    };

    let (outcome, _, host) = run_upgrade(&test_config(&dir, "17"), host);

    assert_eq!(outcome.exit_code(), 12);
    assert_eq!(host.tools(), vec!["postgres", "initdb"]);
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn conversion_failure_leaves_staging_for_the_operator() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    let host = FakeHost {
        fail_conversion: true,
        ..FakeHost::new()
    };

    let (outcome, _, _) = run_upgrade(&test_config(&dir, "17"), host);

    let UpgradeOutcome::UpgradeAborted(err) = &outcome else {
        panic!("expected abort, got {outcome:?}");
    };
    assert_eq!(err.exit_code(), 13);
    assert_eq!(err.class(), ErrorClass::ConversionFailure);

    let mut live = fs::read_dir(&dir)
        .expect("read")
        .map(|entry| entry.expect("entry").file_name())
        .collect::<Vec<_>>();
    live.sort();
    assert_eq!(live, vec!["new", "old"]);
    assert_eq!(
        fs::read_to_string(dir.join("old").join("PG_VERSION")).expect("read"),
        "13\n"
    );

    // The live directory has no marker now; the next start must still refuse.
    let (retry, stages, host) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());
    assert_eq!(retry.exit_code(), 7);
    assert_eq!(
        stages,
        vec![
            UpgradeStage::Detecting,
            UpgradeStage::Preflighting,
            UpgradeStage::Aborted(7)
        ]
    );
    assert!(host.commands.is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn restart_after_interrupted_conversion_hits_preflight() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    fs::create_dir(dir.join("old")).expect("must create leftover");
    fs::create_dir(dir.join("new")).expect("must create leftover");

    let (outcome, _, _) = run_upgrade(&test_config(&dir, "17"), FakeHost::new());

    assert_eq!(outcome.exit_code(), 7);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn promotion_collision_is_fatal_without_rollback() {
    let dir = test_data_dir();
    seed_cluster(&dir, "13");
    let host = FakeHost {
        conversion_extra_entries: vec!["old"],
        ..FakeHost::new()
    };

    let (outcome, _, _) = run_upgrade(&test_config(&dir, "17"), host);

    let UpgradeOutcome::UpgradeAborted(err) = &outcome else {
        panic!("expected abort, got {outcome:?}");
    };
    assert_eq!(err.exit_code(), 14);
    assert!(err.to_string().starts_with("failed to promote converted data"));
    assert!(dir.join("old").join("PG_VERSION").exists());
    assert!(dir.join("new").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn copy_mode_omits_link_flag_and_passes_jobs() {
    let dir = test_data_dir();
    let layout = DataDirLayout::new(&dir);
    let plan = UpgradePlan {
        from: MajorVersion::new(14),
        to: MajorVersion::new(17),
        toolchain: ToolchainTable::builtin()
            .lookup(MajorVersion::new(14))
            .cloned()
            .expect("14 must be known"),
        target_bin_dir: PathBuf::from(TARGET_BIN_DIR),
        data_dir: dir.clone(),
        old_dir: layout.old_dir(),
        new_dir: layout.new_dir(),
        link_mode: false,
    };

    let command = build_upgrade_command(&plan, "admin", Some(4));
    let recorded = RecordedCommand::from_command(&command, None);
    assert_eq!(recorded.program, Path::new(TARGET_BIN_DIR).join("pg_upgrade"));
    assert_eq!(recorded.args[0], "--username=admin");
    assert!(!recorded.args.iter().any(|arg| arg == "--link"));
    assert!(recorded.args.iter().any(|arg| arg == "--jobs=4"));
    assert_eq!(recorded.cwd.as_deref(), Some(dir.as_path()));

    let linked = build_upgrade_command(
        &UpgradePlan {
            link_mode: true,
            ..plan
        },
        "admin",
        None,
    );
    let recorded = RecordedCommand::from_command(&linked, None);
    assert_eq!(recorded.args[1], "--link");
    assert!(!recorded.args.iter().any(|arg| arg.starts_with("--jobs")));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn initdb_and_probe_commands_use_expected_binaries() {
    let initdb = build_initdb_command(
        Path::new(TARGET_BIN_DIR),
        "dba",
        &CollationSetting::new("C.UTF-8"),
        Path::new("/data/new"),
    );
    let recorded = RecordedCommand::from_command(&initdb, None);
    assert_eq!(
        recorded.args,
        vec!["--username=dba", "--locale=C.UTF-8", "/data/new"]
    );

    let probe = build_probe_command(
        Path::new("/usr/local-pg9.6/bin/postgres"),
        Path::new("/data/old"),
    );
    let recorded = RecordedCommand::from_command(&probe, None);
    assert_eq!(recorded.tool(), "postgres");
    assert_eq!(recorded.flag_value("-D"), Some("/data/old"));
}

#[test]
fn parse_collation_reads_quoted_value() {
    let collation = parse_collation(PROBE_OUTPUT).expect("must parse");
    assert_eq!(collation.as_str(), "en_US.utf8");

    let posix = parse_collation("\t 1: datcollate = \"C\"\t(typeid = 19)\n").expect("must parse");
    assert_eq!(posix, CollationSetting::new("C"));
}

#[test]
fn parse_collation_rejects_missing_or_empty_values() {
    let header_only =
        "backend> \t 1: datcollate\t(typeid = 19, len = 64, typmod = -1, byval = f)\n\t----\n";
    assert!(parse_collation(header_only).is_err());
    assert!(parse_collation("").is_err());
    assert!(parse_collation("\t 1: datcollate = \"\"\t(typeid = 19)\n").is_err());
    assert!(parse_collation("\t 1: datcollate = \"en_US.utf8\n").is_err());
}

#[test]
fn plan_reports_preflight_conflict_read_only() {
    let dir = test_data_dir();
    seed_cluster(&dir, "15");
    fs::create_dir(dir.join("new")).expect("must create leftover");
    let before = snapshot(&dir);

    let err = plan_upgrade(&test_config(&dir, "17"), &ToolchainTable::builtin())
        .expect_err("leftover staging must block the plan");
    assert_eq!(err.exit_code(), 8);
    assert_eq!(snapshot(&dir), before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn plan_serializes_selected_toolchain() {
    let dir = test_data_dir();
    seed_cluster(&dir, "9.6");

    let decision = plan_upgrade(&test_config(&dir, "17"), &ToolchainTable::builtin())
        .expect("plan must succeed");
    let PlanDecision::Upgrade(plan) = decision else {
        panic!("expected an upgrade plan, got {decision:?}");
    };

    let json = serde_json::to_value(&plan).expect("plan must serialize");
    assert_eq!(json["from"], "9.6");
    assert_eq!(json["to"], "17");
    assert_eq!(json["toolchain"]["bin_dir"], "/usr/local-pg9.6/bin");
    assert_eq!(json["toolchain"]["policy"], "always");
    assert_eq!(json["link_mode"], true);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn carry_forward_skips_files_missing_from_old_cluster() {
    let dir = test_data_dir();
    let layout = DataDirLayout::new(&dir);
    fs::create_dir(layout.old_dir()).expect("must create old");
    fs::write(layout.old_dir().join("pg_hba.conf"), "custom\n").expect("write");
    fs::write(dir.join("pg_ident.conf"), "default\n").expect("write");

    let copied = carry_forward_files(
        &layout,
        &["pg_hba.conf".to_string(), "pg_ident.conf".to_string()],
    )
    .expect("must carry forward");

    assert_eq!(copied, vec!["pg_hba.conf"]);
    assert_eq!(
        fs::read_to_string(dir.join("pg_hba.conf")).expect("read"),
        "custom\n"
    );
    assert_eq!(
        fs::read_to_string(dir.join("pg_ident.conf")).expect("read"),
        "default\n"
    );
    assert!(layout.old_dir().join("pg_hba.conf").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn move_entries_refuses_to_overwrite() {
    let dir = test_data_dir();
    let src = dir.join("src");
    let dst = dir.join("dst");
    fs::create_dir_all(&src).expect("mkdir");
    fs::create_dir_all(&dst).expect("mkdir");
    fs::write(src.join("a"), "from src").expect("write");
    fs::write(dst.join("a"), "from dst").expect("write");

    let err = move_entries(&src, &dst, &[]).expect_err("collision must fail");
    assert!(
        err.to_string().contains("refusing to overwrite"),
        "unexpected error: {err}"
    );
    assert_eq!(fs::read_to_string(dst.join("a")).expect("read"), "from dst");
    assert_eq!(fs::read_to_string(src.join("a")).expect("read"), "from src");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn helper_scripts_are_removed_when_present() {
    let dir = test_data_dir();
    let layout = DataDirLayout::new(&dir);
    fs::write(dir.join("delete_old_cluster.sh"), "#!/bin/sh\n").expect("write");

    remove_helper_scripts(&layout).expect("must remove scripts");

    assert!(!dir.join("delete_old_cluster.sh").exists());
    assert!(!dir.join("analyze_new_cluster.sh").exists());

    let _ = fs::remove_dir_all(&dir);
}
