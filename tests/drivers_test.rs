use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use tracesweep::backup::DirectoryBackupStore;
use tracesweep::common::config::Settings;
use tracesweep::drivers::{
    default_registry, DefinitionFileDriver, FilesystemDriver, StartupItemDriver,
};
use tracesweep::engine::{
    DriverRegistry, ExecutionController, ExecutionPolicy, NullSink, Orchestrator, ResourceDriver,
    ResourceKind, RunConfig, RunMode, ScanFilter,
};

fn run_config(backups: &Path) -> RunConfig {
    RunConfig {
        dry_run: false,
        force: false,
        create_backup: true,
        disable: false,
        backup_directory: backups.to_path_buf(),
        verbose: false,
    }
}

fn single(driver: Arc<dyn ResourceDriver>, backups: &Path) -> Orchestrator {
    let mut registry = DriverRegistry::new();
    registry.register(driver).unwrap();
    Orchestrator::new(registry, Arc::new(DirectoryBackupStore::new(backups)))
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn scan_names(driver: &dyn ResourceDriver, pattern: &str) -> Vec<String> {
    let ctl = ExecutionController::new();
    let filter = ScanFilter::from_pattern(Some(pattern), false);
    driver
        .scan(&filter, &ctl)
        .unwrap()
        .map(|item| item.name)
        .collect()
}

// ─── Filesystem ──────────────────────────────────────────────────────────────

#[test]
fn test_filesystem_sweep_and_restore_directory() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("support");
    let backups = tmp.path().join("backups");
    write(&root.join("AcmeStudio/settings.json"), "{\"theme\":\"dark\"}");
    write(&root.join("AcmeStudio/cache/blob.bin"), "0123456789");
    write(&root.join("Photos/library.db"), "keep me");

    let driver = Arc::new(FilesystemDriver::new(vec![root.clone()], 3));
    let orch = single(driver.clone(), &backups);

    let report = orch
        .run(
            RunMode::AppSweep {
                app_name: "Acme Studio".into(),
            },
            run_config(&backups),
            &NullSink,
        )
        .unwrap();
    assert_eq!(report.stats.items_cleaned, 1);
    assert!(report.stats.bytes_reclaimed > 0);
    assert!(!root.join("AcmeStudio").exists());
    assert!(root.join("Photos/library.db").exists());
    assert!(scan_names(driver.as_ref(), "acme").is_empty());

    let restore = orch
        .restore(report.backup_session.as_deref().unwrap(), None)
        .unwrap();
    assert_eq!(restore.restored, 1);
    assert_eq!(
        std::fs::read_to_string(root.join("AcmeStudio/settings.json")).unwrap(),
        "{\"theme\":\"dark\"}"
    );
    assert_eq!(
        std::fs::read_to_string(root.join("AcmeStudio/cache/blob.bin")).unwrap(),
        "0123456789"
    );
    assert_eq!(scan_names(driver.as_ref(), "acme"), vec!["AcmeStudio"]);
}

#[test]
fn test_filesystem_remove_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("cache");
    write(&root.join("acme.log"), "log line");

    let driver = FilesystemDriver::new(vec![root.clone()], 2);
    let ctl = ExecutionController::new();
    let filter = ScanFilter::from_pattern(Some("acme"), false);
    let item = driver.scan(&filter, &ctl).unwrap().next().unwrap();

    let first = driver.remove(&item);
    assert!(first.success);
    assert_eq!(first.bytes_freed, 8);

    let second = driver.remove(&item);
    assert!(second.success);
    assert_eq!(second.message, "already removed");
    assert_eq!(second.bytes_freed, 0);
}

#[test]
fn test_filesystem_dry_run_leaves_files() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("cache");
    let backups = tmp.path().join("backups");
    write(&root.join("acme/cache.bin"), "bytes");

    let orch = single(Arc::new(FilesystemDriver::new(vec![root.clone()], 2)), &backups);
    let mut config = run_config(&backups);
    config.dry_run = true;

    let report = orch
        .run(
            RunMode::SingleKind {
                driver: "filesystem".into(),
                pattern: Some("acme".into()),
            },
            config,
            &NullSink,
        )
        .unwrap();
    assert_eq!(report.stats.items_cleaned, 1);
    assert!(root.join("acme/cache.bin").exists());
    assert!(!backups.exists());
}

// ─── Definition files ────────────────────────────────────────────────────────

#[test]
fn test_service_definition_sweep_and_restore() {
    let tmp = TempDir::new().unwrap();
    let units = tmp.path().join("systemd");
    let backups = tmp.path().join("backups");
    let unit =
        "[Unit]\nDescription=Acme background agent\n\n[Service]\nExecStart=/opt/acme/agent\n";
    write(&units.join("acme-agent.service"), unit);
    write(&units.join("sshd.service"), "[Unit]\nDescription=OpenSSH server\n");
    write(&units.join("notes.txt"), "not a unit");

    let driver = Arc::new(DefinitionFileDriver::services(vec![units.clone()]));
    let orch = single(driver.clone(), &backups);

    // "background agent" only appears in the description
    let report = orch
        .run(
            RunMode::SingleKind {
                driver: "services".into(),
                pattern: Some("background agent".into()),
            },
            run_config(&backups),
            &NullSink,
        )
        .unwrap();
    assert_eq!(report.stats.items_cleaned, 1);
    assert!(!units.join("acme-agent.service").exists());
    assert!(units.join("sshd.service").exists());

    let restore = orch
        .restore(report.backup_session.as_deref().unwrap(), None)
        .unwrap();
    assert_eq!(restore.restored, 1);
    assert_eq!(
        std::fs::read_to_string(units.join("acme-agent.service")).unwrap(),
        unit
    );
}

#[cfg(unix)]
#[test]
fn test_symlinked_units_restore_as_links() {
    let tmp = TempDir::new().unwrap();
    let units = tmp.path().join("systemd");
    let vendor = tmp.path().join("opt/acme/acme-sync.service");
    let backups = tmp.path().join("backups");
    write(&vendor, "[Unit]\nDescription=Acme sync\n");
    std::fs::create_dir_all(&units).unwrap();
    std::os::unix::fs::symlink("/dev/null", units.join("acme-agent.service")).unwrap();
    std::os::unix::fs::symlink(&vendor, units.join("acme-sync.service")).unwrap();

    let orch = single(
        Arc::new(DefinitionFileDriver::services(vec![units.clone()])),
        &backups,
    );
    let mode = RunMode::SingleKind {
        driver: "services".into(),
        pattern: Some("acme".into()),
    };
    let report = orch.run(mode, run_config(&backups), &NullSink).unwrap();
    assert_eq!(report.stats.items_cleaned, 2);
    assert!(std::fs::symlink_metadata(units.join("acme-agent.service")).is_err());
    // Removing the link never touches what it points at
    assert!(vendor.exists());

    let restore = orch
        .restore(report.backup_session.as_deref().unwrap(), None)
        .unwrap();
    assert_eq!(restore.restored, 2);
    for (unit, target) in [
        ("acme-agent.service", Path::new("/dev/null")),
        ("acme-sync.service", vendor.as_path()),
    ] {
        let path = units.join(unit);
        assert!(std::fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&path).unwrap(), target);
    }
}

#[test]
fn test_disable_parks_units_and_restore_reenables() {
    let tmp = TempDir::new().unwrap();
    let units = tmp.path().join("systemd");
    let agents = tmp.path().join("LaunchAgents");
    let backups = tmp.path().join("backups");
    let unit = "[Unit]\nDescription=Acme background agent\n";
    write(&units.join("acme-agent.service"), unit);
    let plist = write_agent(&agents, "com.acme.helper", "/opt/acme/helper");

    let mut registry = DriverRegistry::new();
    registry
        .register(Arc::new(DefinitionFileDriver::services(vec![units.clone()])))
        .unwrap();
    registry
        .register(Arc::new(StartupItemDriver::new(vec![agents.clone()])))
        .unwrap();
    let orch = Orchestrator::new(registry, Arc::new(DirectoryBackupStore::new(&backups)));

    let mut config = run_config(&backups);
    config.disable = true;
    let mode = RunMode::Full {
        pattern: Some("acme".into()),
        policy: ExecutionPolicy::Sequential,
    };

    let mut dry = config.clone();
    dry.dry_run = true;
    let preview = orch.run(mode.clone(), dry, &NullSink).unwrap();
    assert_eq!(preview.stats.items_disabled, 2);
    assert!(units.join("acme-agent.service").exists());

    let report = orch.run(mode, config, &NullSink).unwrap();
    assert_eq!(report.stats.items_cleaned, 2);
    assert_eq!(report.stats.items_disabled, 2);
    assert_eq!(report.stats.bytes_reclaimed, 0);
    assert!(!units.join("acme-agent.service").exists());
    assert!(units.join("acme-agent.service.disabled").exists());
    assert!(plist.exists());
    let disabled = plist::Value::from_file(&plist).unwrap();
    assert_eq!(
        disabled.as_dictionary().unwrap().get("Disabled").and_then(|v| v.as_boolean()),
        Some(true)
    );

    let restore = orch
        .restore(report.backup_session.as_deref().unwrap(), None)
        .unwrap();
    assert_eq!(restore.restored, 2, "{:?}", restore.results);
    assert_eq!(std::fs::read_to_string(units.join("acme-agent.service")).unwrap(), unit);
    assert!(!units.join("acme-agent.service.disabled").exists());
    let enabled = plist::Value::from_file(&plist).unwrap();
    assert!(enabled.as_dictionary().unwrap().get("Disabled").is_none());
}

#[test]
fn test_protected_service_needs_force() {
    let tmp = TempDir::new().unwrap();
    let units = tmp.path().join("systemd");
    let backups = tmp.path().join("backups");
    write(&units.join("sshd.service"), "[Unit]\nDescription=OpenSSH server\n");

    let orch = single(
        Arc::new(DefinitionFileDriver::services(vec![units.clone()])),
        &backups,
    );
    let mode = RunMode::SingleKind {
        driver: "services".into(),
        pattern: Some("sshd".into()),
    };

    let report = orch.run(mode.clone(), run_config(&backups), &NullSink).unwrap();
    assert_eq!(report.stats.items_skipped, 1);
    assert!(units.join("sshd.service").exists());

    let mut forced = run_config(&backups);
    forced.force = true;
    let report = orch.run(mode, forced, &NullSink).unwrap();
    assert_eq!(report.stats.items_cleaned, 1);
    assert!(!units.join("sshd.service").exists());
}

#[test]
fn test_missing_definition_dirs_mean_nothing_installed() {
    let driver = DefinitionFileDriver::network(vec![PathBuf::from("/nonexistent/tracesweep/nm")]);
    assert!(scan_names(&driver, "acme").is_empty());
}

// ─── Startup items ───────────────────────────────────────────────────────────

fn write_agent(dir: &Path, label: &str, program: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let mut dict = plist::Dictionary::new();
    dict.insert("Label".into(), plist::Value::String(label.into()));
    dict.insert("Program".into(), plist::Value::String(program.into()));
    dict.insert("RunAtLoad".into(), plist::Value::Boolean(true));
    let path = dir.join(format!("{}.plist", label));
    plist::Value::Dictionary(dict).to_file_xml(&path).unwrap();
    path
}

#[test]
fn test_startup_item_sweep_and_restore() {
    let tmp = TempDir::new().unwrap();
    let agents = tmp.path().join("LaunchAgents");
    let backups = tmp.path().join("backups");
    let acme = write_agent(&agents, "com.acmestudio.helper", "/Applications/AcmeStudio.app/helper");
    let apple = write_agent(&agents, "com.apple.acmestudio-lookalike", "/usr/libexec/thing");
    let original = std::fs::read(&acme).unwrap();

    let orch = single(
        Arc::new(StartupItemDriver::new(vec![agents.clone()])),
        &backups,
    );
    let report = orch
        .run(
            RunMode::AppSweep {
                app_name: "AcmeStudio".into(),
            },
            run_config(&backups),
            &NullSink,
        )
        .unwrap();

    assert_eq!(report.stats.items_cleaned, 1);
    assert_eq!(report.stats.items_skipped, 1);
    assert!(!acme.exists());
    assert!(apple.exists());

    let restore = orch
        .restore(report.backup_session.as_deref().unwrap(), None)
        .unwrap();
    assert_eq!(restore.restored, 1);
    assert_eq!(std::fs::read(&acme).unwrap(), original);
}

// ─── Default registry ────────────────────────────────────────────────────────

#[test]
fn test_default_registry_full_sweep_and_restore() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path();
    let settings = Settings {
        backup_dir: base.join("backups"),
        filesystem_roots: vec![base.join("support")],
        startup_dirs: vec![base.join("agents")],
        service_dirs: vec![base.join("units")],
        task_dirs: vec![base.join("timers")],
        module_dirs: vec![base.join("modules")],
        network_dirs: vec![base.join("nm")],
        config_dirs: vec![base.join("prefs")],
        ..Settings::default()
    };

    let files = [
        base.join("support/acme-data/state.json"),
        base.join("units/acme.service"),
        base.join("timers/acme-refresh.timer"),
        base.join("modules/acme.conf"),
        base.join("nm/acme-vpn.nmconnection"),
        base.join("prefs/com.acme.app.plist"),
    ];
    for file in &files {
        write(file, "acme");
    }
    write_agent(&base.join("agents"), "com.acme.agent", "/opt/acme/agent");

    let orch = Orchestrator::from_settings(default_registry(&settings).unwrap(), &settings);
    let mode = RunMode::Full {
        pattern: Some("acme".into()),
        policy: ExecutionPolicy::Parallel,
    };
    let report = orch.run(mode, RunConfig::from_settings(&settings), &NullSink).unwrap();

    assert_eq!(report.stats.errors, 0);
    assert_eq!(report.stats.items_cleaned, 7);
    assert_eq!(report.stats.per_module.len(), ResourceKind::ALL.len());
    for file in &files {
        assert!(!file.exists(), "{} should be gone", file.display());
    }

    let restore = orch
        .restore(report.backup_session.as_deref().unwrap(), None)
        .unwrap();
    assert_eq!(restore.restored, 7);
    assert_eq!(restore.failed, 0);
    for file in &files[1..] {
        assert_eq!(std::fs::read_to_string(file).unwrap(), "acme");
    }
    assert!(base.join("support/acme-data/state.json").exists());
    assert!(base.join("agents/com.acme.agent.plist").exists());
}
