use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use tracesweep::backup::BackupStore;
use tracesweep::cli::args::{
    Cli, Commands, CompletionShell, ConfigAction, OutputFormat, SessionsAction,
};
use tracesweep::cli::output;
use tracesweep::common::config::Settings;
use tracesweep::common::format;
use tracesweep::drivers::default_registry;
use tracesweep::engine::{
    CleanResult, ExecutionPolicy, Orchestrator, ResourceKind, RunConfig, RunEvent, RunMode,
    ScanResult,
};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let _log_guard = init_logging(cli.verbose, cli.quiet);

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(dir) = &cli.backup_dir {
        settings.backup_dir = dir.clone();
    }

    let ok = match &cli.command {
        Commands::Run {
            pattern,
            parallel,
            sequential,
        } => {
            let policy = if *sequential || (!parallel && !settings.parallel) {
                ExecutionPolicy::Sequential
            } else {
                ExecutionPolicy::Parallel
            };
            let mode = RunMode::Full {
                pattern: pattern.clone(),
                policy,
            };
            cmd_sweep(&cli, &settings, mode)?
        }

        Commands::Kind { kind, pattern } => {
            let mode = RunMode::SingleKind {
                driver: kind.clone(),
                pattern: pattern.clone(),
            };
            cmd_sweep(&cli, &settings, mode)?
        }

        Commands::App { name } => {
            let mode = RunMode::AppSweep {
                app_name: name.clone(),
            };
            cmd_sweep(&cli, &settings, mode)?
        }

        Commands::Scan { pattern, detailed } => {
            cmd_scan(&cli, &settings, pattern.clone(), *detailed)?
        }

        Commands::Restore {
            session,
            last,
            kind,
        } => cmd_restore(&cli, &settings, session.clone(), *last, kind.as_deref())?,

        Commands::Sessions { action } => cmd_sessions(&cli, &settings, action)?,

        Commands::Config { action } => cmd_config(&cli, &settings, action)?,

        Commands::Drivers => cmd_drivers(&cli, &settings)?,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                CompletionShell::Bash => clap_complete::Shell::Bash,
                CompletionShell::Zsh => clap_complete::Shell::Zsh,
                CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "tracesweep", &mut std::io::stdout());
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// stderr logging for the user, plus a daily log file under
/// `~/.tracesweep/logs` when that directory is writable
fn init_logging(verbose: bool, quiet: bool) -> Option<WorkerGuard> {
    let default_level = if verbose {
        "tracesweep=debug"
    } else if quiet {
        "tracesweep=error"
    } else {
        "tracesweep=warn"
    };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let logs_dir = Settings::logs_dir();
    let appender = std::fs::create_dir_all(&logs_dir).ok().and_then(|_| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("tracesweep")
            .filename_suffix("log")
            .build(&logs_dir)
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("tracesweep=info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    guard
}

fn run_config(cli: &Cli, settings: &Settings) -> RunConfig {
    let mut config = RunConfig::from_settings(settings);
    config.dry_run = cli.dry_run;
    config.force = cli.force;
    config.disable = cli.disable;
    config.create_backup = settings.create_backup && !cli.no_backup;
    config.verbose = cli.verbose;
    config
}

fn build_orchestrator(settings: &Settings) -> Result<Orchestrator> {
    let registry = default_registry(settings)?;
    Ok(Orchestrator::from_settings(registry, settings))
}

fn confirm(question: &str) -> Result<bool> {
    print!("\n  {} {} [y/N] ", "❓", question);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim().eq_ignore_ascii_case("y") {
        Ok(true)
    } else {
        println!("  {} Cancelled", "✗".red());
        Ok(false)
    }
}

fn describe_mode(mode: &RunMode) -> String {
    match mode {
        RunMode::Full { pattern, .. } => match pattern {
            Some(p) => format!("every resource kind matching '{}'", p),
            None => "every resource kind".to_string(),
        },
        RunMode::SingleKind { driver, pattern } => match pattern {
            Some(p) => format!("{} matching '{}'", driver, p),
            None => driver.clone(),
        },
        RunMode::AppSweep { app_name } => format!("every trace of '{}'", app_name.trim()),
        RunMode::ScanOnly { .. } => "nothing".to_string(),
    }
}

// ─── Sweep ────────────────────────────────────────────────────────────────────

fn cmd_sweep(cli: &Cli, settings: &Settings, mode: RunMode) -> Result<bool> {
    let orchestrator = build_orchestrator(settings)?;
    let config = run_config(cli, settings);
    let human = cli.format == OutputFormat::Human;

    let ask = !config.dry_run && !cli.yes;
    let backup_note = if config.backups_active() {
        format!("backed up to {}", config.backup_directory.display())
    } else {
        "NOT backed up".to_string()
    };
    let verb = if config.disable {
        "Disable or remove"
    } else {
        "Remove"
    };
    let question = format!("{} {} ({})?", verb, describe_mode(&mode), backup_note);

    let run = orchestrator.prepare(mode, config)?;
    if ask && !confirm(&question)? {
        return Ok(true);
    }

    let spinner = (human && !cli.quiet).then(|| output::spinner("Sweeping..."));
    let results: Mutex<Vec<(String, CleanResult)>> = Mutex::new(Vec::new());

    let sink = |event: &RunEvent| match event {
        RunEvent::ItemScanned { module, item } => {
            if let Some(pb) = &spinner {
                pb.set_message(format!("{}: {}", module, format::truncate(&item.name, 40)));
            }
        }
        RunEvent::ItemCleaned { module, result } => {
            if let Ok(mut results) = results.lock() {
                results.push((module.clone(), result.clone()));
            }
        }
        _ => {}
    };
    let report = run.execute(&sink)?;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let results = results.into_inner().unwrap_or_else(|e| e.into_inner());

    match cli.format {
        OutputFormat::Human if cli.quiet => println!(
            "{}  {}  {}",
            format::format_size(report.stats.bytes_reclaimed),
            report.stats.items_cleaned,
            report.backup_session.as_deref().unwrap_or("none")
        ),
        OutputFormat::Human => output::print_run_report(&report, &results, cli.verbose),
        OutputFormat::Json => {
            let results: Vec<_> = results
                .iter()
                .map(|(module, result)| serde_json::json!({ "module": module, "result": result }))
                .collect();
            output::print_json(&serde_json::json!({ "report": report, "results": results }))?;
        }
    }

    Ok(report.is_success())
}

// ─── Scan ─────────────────────────────────────────────────────────────────────

fn cmd_scan(
    cli: &Cli,
    settings: &Settings,
    pattern: Option<String>,
    detailed: bool,
) -> Result<bool> {
    let orchestrator = build_orchestrator(settings)?;
    let run = orchestrator.prepare(RunMode::ScanOnly { pattern }, run_config(cli, settings))?;

    let human = cli.format == OutputFormat::Human;
    let spinner = (human && !cli.quiet).then(|| output::spinner("Scanning..."));
    let items: Mutex<Vec<(String, ScanResult)>> = Mutex::new(Vec::new());

    let sink = |event: &RunEvent| {
        if let RunEvent::ItemScanned { module, item } = event {
            if let Some(pb) = &spinner {
                pb.set_message(format!("{}: {}", module, format::truncate(&item.name, 40)));
            }
            if let Ok(mut items) = items.lock() {
                items.push((module.clone(), item.clone()));
            }
        }
    };
    let report = run.execute(&sink)?;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let items = items.into_inner().unwrap_or_else(|e| e.into_inner());

    match cli.format {
        OutputFormat::Human if cli.quiet => {
            for (module, item) in &items {
                println!("{}  {}", module, item.location);
            }
        }
        OutputFormat::Human => output::print_scan_results(&report, &items, detailed),
        OutputFormat::Json => {
            let items: Vec<_> = items
                .iter()
                .map(|(module, item)| serde_json::json!({ "module": module, "item": item }))
                .collect();
            output::print_json(&serde_json::json!({ "report": report, "items": items }))?;
        }
    }

    Ok(report.is_success())
}

// ─── Restore ──────────────────────────────────────────────────────────────────

fn cmd_restore(
    cli: &Cli,
    settings: &Settings,
    session: Option<String>,
    last: bool,
    kind: Option<&str>,
) -> Result<bool> {
    let orchestrator = build_orchestrator(settings)?;

    let session_id = if last {
        orchestrator
            .store()
            .list_sessions()?
            .into_iter()
            .next()
            .map(|s| s.session_id)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No backup sessions found in {}",
                    settings.backup_dir.display()
                )
            })?
    } else if let Some(id) = session {
        id
    } else {
        anyhow::bail!("Specify a session ID or --last (see `tracesweep sessions list`)");
    };

    let kind = kind
        .map(|k| k.parse::<ResourceKind>())
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let report = orchestrator.restore(&session_id, kind)?;

    match cli.format {
        OutputFormat::Human if cli.quiet => {
            println!("{}  {}  {}", report.session_id, report.restored, report.failed)
        }
        OutputFormat::Human => output::print_restore_report(&report),
        OutputFormat::Json => output::print_json(&report)?,
    }

    Ok(report.failed == 0)
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

fn cmd_sessions(cli: &Cli, settings: &Settings, action: &SessionsAction) -> Result<bool> {
    let store = tracesweep::backup::DirectoryBackupStore::new(&settings.backup_dir);

    match action {
        SessionsAction::List => {
            let sessions = store.list_sessions()?;
            match cli.format {
                OutputFormat::Human => output::print_sessions(&sessions),
                OutputFormat::Json => output::print_json(&sessions)?,
            }
        }
        SessionsAction::Show { session } => {
            let session = store.load(session)?;
            match cli.format {
                OutputFormat::Human => output::print_session(&session),
                OutputFormat::Json => output::print_json(&session)?,
            }
        }
        SessionsAction::Delete { session } => {
            if !cli.yes
                && !confirm(&format!("Permanently delete backup session '{}'?", session))?
            {
                return Ok(true);
            }
            store.delete_session(session)?;
            if !cli.quiet {
                println!("  {} Deleted session {}", "✓".green(), session);
            }
        }
    }
    Ok(true)
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(cli: &Cli, settings: &Settings, action: &ConfigAction) -> Result<bool> {
    let path: PathBuf = cli.config.clone().unwrap_or_else(Settings::config_path);

    match action {
        ConfigAction::Init => {
            settings.init_dirs()?;
            if path.exists() {
                println!("  {} Config already exists: {}", "ℹ".cyan(), path.display());
            } else {
                settings.save_to(&path)?;
                println!("  {} TraceSweep initialized", "✓".green());
                println!("  Created: {}", path.display());
            }
            println!("  Backups: {}", settings.backup_dir.display());
        }
        ConfigAction::Show => match cli.format {
            OutputFormat::Human => println!(
                "{}",
                toml::to_string_pretty(settings).context("Failed to render config")?
            ),
            OutputFormat::Json => output::print_json(settings)?,
        },
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(true)
}

// ─── Drivers ──────────────────────────────────────────────────────────────────

fn cmd_drivers(cli: &Cli, settings: &Settings) -> Result<bool> {
    let registry = default_registry(settings)?;
    match cli.format {
        OutputFormat::Human => output::print_drivers(&registry),
        OutputFormat::Json => {
            let drivers: Vec<_> = registry
                .all()
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name(),
                        "kind": d.kind(),
                        "supports_restore": d.supports_restore(),
                    })
                })
                .collect();
            output::print_json(&drivers)?;
        }
    }
    Ok(true)
}
