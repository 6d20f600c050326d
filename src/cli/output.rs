use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::backup::{BackupSession, SessionSummary};
use crate::common::format::{
    format_count, format_duration, format_location, format_size, format_size_colored, truncate,
};
use crate::engine::{
    CleanAction, CleanResult, DriverRegistry, ModuleState, RestoreReport, RunReport, RunState,
    ScanResult,
};

/// Spinner shown while a run executes
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn rule() {
    println!("{}", "─".repeat(60).dimmed());
}

/// Print discovered items grouped by module
pub fn print_scan_results(report: &RunReport, items: &[(String, ScanResult)], detailed: bool) {
    println!();
    println!("{}  TraceSweep Scan", "🔍");
    rule();
    println!(
        "  Scanned in {}  •  {}  •  {} reclaimable",
        format_duration(report.stats.duration_secs()).cyan(),
        format_count(report.stats.items_scanned, "item"),
        format_size_colored(items.iter().map(|(_, i)| i.size_bytes).sum()),
    );
    rule();
    println!();

    if items.is_empty() {
        println!("  {} Nothing found.", "✨");
        println!();
        return;
    }

    for (module, stats) in &report.stats.per_module {
        if stats.scanned == 0 && stats.failure.is_none() {
            continue;
        }
        println!(
            "  {} {} ({})",
            "●".cyan(),
            module.bold(),
            format_count(stats.scanned, "item")
        );
        if let Some(reason) = &stats.failure {
            println!("    {} {}", "✗".red(), reason.red());
        }

        let module_items: Vec<&ScanResult> = items
            .iter()
            .filter(|(m, _)| m == module)
            .map(|(_, i)| i)
            .collect();
        let shown = if detailed { module_items.len() } else { 10 };
        for item in module_items.iter().take(shown) {
            print_scan_item(item);
        }
        if module_items.len() > shown {
            println!(
                "    {} ... and {} more (use --detailed)",
                "→".dimmed(),
                module_items.len() - shown
            );
        }
        println!();
    }
}

fn print_scan_item(item: &ScanResult) {
    let size = if item.size_bytes > 0 {
        format!("{:>10}", format_size(item.size_bytes))
    } else {
        " ".repeat(10)
    };
    println!(
        "    {}  {:<32} {}",
        size.dimmed(),
        truncate(&item.name, 32),
        truncate(&format_location(&item.location), 60).dimmed()
    );
}

/// Print per-item outcomes and the final statistics of a destructive run
pub fn print_run_report(report: &RunReport, results: &[(String, CleanResult)], detailed: bool) {
    println!();
    let title = if report.dry_run {
        "TraceSweep Dry Run"
    } else {
        "TraceSweep Sweep"
    };
    println!("{}  {} ({})", "🧹", title, report.mode);
    rule();

    for (module, result) in results {
        if !detailed && result.success && !result.simulated && results.len() > 20 {
            continue;
        }
        print_clean_result(module, result);
    }
    if !results.is_empty() {
        rule();
    }

    let stats = &report.stats;
    let verb = if report.dry_run { "Would remove" } else { "Removed" };
    println!(
        "  {} {}: {}  •  {}",
        "✓".green(),
        verb,
        format_count(stats.items_cleaned, "item"),
        format_size_colored(stats.bytes_reclaimed)
    );
    if stats.items_disabled > 0 {
        let verb = if report.dry_run { "Would disable" } else { "Disabled" };
        println!(
            "  {} {} (of those): {}",
            "⏸".cyan(),
            verb,
            format_count(stats.items_disabled, "item")
        );
    }
    if stats.items_skipped > 0 {
        println!(
            "  {} Skipped: {}",
            "●".yellow(),
            format_count(stats.items_skipped, "item")
        );
    }
    if stats.errors > 0 {
        println!("  {} Errors: {}", "✗".red(), stats.errors.to_string().red());
    }
    for (module, m) in &stats.per_module {
        if m.state == ModuleState::Failed {
            println!(
                "  {} {} failed: {}",
                "✗".red(),
                module,
                m.failure.as_deref().unwrap_or("unknown error")
            );
        }
    }
    if report.state == RunState::Cancelled {
        println!("  {} Run was cancelled before completion", "⚠".yellow());
    }
    if let Some(reason) = &report.seal_error {
        println!(
            "  {} Backup session was not sealed ({}); restore still replays its journal",
            "⚠".yellow(),
            reason
        );
    }
    if let Some(session) = &report.backup_session {
        println!("  {} Backup session: {}", "💾", session.cyan());
        println!(
            "    Undo with: {}",
            format!("tracesweep restore {}", session).dimmed()
        );
    }
    println!(
        "  {} Finished in {}",
        "⏱".dimmed(),
        format_duration(stats.duration_secs())
    );
    println!();
}

fn print_clean_result(module: &str, result: &CleanResult) {
    let marker = match (result.action, result.success) {
        (CleanAction::Skip, _) => "–".yellow(),
        (_, true) if result.simulated => "~".cyan(),
        (_, true) => "✓".green(),
        (_, false) => "✗".red(),
    };
    let message = if result.success {
        result.message.dimmed()
    } else {
        result.message.red()
    };
    println!(
        "  {} {:<16} {:<44} {}",
        marker,
        module.dimmed(),
        truncate(&format_location(&result.target), 44),
        message
    );
}

pub fn print_restore_report(report: &RestoreReport) {
    println!();
    println!("{}  Restore: {}", "↩", report.session_id.cyan());
    rule();
    if !report.sealed {
        println!(
            "  {} Session was never sealed; restoring from its journal",
            "⚠".yellow()
        );
    }
    for result in &report.results {
        let marker = if result.success { "✓".green() } else { "✗".red() };
        println!(
            "  {} {:<50} {}",
            marker,
            truncate(&format_location(&result.target), 50),
            result.message.dimmed()
        );
    }
    rule();
    println!(
        "  {} restored  •  {} failed",
        report.restored.to_string().green(),
        if report.failed > 0 {
            report.failed.to_string().red()
        } else {
            report.failed.to_string().normal()
        }
    );
    println!();
}

pub fn print_sessions(sessions: &[SessionSummary]) {
    println!();
    if sessions.is_empty() {
        println!("  No backup sessions found.");
        println!();
        return;
    }

    println!(
        "  {:<36} {:<20} {:>7} {:>10}  {}",
        "SESSION".bold(),
        "CREATED".bold(),
        "ITEMS".bold(),
        "PAYLOAD".bold(),
        "KINDS".bold()
    );
    for s in sessions {
        let kinds: Vec<&str> = s.kinds.iter().map(|k| k.as_str()).collect();
        let id = if s.sealed {
            s.session_id.normal()
        } else {
            format!("{} (unsealed)", s.session_id).yellow()
        };
        println!(
            "  {:<36} {:<20} {:>7} {:>10}  {}",
            id,
            s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            s.entry_count,
            format_size(s.payload_bytes),
            kinds.join(", ").dimmed()
        );
    }
    println!();
}

pub fn print_session(session: &BackupSession) {
    println!();
    println!("{}  Backup session {}", "💾", session.session_id.cyan());
    rule();
    if let Some(name) = &session.name {
        println!("  Name:     {}", name);
    }
    println!(
        "  Created:  {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    match session.sealed_at {
        Some(at) => println!("  Sealed:   {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Sealed:   {}", "no (journal only)".yellow()),
    }
    println!("  Entries:  {}", session.entries.len());
    rule();
    for entry in &session.entries {
        let payload = entry
            .payload
            .as_ref()
            .map(|p| format_size(p.size))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>4}  {:<16} {:<44} {:>10}",
            entry.index,
            entry.resource_kind.as_str().dimmed(),
            truncate(&format_location(&entry.identity.location), 44),
            payload
        );
    }
    println!();
}

pub fn print_drivers(registry: &DriverRegistry) {
    println!();
    println!("  {:<18} {:<18} {}", "DRIVER".bold(), "KIND".bold(), "RESTORE".bold());
    for driver in registry.all() {
        let restore = if driver.supports_restore() {
            "yes".green()
        } else {
            "no".dimmed()
        };
        println!("  {:<18} {:<18} {}", driver.name(), driver.kind().as_str(), restore);
    }
    println!();
}
