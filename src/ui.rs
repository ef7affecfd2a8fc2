//! Terminal rendering for the CLI.

use crate::models::{
    HashLookup, HistoryStats, QuarantineListing, ScanResult, Severity, SignatureRecord,
};
use crate::scanner::ScanSummary;
use crate::utils::{format_file_size, short_hash, truncate_path};
use console::{style, StyledObject, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar for batch scans; hidden when quiet or not a terminal
pub fn scan_progress(quiet: bool) -> ProgressBar {
    if quiet || !Term::stderr().is_term() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(0);
    match ProgressStyle::with_template(
        "{prefix} {spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    ) {
        Ok(template) => bar.set_style(template.progress_chars("█▉▊▋▌▍▎▏  ")),
        Err(e) => log::debug!("Progress template rejected: {}", e),
    }
    bar.set_prefix(style("🔍 SCAN").green().bold().to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn severity_style(severity: Severity) -> StyledObject<&'static str> {
    let label = severity.as_str();
    match severity {
        Severity::Critical => style(label).red().bold(),
        Severity::High => style(label).red(),
        Severity::Medium => style(label).yellow(),
        Severity::Low => style(label).cyan(),
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", style("✔").green().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("✖").red().bold(), message);
}

/// One line per result. Skipped files only show with `verbose`.
pub fn print_result(result: &ScanResult, verbose: bool) {
    let path = truncate_path(&result.artifact_path, 70);
    if result.detected {
        println!(
            "🚨 {} {} [{}] {}",
            style("MALWARE").red().bold(),
            style(path).white().bold(),
            severity_style(result.severity.unwrap_or_default()),
            style(result.malware_name.as_deref().unwrap_or("unknown")).yellow()
        );
    } else if result.reason.is_error() {
        println!("{} {} ({})", style("ERROR").red(), path, style(&result.reason).dim());
    } else if verbose {
        println!("{} {} ({})", style("ok").green(), style(path).dim(), result.reason);
    }
}

pub fn print_summary(summary: &ScanSummary, elapsed: Duration) {
    println!();
    println!("{}", style("╔══════════════════════════════════════════════════════════════╗").cyan());
    println!("{}", style("║                         SCAN RESULTS                         ║").cyan().bold());
    println!("{}", style("╚══════════════════════════════════════════════════════════════╝").cyan());
    println!();
    println!("   {} Files scanned:   {}", style("📁").blue(), style(summary.total).white().bold());
    println!("   {} Clean:           {}", style("✅").green(), style(summary.clean).green());
    println!("   {} Skipped:         {}", style("⏭").dim(), summary.skipped);
    println!("   {} Errors:          {}", style("⚠").yellow(), summary.errors);
    println!("   {} From archives:   {}", style("📦").blue(), summary.from_archives);
    println!(
        "   {} Data analyzed:   {}",
        style("💾").blue(),
        style(format_file_size(summary.total_bytes)).white().bold()
    );
    println!(
        "   {} Threats:         {}",
        style("🚨").red(),
        style(summary.detected).red().bold()
    );
    println!(
        "   {} Duration:        {:.2}s",
        style("⏱").blue(),
        style(elapsed.as_secs_f64()).white().bold()
    );
    println!();
}

pub fn print_hash_lookup(lookup: &HashLookup) {
    if lookup.detected {
        println!(
            "🚨 {} {} [{}]",
            style(&lookup.hash).white().bold(),
            style(lookup.malware_name.as_deref().unwrap_or("unknown")).yellow(),
            severity_style(lookup.severity.unwrap_or_default())
        );
    } else {
        println!("{} {} not in the signature database", style("ok").green(), lookup.hash);
    }
}

pub fn print_signatures(records: &[SignatureRecord]) {
    if records.is_empty() {
        println!("{}", style("No signatures").dim());
        return;
    }
    println!(
        "{}",
        style(format!("{:<18} {:<32} {:<9} {:<10} {}", "HASH", "NAME", "SEVERITY", "SOURCE", "ADDED")).bold()
    );
    for record in records {
        println!(
            "{:<18} {:<32} {:<9} {:<10} {}",
            format!("{}…", short_hash(&record.hash, 16)),
            truncate_path(&record.name, 32),
            severity_style(record.severity),
            record.source,
            style(&record.added_on).dim()
        );
    }
    println!("{}", style(format!("{} shown", records.len())).dim());
}

pub fn print_history(results: &[ScanResult]) {
    if results.is_empty() {
        println!("{}", style("No scan history").dim());
        return;
    }
    for result in results {
        let marker = if result.detected {
            style("DETECTED").red().bold()
        } else {
            style("        ").dim()
        };
        println!(
            "{} {} {} {}",
            style(result.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            marker,
            truncate_path(&result.artifact_path, 60),
            style(&result.reason).dim()
        );
    }
}

pub fn print_stats(stats: &HistoryStats, signature_count: usize, quarantined: usize) {
    println!("{}", style("MalGuard statistics").cyan().bold());
    println!("   Signatures:      {}", style(signature_count).white().bold());
    println!("   Quarantined:     {}", quarantined);
    println!("   Total scans:     {}", stats.total_scans);
    println!("   Detections:      {}", style(stats.detections).red().bold());
    println!("   Clean:           {}", stats.clean);
    println!("   Skipped:         {}", stats.skipped);
    println!("   Errors:          {}", stats.errors);
    println!("   Detection rate:  {:.2}%", stats.detection_rate());
}

pub fn print_quarantine(entries: &[QuarantineListing]) {
    if entries.is_empty() {
        println!("{}", style("Quarantine is empty").dim());
        return;
    }
    for listing in entries {
        let entry = &listing.entry;
        println!(
            "{} {} [{}] {}",
            style(&listing.key).white().bold(),
            style(&entry.malware_name).yellow(),
            severity_style(entry.severity),
            style(&entry.quarantined_on).dim()
        );
        if let Some(original) = &entry.original_path {
            println!("    from {}", style(original).dim());
        }
        if entry.quarantine_path.is_none() {
            println!("    {}", style("(tracked only, no isolated copy)").dim());
        }
    }
}
