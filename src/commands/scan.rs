//! Scan command

use super::{Context, Exit};
use crate::errors::MalguardResult;
use crate::scanner::{ScanOptions, ScanSummary};
use crate::ui;
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// File or directory to scan
    pub path: PathBuf,

    /// Scan all files, not just executables and scripts
    #[arg(short, long)]
    pub all: bool,

    /// Print results as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Treat archives as opaque files
    #[arg(long)]
    pub no_archives: bool,

    /// Report detections without moving them into quarantine
    #[arg(long)]
    pub no_quarantine: bool,

    /// Number of parallel scanning threads (0 = auto-detect)
    #[arg(short, long, default_value = "0")]
    pub threads: usize,
}

pub fn run(ctx: &Context, args: ScanArgs) -> MalguardResult<Exit> {
    let options = ScanOptions {
        skip_non_suspicious: !args.all,
        scan_archives: !args.no_archives,
        max_archive_depth: ctx.settings.max_archive_depth,
    };
    let scanner = ctx.scanner(!args.no_quarantine);

    if !args.json && !ctx.quiet {
        println!("🔍 Scanning {}", args.path.display());
        if options.skip_non_suspicious {
            println!("   (executables and scripts only; use --all for every file)");
        }
    }

    let started = Instant::now();
    let progress = ui::scan_progress(ctx.quiet || args.json);
    let results = scanner.scan_path(&args.path, &options, args.threads, &progress)?;
    progress.finish_and_clear();

    let summary = ScanSummary::from_results(&results);

    if args.json {
        let body = serde_json::json!({
            "results": results,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        for result in &results {
            ui::print_result(result, ctx.verbose || results.len() == 1);
        }
        ui::print_summary(&summary, started.elapsed());
    }

    Ok(if summary.detected > 0 { Exit::Detected } else { Exit::Success })
}
