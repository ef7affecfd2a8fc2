//! History and statistics commands

use super::{Context, Exit};
use crate::errors::MalguardResult;
use crate::ui;

pub fn history(ctx: &Context, limit: usize, all: bool) -> MalguardResult<Exit> {
    let results = ctx.stores.history.recent(limit, !all)?;
    let label = if all { "Recent scans" } else { "Recent detections" };
    println!("📋 {} (last {})", label, results.len());
    ui::print_history(&results);
    Ok(Exit::Success)
}

pub fn stats(ctx: &Context) -> MalguardResult<Exit> {
    let stats = ctx.stores.history.stats()?;
    let signatures = ctx.stores.signatures.count()?;
    let quarantined = ctx.quarantine.count()?;
    ui::print_stats(&stats, signatures, quarantined);
    Ok(Exit::Success)
}
