//! Quarantine commands

use super::{Context, Exit};
use crate::errors::{MalguardError, MalguardResult};
use crate::quarantine::RestoreOutcome;
use crate::ui;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum QuarantineCommands {
    /// List quarantined files
    List {
        /// Print as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Restore a quarantined file
    Restore {
        /// Composite key, hash prefix or original file name
        id: String,

        /// Restore here instead of the original location
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Permanently delete a quarantined file
    Delete {
        /// Composite key, hash prefix or original file name
        id: String,
    },

    /// Delete every quarantined file
    Clear,
}

pub fn run(ctx: &Context, cmd: QuarantineCommands) -> MalguardResult<Exit> {
    let result = match cmd {
        QuarantineCommands::List { json } => list(ctx, json),
        QuarantineCommands::Restore { id, to } => restore(ctx, &id, to),
        QuarantineCommands::Delete { id } => delete(ctx, &id),
        QuarantineCommands::Clear => clear(ctx),
    };

    // show the user what to pick from
    if let Err(MalguardError::Ambiguous { ident, candidates }) = &result {
        ui::print_warning(&format!("'{}' matches several entries. Be more specific:", ident));
        for key in candidates.iter().take(5) {
            eprintln!("   - {}", key);
        }
        return Ok(Exit::Failure);
    }
    result
}

fn list(ctx: &Context, json: bool) -> MalguardResult<Exit> {
    let entries = ctx.quarantine.list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("🔒 Quarantine ({} files) at {}", entries.len(), ctx.quarantine.dir().display());
        ui::print_quarantine(&entries);
    }
    Ok(Exit::Success)
}

fn restore(ctx: &Context, id: &str, to: Option<PathBuf>) -> MalguardResult<Exit> {
    match ctx.quarantine.restore(id, to.as_deref())? {
        RestoreOutcome::Restored { key, path } => {
            ui::print_success(&format!("Restored {} to {}", key, path.display()));
        }
        RestoreOutcome::AlreadyGone { key } => {
            ui::print_warning(&format!("Isolated copy of {} was already gone; entry removed", key));
        }
    }
    Ok(Exit::Success)
}

fn delete(ctx: &Context, id: &str) -> MalguardResult<Exit> {
    let key = ctx.quarantine.delete(id)?;
    ui::print_success(&format!("Permanently deleted {}", key));
    Ok(Exit::Success)
}

fn clear(ctx: &Context) -> MalguardResult<Exit> {
    let count = ctx.quarantine.clear()?;
    ui::print_success(&format!("Cleared {} quarantined files", count));
    Ok(Exit::Success)
}
