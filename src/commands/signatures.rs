//! Signature database commands

use super::{Context, Exit};
use crate::errors::{MalguardError, MalguardResult};
use crate::hasher::{is_sha256_hex, FileHasher, HashAlgorithm};
use crate::models::Severity;
use crate::storage::{export_signatures, import_signatures};
use crate::ui;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Path to the malware sample
    pub file: PathBuf,

    /// Malware name (e.g. "Trojan.Generic")
    pub name: String,

    /// Threat severity level
    #[arg(short, long, value_enum, default_value = "medium")]
    pub severity: Severity,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Case-insensitive match on name or hash
    #[arg(short, long)]
    pub search: Option<String>,

    /// Only signatures of this severity
    #[arg(long, value_enum)]
    pub severity: Option<Severity>,

    #[arg(short, long, default_value = "100")]
    pub limit: usize,

    #[arg(short, long, default_value = "0")]
    pub offset: usize,

    /// Print as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    /// File to fingerprint
    pub file: PathBuf,

    /// Digest algorithm
    #[arg(short, long, value_enum, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
}

pub fn add(ctx: &Context, args: AddArgs) -> MalguardResult<Exit> {
    if !args.file.is_file() {
        return Err(MalguardError::NotFound(format!("File not found: {}", args.file.display())));
    }
    let hash = FileHasher::default().hash_file(&args.file)?;

    if !ctx.stores.signatures.add(&hash, &args.name, args.severity, "cli")? {
        ui::print_warning(&format!("Signature already exists: {}", hash));
        return Ok(Exit::Failure);
    }

    ui::print_success(&format!("Added signature {}", args.name));
    println!("   File:     {}", args.file.display());
    println!("   SHA-256:  {}", hash);
    println!("   Severity: {}", args.severity);
    Ok(Exit::Success)
}

pub fn remove(ctx: &Context, hash: &str) -> MalguardResult<Exit> {
    if !ctx.stores.signatures.remove(hash)? {
        return Err(MalguardError::NotFound(format!("No signature with hash {}", hash)));
    }
    ui::print_success(&format!("Removed signature {}", hash));
    Ok(Exit::Success)
}

pub fn list(ctx: &Context, args: ListArgs) -> MalguardResult<Exit> {
    let store = &ctx.stores.signatures;
    let records = match (&args.search, args.severity) {
        (Some(query), _) => store.search(query)?,
        (None, Some(severity)) => store.filter_by_severity(severity)?,
        (None, None) => store.list(args.limit, args.offset)?,
    };
    // a search and a severity filter combine
    let records: Vec<_> = match (&args.search, args.severity) {
        (Some(_), Some(severity)) => records.into_iter().filter(|r| r.severity == severity).collect(),
        _ => records,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!("🔒 Signature database ({} total)", store.count()?);
        ui::print_signatures(&records);
    }
    Ok(Exit::Success)
}

pub fn export(ctx: &Context, output: &Path) -> MalguardResult<Exit> {
    let total = export_signatures(ctx.stores.signatures.as_ref(), output)?;
    ui::print_success(&format!("Exported {} signatures to {}", total, output.display()));
    Ok(Exit::Success)
}

pub fn import(ctx: &Context, input: &Path) -> MalguardResult<Exit> {
    if !input.is_file() {
        return Err(MalguardError::NotFound(format!("File not found: {}", input.display())));
    }
    let report = import_signatures(ctx.stores.signatures.as_ref(), input)?;
    ui::print_success(&format!(
        "Import complete: {} added, {} skipped",
        report.added, report.skipped
    ));
    Ok(Exit::Success)
}

/// Print the digest; SHA-256 digests are also looked up
pub fn hash(ctx: &Context, args: HashArgs) -> MalguardResult<Exit> {
    let digest = FileHasher::new(args.algorithm).hash_file(&args.file)?;
    println!("{}  {} ({})", digest, args.file.display(), args.algorithm);

    if args.algorithm != HashAlgorithm::Sha256 || !is_sha256_hex(&digest) {
        return Ok(Exit::Success);
    }
    let lookup = ctx.scanner(false).check_hash(&digest)?;
    ui::print_hash_lookup(&lookup);
    Ok(if lookup.detected { Exit::Detected } else { Exit::Success })
}
