//! MalGuard signature-based malware scanner
//!
//! Hashes files, resolves them against a known-bad signature store and
//! optional pattern rules, records every result, and isolates detections in
//! a quarantine. The CLI and the HTTP API drive the same [`Scanner`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod hasher;
pub mod models;
pub mod quarantine;
pub mod scanner;
pub mod storage;
pub mod ui;
pub mod utils;
pub mod yara;

pub use config::Settings;
pub use errors::{MalguardError, MalguardResult};
pub use quarantine::QuarantineManager;
pub use scanner::{ScanOptions, ScanOutcome, Scanner};
