//! CLI command handlers

pub mod history;
pub mod quarantine;
pub mod scan;
pub mod serve;
pub mod signatures;

use crate::cli::{Args, Command};
use crate::config::Settings;
use crate::errors::MalguardResult;
use crate::quarantine::QuarantineManager;
use crate::scanner::Scanner;
use crate::storage::{open_stores, Stores};
use crate::ui;
use crate::yara::load_pattern_matcher;
use std::sync::Arc;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success = 0,
    /// Error or not found
    Failure = 1,
    /// Malware detected
    Detected = 2,
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        std::process::ExitCode::from(exit as u8)
    }
}

/// Everything a command works against
pub struct Context {
    pub settings: Settings,
    pub stores: Stores,
    pub quarantine: Arc<QuarantineManager>,
    pub quiet: bool,
    pub verbose: bool,
}

impl Context {
    pub fn open(args: &Args) -> MalguardResult<Self> {
        let settings = Settings::resolve(args.data_dir.as_deref(), args.backend)?;
        settings.ensure_dirs()?;
        log::debug!("Using data directory {:?} ({:?} backend)", settings.data_dir, settings.backend);

        let stores = open_stores(&settings)?;
        if let Some(warning) = &stores.integrity_warning {
            ui::print_warning(warning);
        }
        let quarantine = Arc::new(QuarantineManager::new(settings.quarantine_dir())?);

        Ok(Self {
            settings,
            stores,
            quarantine,
            quiet: args.quiet,
            verbose: args.verbose,
        })
    }

    /// Scanner wired to this context's stores, rules and quarantine
    pub fn scanner(&self, auto_quarantine: bool) -> Scanner {
        Scanner::new(self.stores.signatures.clone(), self.stores.history.clone())
            .with_pattern_matcher(load_pattern_matcher(&self.settings.rules_dir()))
            .with_quarantine(self.quarantine.clone())
            .with_auto_quarantine(auto_quarantine)
            .with_max_entry_bytes(self.settings.max_content_bytes)
    }
}

pub async fn run(args: Args) -> MalguardResult<Exit> {
    let ctx = Context::open(&args)?;

    match args.command {
        Command::Scan(scan_args) => scan::run(&ctx, scan_args),
        Command::Add(add_args) => signatures::add(&ctx, add_args),
        Command::Remove { hash } => signatures::remove(&ctx, &hash),
        Command::List(list_args) => signatures::list(&ctx, list_args),
        Command::History { limit, all } => history::history(&ctx, limit, all),
        Command::Stats => history::stats(&ctx),
        Command::Export { output } => signatures::export(&ctx, &output),
        Command::Import { input } => signatures::import(&ctx, &input),
        Command::Hash(hash_args) => signatures::hash(&ctx, hash_args),
        Command::Quarantine(cmd) => quarantine::run(&ctx, cmd),
        Command::Serve(serve_args) => serve::run(ctx, serve_args).await,
    }
}
