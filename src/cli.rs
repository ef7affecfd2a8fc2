use crate::commands::quarantine::QuarantineCommands;
use crate::commands::scan::ScanArgs;
use crate::commands::serve::ServeArgs;
use crate::commands::signatures::{AddArgs, HashArgs, ListArgs};
use crate::config::StoreBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "malguard",
    about = "MalGuard - signature-based malware scanner with quarantine",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging of all operations
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress bars and only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Data directory (defaults to $MALGUARD_HOME, then the platform config dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Signature store engine (defaults to $MALGUARD_BACKEND, then json)
    #[arg(long, global = true, value_enum)]
    pub backend: Option<StoreBackend>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a file or directory for malware
    Scan(ScanArgs),

    /// Add the SHA-256 of a sample file as a signature
    Add(AddArgs),

    /// Remove a signature by hash
    Remove {
        /// SHA-256 hash to remove
        hash: String,
    },

    /// List, search or filter signatures
    List(ListArgs),

    /// Show recent scan history (detections only unless --all)
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Include clean and skipped scans
        #[arg(short, long)]
        all: bool,
    },

    /// Show scanning statistics
    Stats,

    /// Export signatures to a JSON file
    Export {
        /// Output file path
        output: PathBuf,
    },

    /// Import signatures from a JSON file
    Import {
        /// Input JSON file
        input: PathBuf,
    },

    /// Print a file digest and look it up
    Hash(HashArgs),

    /// Manage quarantined files
    #[command(subcommand)]
    Quarantine(QuarantineCommands),

    /// Run the HTTP API
    Serve(ServeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_flags() {
        let args = Args::parse_from(["malguard", "--backend", "sqlite", "scan", "/tmp", "--all", "--json"]);
        assert_eq!(args.backend, Some(StoreBackend::Sqlite));
        match args.command {
            Command::Scan(scan) => {
                assert!(scan.all);
                assert!(scan.json);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_quarantine_restore() {
        let args = Args::parse_from(["malguard", "quarantine", "restore", "3f2a", "--to", "/tmp/out.exe"]);
        assert!(matches!(
            args.command,
            Command::Quarantine(QuarantineCommands::Restore { ref id, to: Some(_) }) if id == "3f2a"
        ));
    }
}
