//! Runtime settings.
//!
//! Resolution order is CLI flag, then environment, then the platform's
//! per-user config directory.

use crate::errors::{MalguardError, MalguardResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const ENV_HOME: &str = "MALGUARD_HOME";
pub const ENV_DB_KEY: &str = "MALGUARD_DB_KEY";
pub const ENV_BACKEND: &str = "MALGUARD_BACKEND";

const DEFAULT_DB_KEY: &str = "malguard_signature_db_secret_key_2024";

/// Default bound on nested archive recursion
pub const DEFAULT_MAX_ARCHIVE_DEPTH: usize = 3;
/// Largest upload or archive member read into memory
pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 100 * 1024 * 1024;

/// Extensions worth the cost of hashing
pub const SUSPICIOUS_EXTENSIONS: &[&str] = &[
    // Windows executables
    ".exe", ".dll", ".sys", ".scr", ".pif", ".com",
    // Scripts
    ".bat", ".cmd", ".ps1", ".vbs", ".vbe", ".js", ".jse", ".wsf", ".wsh",
    // Java/Python/Other
    ".jar", ".py", ".pyw", ".sh", ".bash",
    // Installers
    ".msi", ".msp", ".msu",
    // Linux/macOS
    ".elf", ".bin", ".run", ".deb", ".rpm", ".dmg", ".app", ".pkg",
    // Mobile
    ".apk", ".ipa",
    // Office macros
    ".docm", ".xlsm", ".pptm",
];

/// Container extensions the archive walker opens
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".zip"];

/// Signature store engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// HMAC-signed JSON file plus a JSONL history log
    #[default]
    Json,
    /// Single SQLite database for signatures and history
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = MalguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "sqlite" | "sql" => Ok(StoreBackend::Sqlite),
            other => Err(MalguardError::InvalidInput(format!("Unknown store backend: {}", other))),
        }
    }
}

/// Extension allowlist used by the skip gate.
#[derive(Debug, Clone)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| {
                    let e = e.as_ref().trim().to_lowercase();
                    if e.starts_with('.') { e } else { format!(".{}", e) }
                })
                .collect(),
        )
    }

    pub fn suspicious() -> Self {
        Self::new(SUSPICIOUS_EXTENSIONS)
    }

    pub fn archives() -> Self {
        Self::new(ARCHIVE_EXTENSIONS)
    }

    /// `extension` is expected in lowercased dotted form
    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(extension)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub backend: StoreBackend,
    pub db_key: Vec<u8>,
    pub max_archive_depth: usize,
    pub max_content_bytes: u64,
}

impl Settings {
    /// Build settings from optional CLI overrides plus the environment
    pub fn resolve(data_dir: Option<&Path>, backend: Option<StoreBackend>) -> MalguardResult<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => match std::env::var_os(ENV_HOME) {
                Some(home) => PathBuf::from(home),
                None => default_config_dir()?,
            },
        };

        let backend = match backend {
            Some(b) => b,
            None => match std::env::var(ENV_BACKEND) {
                Ok(value) => value.parse()?,
                Err(_) => StoreBackend::default(),
            },
        };

        let db_key = std::env::var(ENV_DB_KEY)
            .unwrap_or_else(|_| DEFAULT_DB_KEY.to_string())
            .into_bytes();

        Ok(Self::new(data_dir, backend).with_db_key(db_key))
    }

    pub fn new(data_dir: PathBuf, backend: StoreBackend) -> Self {
        Self {
            data_dir,
            backend,
            db_key: DEFAULT_DB_KEY.as_bytes().to_vec(),
            max_archive_depth: DEFAULT_MAX_ARCHIVE_DEPTH,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }

    pub fn with_db_key(mut self, key: Vec<u8>) -> Self {
        self.db_key = key;
        self
    }

    /// Create the data directory tree
    pub fn ensure_dirs(&self) -> MalguardResult<()> {
        for dir in [&self.data_dir, &self.quarantine_dir(), &self.rules_dir()] {
            std::fs::create_dir_all(dir).map_err(|e| MalguardError::io(e, dir.clone()))?;
        }
        Ok(())
    }

    pub fn signatures_path(&self) -> PathBuf {
        self.data_dir.join("signatures.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("scan_history.jsonl")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("malguard.db")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.data_dir.join("quarantine")
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.data_dir.join("yara_rules")
    }
}

/// Per-user configuration directory for the current platform
pub fn default_config_dir() -> MalguardResult<PathBuf> {
    let home = || {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .ok_or_else(|| MalguardError::InvalidInput("cannot determine home directory".to_string()))
    };

    let base = if cfg!(windows) {
        match std::env::var_os("APPDATA") {
            Some(appdata) => PathBuf::from(appdata),
            None => home()?.join("AppData").join("Roaming"),
        }
    } else if cfg!(target_os = "macos") {
        home()?.join("Library").join("Application Support")
    } else {
        match std::env::var_os("XDG_CONFIG_HOME") {
            Some(xdg) => PathBuf::from(xdg),
            None => home()?.join(".config"),
        }
    };

    Ok(base.join("malguard"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_set_normalizes() {
        let set = ExtensionSet::new(["EXE", ".Dll", " ps1 "]);
        assert!(set.contains(".exe"));
        assert!(set.contains(".dll"));
        assert!(set.contains(".ps1"));
        assert!(!set.contains(".txt"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_default_sets() {
        assert!(ExtensionSet::suspicious().contains(".exe"));
        assert!(!ExtensionSet::suspicious().contains(".txt"));
        assert!(ExtensionSet::archives().contains(".zip"));
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(Some(dir.path()), Some(StoreBackend::Sqlite)).unwrap();
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.backend, StoreBackend::Sqlite);
        assert_eq!(settings.database_path(), dir.path().join("malguard.db"));

        settings.ensure_dirs().unwrap();
        assert!(settings.quarantine_dir().is_dir());
        assert!(settings.rules_dir().is_dir());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }
}
