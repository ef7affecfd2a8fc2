//! Signature store and scan history collaborators.
//!
//! The scan pipeline only sees the two traits below. Concrete engines:
//! - `signed_json`: HMAC-signed flat file of signatures
//! - `jsonl`: append-only JSON Lines history
//! - `sqlite`: one database holding both tables
//! - `transfer`: import/export documents shared by every engine

mod jsonl;
mod signed_json;
mod sqlite;
mod transfer;

pub use jsonl::JsonlHistory;
pub use signed_json::{LoadStatus, SignedJsonStore};
pub use sqlite::SqliteStore;
pub use transfer::{export_document, export_signatures, import_document, import_signatures, ImportReport};

use crate::config::{Settings, StoreBackend};
use crate::errors::MalguardResult;
use crate::models::{HistoryStats, ScanResult, SignatureRecord, Severity};
use std::sync::Arc;

/// Known-bad hash lookup table. Implementations lowercase every hash
/// before it touches storage.
pub trait SignatureStore: Send + Sync {
    /// Returns `false` when the hash is already present
    fn add(&self, hash: &str, name: &str, severity: Severity, source: &str) -> MalguardResult<bool>;
    fn remove(&self, hash: &str) -> MalguardResult<bool>;
    fn get(&self, hash: &str) -> MalguardResult<Option<SignatureRecord>>;
    fn list(&self, limit: usize, offset: usize) -> MalguardResult<Vec<SignatureRecord>>;
    fn search(&self, query: &str) -> MalguardResult<Vec<SignatureRecord>>;
    fn filter_by_severity(&self, severity: Severity) -> MalguardResult<Vec<SignatureRecord>>;
    fn count(&self) -> MalguardResult<usize>;
    fn clear(&self) -> MalguardResult<usize>;
}

/// Append-only record of every scan outcome.
pub trait HistorySink: Send + Sync {
    fn log(&self, result: &ScanResult) -> MalguardResult<()>;
    /// Most recent first
    fn recent(&self, limit: usize, detections_only: bool) -> MalguardResult<Vec<ScanResult>>;
    fn stats(&self) -> MalguardResult<HistoryStats>;
    fn clear(&self) -> MalguardResult<usize>;
}

/// Search results are capped the same way for every engine
pub const SEARCH_LIMIT: usize = 50;

/// The store pair a process works against
#[derive(Clone)]
pub struct Stores {
    pub signatures: Arc<dyn SignatureStore>,
    pub history: Arc<dyn HistorySink>,
    /// Set when the signed signature file failed verification on load
    pub integrity_warning: Option<String>,
}

/// Open the engine selected in `settings`
pub fn open_stores(settings: &Settings) -> MalguardResult<Stores> {
    match settings.backend {
        StoreBackend::Json => {
            let signatures = SignedJsonStore::open(settings.signatures_path(), settings.db_key.clone())?;
            let integrity_warning = match signatures.load_status() {
                LoadStatus::Tampered | LoadStatus::Invalid => Some(format!(
                    "Signature database at {} failed its integrity check and was ignored",
                    settings.signatures_path().display()
                )),
                _ => None,
            };
            let history = JsonlHistory::new(settings.history_path())?;
            Ok(Stores {
                signatures: Arc::new(signatures),
                history: Arc::new(history),
                integrity_warning,
            })
        }
        StoreBackend::Sqlite => {
            let store = Arc::new(SqliteStore::open(&settings.database_path())?);
            Ok(Stores {
                signatures: store.clone(),
                history: store,
                integrity_warning: None,
            })
        }
    }
}

/// Case-insensitive substring match on name or hash
pub(crate) fn record_matches(record: &SignatureRecord, query: &str) -> bool {
    let query = query.to_lowercase();
    record.name.to_lowercase().contains(&query) || record.hash.contains(&query)
}
