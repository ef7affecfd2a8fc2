//! HTTP API over the same scanner, stores and quarantine the CLI uses.
//!
//! Every scan runs on tokio's blocking pool. Store calls are short and run
//! inline on the request task.

mod error;
mod history;
mod quarantine;
mod scan;
mod signatures;

pub use error::ApiError;

use crate::config::Settings;
use crate::errors::MalguardResult;
use crate::quarantine::QuarantineManager;
use crate::scanner::{ScanOptions, Scanner};
use crate::storage::{HistorySink, SignatureStore, Stores};
use crate::yara::rule_files;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handles every handler works against
#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
    pub signatures: Arc<dyn SignatureStore>,
    pub history: Arc<dyn HistorySink>,
    pub quarantine: Arc<QuarantineManager>,
    pub settings: Arc<Settings>,
    integrity_warning: Option<String>,
}

impl AppState {
    pub fn new(settings: Settings, stores: Stores, quarantine: Arc<QuarantineManager>, scanner: Scanner) -> Self {
        Self {
            scanner: Arc::new(scanner),
            signatures: stores.signatures,
            history: stores.history,
            quarantine,
            settings: Arc::new(settings),
            integrity_warning: stores.integrity_warning,
        }
    }

    fn scan_options(&self, scan_all: bool) -> ScanOptions {
        ScanOptions {
            skip_non_suspicious: !scan_all,
            scan_archives: true,
            max_archive_depth: self.settings.max_archive_depth,
        }
    }

    fn rule_file_count(&self) -> usize {
        rule_files(&self.settings.rules_dir()).len()
    }
}

/// Generic `{success, message}` body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// One uploaded file
#[derive(Debug, Clone)]
pub(crate) struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

/// A drained multipart form: file parts plus plain text fields
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub files: Vec<Upload>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?;

            match file_name {
                Some(file_name) => form.files.push(Upload {
                    file_name: if file_name.is_empty() { "unknown".to_string() } else { file_name },
                    data,
                }),
                None => {
                    form.fields.insert(name, String::from_utf8_lossy(&data).into_owned());
                }
            }
        }
        Ok(form)
    }

    /// Boolean form field; anything but a truthy word is false
    pub fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
    }

    pub fn first_file(self) -> Result<Upload, ApiError> {
        self.files
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::bad_request("No file uploaded"))
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.settings.max_content_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/scan/file", post(scan::scan_file))
        .route("/scan/files", post(scan::scan_files))
        .route("/scan/hash", post(scan::scan_hash))
        .route("/signatures", get(signatures::list).post(signatures::add))
        .route("/signatures/search", get(signatures::search))
        .route("/signatures/export", get(signatures::export))
        .route("/signatures/filter/severity/:severity", get(signatures::filter_by_severity))
        .route("/signatures/from-file", post(signatures::add_from_file))
        .route("/signatures/bulk", post(signatures::bulk_import))
        .route("/signatures/import-json", post(signatures::import_json))
        .route("/signatures/all", delete(signatures::clear_all))
        .route("/signatures/:hash", get(signatures::get_one).delete(signatures::remove))
        .route("/history", get(history::list).delete(history::clear))
        .route("/stats", get(history::stats))
        .route("/quarantine", get(quarantine::list).post(quarantine::track).delete(quarantine::clear))
        .route("/quarantine/stats/count", get(quarantine::count))
        .route("/quarantine/:id", get(quarantine::get_one).delete(quarantine::remove))
        .route("/quarantine/:id/restore", post(quarantine::restore))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState, host: &str, port: u16) -> MalguardResult<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("MalGuard API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "MalGuard API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.history.stats()?;
    Ok(Json(json!({
        "status": if state.integrity_warning.is_some() { "degraded" } else { "healthy" },
        "database": state.settings.backend,
        "signatures": state.signatures.count()?,
        "total_scans": stats.total_scans,
        "integrity_warning": state.integrity_warning,
    })))
}

async fn info(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.history.stats()?;
    Ok(Json(json!({
        "name": "MalGuard API",
        "version": env!("CARGO_PKG_VERSION"),
        "features": {
            "signature_matching": true,
            "yara_rules": state.scanner.pattern_matching_available(),
            "yara_rules_count": state.rule_file_count(),
            "file_scanning": true,
            "archive_scanning": true,
            "hash_lookup": true,
            "bulk_import": true,
            "export": true,
            "quarantine": true,
        },
        "database": {
            "backend": state.settings.backend,
            "signatures": state.signatures.count()?,
            "scans": stats.total_scans,
            "detections": stats.detections,
        },
        "limits": {
            "max_upload_bytes": state.settings.max_content_bytes,
            "max_archive_depth": state.settings.max_archive_depth,
        },
    })))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::StoreBackend;
    use crate::storage::SqliteStore;

    /// State over an in-memory store and a scratch quarantine
    pub fn state_in(dir: &std::path::Path) -> AppState {
        let settings = Settings::new(dir.to_path_buf(), StoreBackend::Sqlite);
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let stores = Stores {
            signatures: store.clone(),
            history: store.clone(),
            integrity_warning: None,
        };
        let quarantine = Arc::new(QuarantineManager::new(dir.join("quarantine")).unwrap());
        let scanner = Scanner::new(store.clone(), store).with_quarantine(quarantine.clone());
        AppState::new(settings, stores, quarantine, scanner)
    }
}
