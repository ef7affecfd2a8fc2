use super::{ApiError, AppState, Upload, UploadForm};
use crate::hasher::{is_sha256_hex, normalize_hash};
use crate::models::{HashLookup, ScanResult};
use crate::scanner::{ScanOptions, ScanSummary};
use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct BatchScanResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: ScanSummary,
    pub results: Vec<ScanResult>,
}

impl BatchScanResponse {
    fn new(results: Vec<ScanResult>) -> Self {
        Self {
            success: true,
            summary: ScanSummary::from_results(&results),
            results,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HashRequest {
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct HashResponse {
    pub success: bool,
    pub result: HashLookup,
}

/// `POST /scan/file`: one upload; archives expand into one result per member
pub async fn scan_file(State(state): State<AppState>, multipart: Multipart) -> Result<Json<BatchScanResponse>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let options = state.scan_options(form.flag("scan_all"));
    let upload = form.first_file()?;
    let results = scan_uploads(&state, vec![upload], options).await?;
    Ok(Json(BatchScanResponse::new(results)))
}

/// `POST /scan/files`
pub async fn scan_files(State(state): State<AppState>, multipart: Multipart) -> Result<Json<BatchScanResponse>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }
    let options = state.scan_options(form.flag("scan_all"));
    let results = scan_uploads(&state, form.files, options).await?;
    Ok(Json(BatchScanResponse::new(results)))
}

/// `POST /scan/hash`: lookup only, nothing is logged
pub async fn scan_hash(State(state): State<AppState>, Json(request): Json<HashRequest>) -> Result<Json<HashResponse>, ApiError> {
    let hash = normalize_hash(&request.hash);
    if !is_sha256_hex(&hash) {
        return Err(ApiError::bad_request("Expected a 64-character hex SHA-256 digest"));
    }
    let result = state.scanner.check_hash(&hash)?;
    Ok(Json(HashResponse { success: true, result }))
}

pub(crate) async fn scan_uploads(
    state: &AppState,
    uploads: Vec<Upload>,
    options: ScanOptions,
) -> Result<Vec<ScanResult>, ApiError> {
    let scanner = state.scanner.clone();
    let results = tokio::task::spawn_blocking(move || {
        uploads
            .iter()
            .flat_map(|upload| {
                scanner
                    .scan_bytes(&upload.data, &upload.file_name, &options)
                    .into_results()
            })
            .collect::<Vec<_>>()
    })
    .await?;
    Ok(results)
}
