use super::{ApiError, AppState, MessageResponse, UploadForm};
use crate::errors::MalguardError;
use crate::hasher::{is_sha256_hex, normalize_hash, FileHasher};
use crate::models::{Severity, SignatureRecord};
use crate::storage::{export_document, import_document, ImportReport};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct SignatureList {
    pub total: usize,
    pub signatures: Vec<SignatureRecord>,
}

impl SignatureList {
    fn of(signatures: Vec<SignatureRecord>) -> Json<Self> {
        Json(Self {
            total: signatures.len(),
            signatures,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct NewSignature {
    pub hash: String,
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize)]
pub struct FromFileParams {
    #[serde(default = "default_sample_name")]
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
}

fn default_sample_name() -> String {
    "Unknown Malware".to_string()
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub report: ImportReport,
}

impl ImportResponse {
    fn from_report(label: &str, report: ImportReport) -> Json<Self> {
        Json(Self {
            success: true,
            message: format!("{}: {} added, {} skipped", label, report.added, report.skipped),
            report,
        })
    }
}

/// `GET /signatures`: total is the full store size, not the page size
pub async fn list(State(state): State<AppState>, Query(page): Query<Page>) -> Result<Json<SignatureList>, ApiError> {
    let signatures = state.signatures.list(page.limit, page.offset)?;
    Ok(Json(SignatureList {
        total: state.signatures.count()?,
        signatures,
    }))
}

pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Result<Json<SignatureList>, ApiError> {
    Ok(SignatureList::of(state.signatures.search(&query.q)?))
}

pub async fn filter_by_severity(
    State(state): State<AppState>,
    Path(severity): Path<String>,
) -> Result<Json<SignatureList>, ApiError> {
    let severity: Severity = severity.parse()?;
    Ok(SignatureList::of(state.signatures.filter_by_severity(severity)?))
}

pub async fn get_one(State(state): State<AppState>, Path(hash): Path<String>) -> Result<Json<SignatureRecord>, ApiError> {
    state
        .signatures
        .get(&normalize_hash(&hash))?
        .map(Json)
        .ok_or_else(|| MalguardError::NotFound("Signature not found".to_string()).into())
}

pub async fn add(State(state): State<AppState>, Json(signature): Json<NewSignature>) -> Result<Json<MessageResponse>, ApiError> {
    let hash = normalize_hash(&signature.hash);
    if !is_sha256_hex(&hash) {
        return Err(ApiError::bad_request("Expected a 64-character hex SHA-256 digest"));
    }
    if !state.signatures.add(&hash, &signature.name, signature.severity, &signature.source)? {
        return Err(MalguardError::AlreadyExists("Signature already exists".to_string()).into());
    }
    Ok(MessageResponse::ok(format!("Signature '{}' added successfully", signature.name)))
}

/// `POST /signatures/from-file`: fingerprint an uploaded sample
pub async fn add_from_file(
    State(state): State<AppState>,
    Query(params): Query<FromFileParams>,
    multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let upload = UploadForm::read(multipart).await?.first_file()?;
    let hash = FileHasher::default().hash_bytes(&upload.data);

    if !state.signatures.add(&hash, &params.name, params.severity, "upload")? {
        return Err(MalguardError::AlreadyExists("Signature already exists".to_string()).into());
    }
    Ok(MessageResponse::ok(format!(
        "Signature '{}' added (hash: {}...)",
        params.name,
        &hash[..16]
    )))
}

/// `POST /signatures/bulk`: duplicates and malformed hashes are skipped
pub async fn bulk_import(
    State(state): State<AppState>,
    Json(signatures): Json<Vec<NewSignature>>,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut report = ImportReport::default();
    for signature in signatures {
        let hash = normalize_hash(&signature.hash);
        if is_sha256_hex(&hash) && state.signatures.add(&hash, &signature.name, signature.severity, &signature.source)? {
            report.added += 1;
        } else {
            report.skipped += 1;
        }
    }
    Ok(ImportResponse::from_report("Bulk import complete", report))
}

/// `POST /signatures/import-json`: same document shapes the CLI imports
pub async fn import_json(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ImportResponse>, ApiError> {
    let upload = UploadForm::read(multipart).await?.first_file()?;
    let document: Value = serde_json::from_slice(&upload.data)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON file: {}", e)))?;
    let report = import_document(state.signatures.as_ref(), &document)?;
    Ok(ImportResponse::from_report("Import complete", report))
}

pub async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let document = export_document(state.signatures.as_ref())?;
    Ok((
        [(header::CONTENT_DISPOSITION, "attachment; filename=signatures_export.json")],
        Json(document),
    ))
}

pub async fn remove(State(state): State<AppState>, Path(hash): Path<String>) -> Result<Json<MessageResponse>, ApiError> {
    if !state.signatures.remove(&normalize_hash(&hash))? {
        return Err(MalguardError::NotFound("Signature not found".to_string()).into());
    }
    Ok(MessageResponse::ok("Signature removed successfully"))
}

/// `DELETE /signatures/all`
pub async fn clear_all(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let removed = state.signatures.clear()?;
    log::warn!("Cleared {} signatures via API", removed);
    Ok(MessageResponse::ok(format!("Cleared {} signatures", removed)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::state_in;
    use super::*;
    use axum::http::StatusCode;

    fn sig(hash: &str, name: &str, severity: Severity) -> NewSignature {
        NewSignature {
            hash: hash.to_string(),
            name: name.to_string(),
            severity,
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let hash = "a".repeat(64);

        add(State(state.clone()), Json(sig(&hash, "Worm.A", Severity::High)))
            .await
            .unwrap();
        let err = add(State(state.clone()), Json(sig(&hash, "Worm.A", Severity::High)))
            .await
            .err()
            .expect("duplicate");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(record) = get_one(State(state.clone()), Path(hash.to_uppercase())).await.unwrap();
        assert_eq!(record.name, "Worm.A");

        remove(State(state.clone()), Path(hash.clone())).await.unwrap();
        let err = get_one(State(state.clone()), Path(hash.clone())).await.err().expect("removed");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = remove(State(state), Path(hash)).await.err().expect("already removed");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bulk_import_counts_duplicates_and_bad_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let batch = vec![
            sig(&"1".repeat(64), "One", Severity::Low),
            sig(&"1".repeat(64), "One again", Severity::Low),
            sig("short", "Broken", Severity::Low),
            sig(&"2".repeat(64), "Two", Severity::Critical),
        ];

        let Json(response) = bulk_import(State(state.clone()), Json(batch)).await.unwrap();
        assert_eq!(response.report.added, 2);
        assert_eq!(response.report.skipped, 2);

        let Json(list) = list(State(state.clone()), Query(Page { limit: 1, offset: 0 })).await.unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.signatures.len(), 1);

        let Json(critical) = filter_by_severity(State(state.clone()), Path("critical".into())).await.unwrap();
        assert_eq!(critical.total, 1);
        assert_eq!(critical.signatures[0].name, "Two");

        let err = filter_by_severity(State(state), Path("extreme".into()))
            .await
            .err()
            .expect("unknown severity");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        state.signatures.add(&"3".repeat(64), "Ransom.Locky", Severity::Critical, "test").unwrap();
        state.signatures.add(&"4".repeat(64), "Adware.Pop", Severity::Low, "test").unwrap();

        let Json(found) = search(State(state.clone()), Query(SearchQuery { q: "locky".into() }))
            .await
            .unwrap();
        assert_eq!(found.total, 1);

        clear_all(State(state.clone())).await.unwrap();
        assert_eq!(state.signatures.count().unwrap(), 0);
    }
}
