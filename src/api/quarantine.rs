use super::{ApiError, AppState, MessageResponse};
use crate::errors::MalguardError;
use crate::models::{QuarantineListing, Severity};
use crate::quarantine::{QuarantineOutcome, RestoreOutcome};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct QuarantineList {
    pub total: usize,
    pub files: Vec<QuarantineListing>,
}

#[derive(Debug, Serialize)]
pub struct QuarantineCount {
    pub count: usize,
}

/// Metadata-only entry for a detection made elsewhere
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub file_hash: String,
    pub original_name: String,
    pub malware_name: String,
    #[serde(default)]
    pub severity: Severity,
    pub original_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreQuery {
    pub restore_path: Option<PathBuf>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<QuarantineList>, ApiError> {
    let files = state.quarantine.list()?;
    Ok(Json(QuarantineList {
        total: files.len(),
        files,
    }))
}

pub async fn count(State(state): State<AppState>) -> Result<Json<QuarantineCount>, ApiError> {
    Ok(Json(QuarantineCount {
        count: state.quarantine.count()?,
    }))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<QuarantineListing>, ApiError> {
    Ok(Json(state.quarantine.get(&id)?))
}

pub async fn track(State(state): State<AppState>, Json(request): Json<TrackRequest>) -> Result<Json<MessageResponse>, ApiError> {
    let artifact_path = request.original_path.as_deref().unwrap_or(&request.original_name);
    let outcome = state.quarantine.track(
        artifact_path,
        &request.original_name,
        &request.file_hash,
        &request.malware_name,
        request.severity,
    )?;

    match outcome {
        QuarantineOutcome::Quarantined { .. } => Ok(MessageResponse::ok(format!(
            "File '{}' added to quarantine",
            request.original_name
        ))),
        QuarantineOutcome::AlreadyQuarantined { key } => {
            Err(MalguardError::AlreadyExists(format!("File already in quarantine: {}", key)).into())
        }
    }
}

pub async fn restore(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RestoreQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = match state.quarantine.restore(&id, query.restore_path.as_deref())? {
        RestoreOutcome::Restored { path, .. } => format!("File restored to: {}", path.display()),
        RestoreOutcome::AlreadyGone { .. } => {
            "File removed from quarantine records (file was already deleted)".to_string()
        }
    };
    Ok(MessageResponse::ok(message))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MessageResponse>, ApiError> {
    let key = state.quarantine.delete(&id)?;
    Ok(MessageResponse::ok(format!("Removed {} from quarantine", key)))
}

pub async fn clear(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let count = state.quarantine.clear()?;
    Ok(MessageResponse::ok(format!("Cleared {} quarantined files", count)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::state_in;
    use super::*;
    use axum::http::StatusCode;

    fn request(hash: &str, name: &str) -> TrackRequest {
        TrackRequest {
            file_hash: hash.to_string(),
            original_name: name.to_string(),
            malware_name: "Trojan.Api".to_string(),
            severity: Severity::High,
            original_path: None,
        }
    }

    #[tokio::test]
    async fn test_track_is_idempotent_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let hash = "ab".repeat(32);

        track(State(state.clone()), Json(request(&hash, "x.exe"))).await.unwrap();
        let err = track(State(state.clone()), Json(request(&hash, "x.exe")))
            .await
            .err()
            .expect("duplicate key");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // same content under another name is a separate entry
        track(State(state.clone()), Json(request(&hash, "y.exe"))).await.unwrap();
        let Json(counted) = count(State(state)).await.unwrap();
        assert_eq!(counted.count, 2);
    }

    #[tokio::test]
    async fn test_ambiguous_prefix_then_exact_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let hash = "cd".repeat(32);
        track(State(state.clone()), Json(request(&hash, "one.exe"))).await.unwrap();
        track(State(state.clone()), Json(request(&hash, "two.exe"))).await.unwrap();

        let err = get_one(State(state.clone()), Path("cdcd".into())).await.err().expect("ambiguous");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(matches!(err.inner(), MalguardError::Ambiguous { candidates, .. } if candidates.len() == 2));

        let key = format!("{}:one.exe", hash);
        let Json(found) = get_one(State(state.clone()), Path(key.clone())).await.unwrap();
        assert_eq!(found.entry.original_name, "one.exe");

        let err = get_one(State(state), Path("ffff".into())).await.err().expect("missing");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_restore_metadata_only_entry_reports_gone() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let hash = "ef".repeat(32);
        track(State(state.clone()), Json(request(&hash, "ghost.exe"))).await.unwrap();

        let Json(message) = restore(
            State(state.clone()),
            Path(format!("{}:ghost.exe", hash)),
            Query(RestoreQuery { restore_path: None }),
        )
        .await
        .unwrap();
        assert!(message.message.contains("already deleted"));
        assert_eq!(state.quarantine.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        track(State(state.clone()), Json(request(&"01".repeat(32), "a.exe"))).await.unwrap();
        track(State(state.clone()), Json(request(&"02".repeat(32), "b.exe"))).await.unwrap();

        remove(State(state.clone()), Path("0101".into())).await.unwrap();
        let Json(listed) = list(State(state.clone())).await.unwrap();
        assert_eq!(listed.total, 1);

        clear(State(state.clone())).await.unwrap();
        assert_eq!(state.quarantine.count().unwrap(), 0);
    }
}
