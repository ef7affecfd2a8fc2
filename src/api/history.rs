use super::{ApiError, AppState, MessageResponse};
use crate::models::ScanResult;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Detections shown on the stats dashboard
const RECENT_DETECTIONS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub detections_only: bool,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: usize,
    pub entries: Vec<ScanResult>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_signatures: usize,
    pub total_scans: u64,
    pub total_detections: u64,
    pub clean: u64,
    pub skipped: u64,
    pub errors: u64,
    pub detection_rate: f64,
    pub quarantined: usize,
    pub recent_detections: Vec<ScanResult>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state.history.recent(query.limit, query.detections_only)?;
    Ok(Json(HistoryResponse {
        total: entries.len(),
        entries,
    }))
}

pub async fn clear(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let count = state.history.clear()?;
    Ok(MessageResponse::ok(format!("Cleared {} history entries", count)))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.history.stats()?;
    Ok(Json(StatsResponse {
        total_signatures: state.signatures.count()?,
        total_scans: stats.total_scans,
        total_detections: stats.detections,
        clean: stats.clean,
        skipped: stats.skipped,
        errors: stats.errors,
        detection_rate: stats.detection_rate(),
        quarantined: state.quarantine.count()?,
        recent_detections: state.history.recent(RECENT_DETECTIONS, true)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::state_in;
    use super::*;
    use crate::hasher::FileHasher;
    use crate::models::Severity;

    #[tokio::test]
    async fn test_history_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let evil = b"MZ evil bytes";
        state
            .signatures
            .add(&FileHasher::default().hash_bytes(evil), "Trojan.Hist", Severity::High, "test")
            .unwrap();

        let options = state.scan_options(true);
        state.scanner.scan_bytes(evil, "a.exe", &options);
        state.scanner.scan_bytes(b"fine", "b.exe", &options);
        state.scanner.scan_bytes(b"also fine", "c.txt", &state.scan_options(false));

        let Json(all) = list(
            State(state.clone()),
            Query(HistoryQuery {
                limit: 10,
                detections_only: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(all.total, 3);
        // newest first
        assert_eq!(all.entries[0].file_name, "c.txt");

        let Json(stats) = stats(State(state.clone())).await.unwrap();
        assert_eq!(stats.total_scans, 3);
        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.quarantined, 1);
        assert_eq!(stats.recent_detections.len(), 1);
        assert_eq!(stats.recent_detections[0].malware_name.as_deref(), Some("Trojan.Hist"));

        clear(State(state.clone())).await.unwrap();
        assert_eq!(state.history.stats().unwrap().total_scans, 0);
    }
}
