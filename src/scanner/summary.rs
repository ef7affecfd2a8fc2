use crate::models::{Classification, ScanResult};
use serde::Serialize;

/// Totals over one batch of results
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub total: usize,
    pub clean: usize,
    pub detected: usize,
    pub skipped: usize,
    pub errors: usize,
    pub from_archives: usize,
    pub total_bytes: u64,
    /// Percentage of results that were detections
    pub detection_rate: f64,
}

impl ScanSummary {
    pub fn from_results(results: &[ScanResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };

        for result in results {
            summary.total_bytes += result.file_size;
            if result.from_archive.is_some() {
                summary.from_archives += 1;
            }
            match &result.reason {
                r if r.is_detection() => summary.detected += 1,
                r if r.is_error() => summary.errors += 1,
                Classification::Skipped => summary.skipped += 1,
                _ => summary.clean += 1,
            }
        }

        if summary.total > 0 {
            summary.detection_rate = summary.detected as f64 / summary.total as f64 * 100.0;
        }
        summary
    }
}
