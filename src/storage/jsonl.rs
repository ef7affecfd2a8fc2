//! JSON Lines scan history: one serialized [`ScanResult`] per line.

use super::HistorySink;
use crate::errors::{MalguardError, MalguardResult};
use crate::models::{HistoryStats, ScanResult};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct JsonlHistory {
    path: PathBuf,
    /// serializes appends from the scan worker pool
    append_lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> MalguardResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MalguardError::io(e, parent.to_path_buf()))?;
        }
        Ok(Self {
            path,
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every parseable record in file order. Corrupt lines are skipped.
    fn read_all(&self) -> MalguardResult<Vec<ScanResult>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MalguardError::io(e, self.path.clone())),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| MalguardError::io(e, self.path.clone()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ScanResult>(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::debug!("Skipping history line {}: {}", number + 1, e),
            }
        }
        Ok(records)
    }
}

impl HistorySink for JsonlHistory {
    fn log(&self, result: &ScanResult) -> MalguardResult<()> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let _guard = self.append_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MalguardError::io(e, self.path.clone()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| MalguardError::io(e, self.path.clone()))?;
        Ok(())
    }

    fn recent(&self, limit: usize, detections_only: bool) -> MalguardResult<Vec<ScanResult>> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .filter(|r| !detections_only || r.detected)
            .take(limit)
            .collect())
    }

    fn stats(&self) -> MalguardResult<HistoryStats> {
        let mut stats = HistoryStats::default();
        for record in self.read_all()? {
            stats.record(&record.reason);
        }
        Ok(stats)
    }

    fn clear(&self) -> MalguardResult<usize> {
        let _guard = self.append_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = self.read_all()?.len();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(MalguardError::io(e, self.path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactInfo, Severity, Verdict};

    fn result(name: &str, verdict: Verdict) -> ScanResult {
        ScanResult::new(ArtifactInfo::new(format!("/data/{}", name), name, 10), Some("ab".repeat(32)), verdict)
    }

    #[test]
    fn test_log_and_read_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(dir.path().join("history.jsonl")).unwrap();

        history.log(&result("one.exe", Verdict::Clean)).unwrap();
        history
            .log(&result(
                "two.exe",
                Verdict::SignatureMatch { name: "Trojan.Two".into(), severity: Severity::High },
            ))
            .unwrap();
        history.log(&result("three.txt", Verdict::Skipped)).unwrap();

        let recent = history.recent(10, false).unwrap();
        let names: Vec<_> = recent.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, ["three.txt", "two.exe", "one.exe"]);

        let detections = history.recent(10, true).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].malware_name.as_deref(), Some("Trojan.Two"));

        assert_eq!(history.recent(1, false).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = JsonlHistory::new(&path).unwrap();
        history.log(&result("a.exe", Verdict::Clean)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{truncated").unwrap();
        drop(file);
        history.log(&result("b.exe", Verdict::HashError)).unwrap();

        assert_eq!(history.recent(10, false).unwrap().len(), 2);
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(dir.path().join("history.jsonl")).unwrap();
        history.log(&result("a.exe", Verdict::Clean)).unwrap();
        history.log(&result("b.txt", Verdict::Skipped)).unwrap();
        history.log(&result("c.exe", Verdict::PatternMatch { rule: "Evil".into() })).unwrap();
        history.log(&result("d.exe", Verdict::ExtractionError("bad crc".into()))).unwrap();

        let stats = history.stats().unwrap();
        assert_eq!(stats.total_scans, 4);
        assert_eq!(stats.detections, 1);
        assert_eq!(stats.clean, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 1);

        assert_eq!(history.clear().unwrap(), 4);
        assert_eq!(history.stats().unwrap(), HistoryStats::default());
        assert_eq!(history.clear().unwrap(), 0);
    }
}
