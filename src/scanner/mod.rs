//! Scan pipeline.
//!
//! Split into submodules:
//! - `archive`: ZIP walking with bounded recursion
//! - `entry`: directory traversal and the parallel batch driver
//! - `summary`: batch totals
//!
//! Every artifact goes through the same fixed chain: skip gate, fingerprint,
//! signature lookup, pattern rules, clean. Each terminal outcome is written
//! to the history sink exactly once, and detections are handed to the
//! quarantine manager when auto-quarantine is on.

mod archive;
mod entry;
mod summary;

pub use summary::ScanSummary;

use crate::config::{ExtensionSet, DEFAULT_MAX_ARCHIVE_DEPTH, DEFAULT_MAX_CONTENT_BYTES};
use crate::errors::{MalguardError, MalguardResult};
use crate::hasher::{normalize_hash, FileHasher};
use crate::models::{ArtifactInfo, HashLookup, ScanResult, Verdict};
use crate::quarantine::QuarantineManager;
use crate::storage::{HistorySink, SignatureStore};
use crate::yara::PatternMatcher;
use std::path::Path;
use std::sync::Arc;

/// Per-call scan policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Skip (and do not hash) files outside the suspicious extension set
    pub skip_non_suspicious: bool,
    /// Open archives and scan their members instead of the container
    pub scan_archives: bool,
    pub max_archive_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_non_suspicious: true,
            scan_archives: true,
            max_archive_depth: DEFAULT_MAX_ARCHIVE_DEPTH,
        }
    }
}

/// A plain artifact yields one result; an archive yields one per member
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Single(ScanResult),
    Archive(Vec<ScanResult>),
}

impl ScanOutcome {
    pub fn into_results(self) -> Vec<ScanResult> {
        match self {
            ScanOutcome::Single(result) => vec![result],
            ScanOutcome::Archive(results) => results,
        }
    }

    pub fn any_detected(&self) -> bool {
        match self {
            ScanOutcome::Single(result) => result.detected,
            ScanOutcome::Archive(results) => results.iter().any(|r| r.detected),
        }
    }
}

/// Where the bytes of the artifact under inspection live
#[derive(Clone, Copy)]
pub(crate) enum Source<'a> {
    Disk(&'a Path),
    Memory(&'a [u8]),
}

pub struct Scanner {
    signatures: Arc<dyn SignatureStore>,
    history: Arc<dyn HistorySink>,
    pattern_matcher: Option<Arc<dyn PatternMatcher>>,
    quarantine: Option<Arc<QuarantineManager>>,
    auto_quarantine: bool,
    suspicious: ExtensionSet,
    archives: ExtensionSet,
    hasher: FileHasher,
    max_entry_bytes: u64,
}

impl Scanner {
    pub fn new(signatures: Arc<dyn SignatureStore>, history: Arc<dyn HistorySink>) -> Self {
        Self {
            signatures,
            history,
            pattern_matcher: None,
            quarantine: None,
            auto_quarantine: false,
            suspicious: ExtensionSet::suspicious(),
            archives: ExtensionSet::archives(),
            hasher: FileHasher::default(),
            max_entry_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }

    pub fn with_pattern_matcher(mut self, matcher: Option<Arc<dyn PatternMatcher>>) -> Self {
        self.pattern_matcher = matcher;
        self
    }

    /// Attach a quarantine manager and turn auto-quarantine on
    pub fn with_quarantine(mut self, manager: Arc<QuarantineManager>) -> Self {
        self.quarantine = Some(manager);
        self.auto_quarantine = true;
        self
    }

    pub fn with_auto_quarantine(mut self, enabled: bool) -> Self {
        self.auto_quarantine = enabled;
        self
    }

    pub fn with_suspicious_extensions(mut self, extensions: ExtensionSet) -> Self {
        self.suspicious = extensions;
        self
    }

    /// Largest archive or archive member read into memory
    pub fn with_max_entry_bytes(mut self, limit: u64) -> Self {
        self.max_entry_bytes = limit;
        self
    }

    pub fn pattern_matching_available(&self) -> bool {
        self.pattern_matcher.as_ref().map(|m| m.is_available()).unwrap_or(false)
    }

    pub fn is_archive_name(&self, file_name: &str) -> bool {
        self.archives.contains(&crate::models::extension_of(file_name))
    }

    /// Scan an in-memory artifact such as an upload
    pub fn scan_bytes(&self, data: &[u8], file_name: &str, options: &ScanOptions) -> ScanOutcome {
        let info = ArtifactInfo::new(file_name, display_name(file_name), data.len() as u64);

        if options.scan_archives && self.archives.contains(&info.extension) {
            let results = self.scan_archive(data, file_name, options, 0);
            if !results.is_empty() {
                return ScanOutcome::Archive(results);
            }
            log::debug!("{} yielded no members; scanning it as a plain file", file_name);
        }

        ScanOutcome::Single(self.scan_source(info, Source::Memory(data), options))
    }

    /// Scan a file on disk. Detections are moved into quarantine when
    /// auto-quarantine is on.
    pub fn scan_file(&self, path: &Path, options: &ScanOptions) -> MalguardResult<ScanOutcome> {
        if !path.is_file() {
            return Err(MalguardError::NotFound(format!("{} is not a file", path.display())));
        }
        let size = std::fs::metadata(path).map_err(|e| MalguardError::io(e, path.to_path_buf()))?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let artifact_path = path.display().to_string();
        let info = ArtifactInfo::new(artifact_path.clone(), name, size);

        if options.scan_archives && self.archives.contains(&info.extension) {
            if size > self.max_entry_bytes {
                log::warn!("{} is too large to open as an archive ({} bytes)", artifact_path, size);
            } else {
                match std::fs::read(path) {
                    Ok(data) => {
                        let results = self.scan_archive(&data, &artifact_path, options, 0);
                        if !results.is_empty() {
                            return Ok(ScanOutcome::Archive(results));
                        }
                    }
                    Err(e) => log::warn!("Cannot read archive {}: {}", artifact_path, e),
                }
            }
        }

        Ok(ScanOutcome::Single(self.scan_source(info, Source::Disk(path), options)))
    }

    /// Signature lookup for a bare hash; nothing is logged or quarantined
    pub fn check_hash(&self, hash: &str) -> MalguardResult<HashLookup> {
        let hash = normalize_hash(hash);
        let record = self.signatures.get(&hash)?;
        Ok(HashLookup {
            detected: record.is_some(),
            reason: if record.is_some() { "signature_match" } else { "not_found" }.to_string(),
            malware_name: record.as_ref().map(|r| r.name.clone()),
            severity: record.map(|r| r.severity),
            hash,
            timestamp: chrono::Local::now(),
        })
    }

    /// Inspect, then log and quarantine
    pub(crate) fn scan_source(&self, info: ArtifactInfo, source: Source<'_>, options: &ScanOptions) -> ScanResult {
        let result = self.inspect(info, source, options);
        self.finish(result, source)
    }

    fn inspect(&self, info: ArtifactInfo, source: Source<'_>, options: &ScanOptions) -> ScanResult {
        if options.skip_non_suspicious && !self.suspicious.contains(&info.extension) {
            return ScanResult::new(info, None, Verdict::Skipped);
        }

        let hash = match source {
            Source::Disk(path) => self.hasher.hash_file(path),
            Source::Memory(data) => Ok(self.hasher.hash_bytes(data)),
        };
        let hash = match hash {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("Cannot fingerprint {}: {}", info.artifact_path, e);
                return ScanResult::new(info, None, Verdict::HashError);
            }
        };

        let verdict = self.resolve(&hash, &info, source);
        ScanResult::new(info, Some(hash), verdict)
    }

    /// Signature lookup first, then pattern rules. A store that cannot answer
    /// yields `hash_error` rather than a clean verdict.
    fn resolve(&self, hash: &str, info: &ArtifactInfo, source: Source<'_>) -> Verdict {
        match self.signatures.get(hash) {
            Ok(Some(record)) => {
                return Verdict::SignatureMatch {
                    name: record.name,
                    severity: record.severity,
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Signature lookup failed for {}: {}", info.artifact_path, e);
                return Verdict::HashError;
            }
        }

        let Some(matcher) = self.pattern_matcher.as_ref().filter(|m| m.is_available()) else {
            return Verdict::Clean;
        };

        let rule = match source {
            Source::Memory(data) => matcher.match_bytes(data),
            Source::Disk(_) if info.file_size > self.max_entry_bytes => {
                log::debug!("{} too large for pattern rules", info.artifact_path);
                None
            }
            Source::Disk(path) => matcher.match_file(path),
        };

        match rule {
            Some(rule) => Verdict::PatternMatch { rule },
            None => Verdict::Clean,
        }
    }

    /// Terminal side effects: one history record, then quarantine for detections
    pub(crate) fn finish(&self, result: ScanResult, source: Source<'_>) -> ScanResult {
        if let Err(e) = self.history.log(&result) {
            log::warn!("Failed to record scan of {}: {}", result.artifact_path, e);
        }

        if result.detected {
            log::warn!(
                "Detected {} in {} ({})",
                result.malware_name.as_deref().unwrap_or("unknown"),
                result.artifact_path,
                result.reason
            );
            self.quarantine_detection(&result, source);
        } else {
            log::debug!("{}: {}", result.artifact_path, result.reason);
        }
        result
    }

    fn quarantine_detection(&self, result: &ScanResult, source: Source<'_>) {
        let Some(manager) = self.quarantine.as_ref().filter(|_| self.auto_quarantine) else {
            return;
        };
        let (Some(hash), Some(name)) = (result.hash.as_deref(), result.malware_name.as_deref()) else {
            return;
        };
        let severity = result.severity.unwrap_or_default();

        let outcome = match source {
            Source::Disk(path) => manager.quarantine_file(path, hash, name, severity),
            Source::Memory(_) => manager.track(&result.artifact_path, &result.file_name, hash, name, severity),
        };
        if let Err(e) = outcome {
            log::error!("Quarantine of {} failed: {}", result.artifact_path, e);
        }
    }
}

/// Last path component of a possibly nested name
fn display_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}
