use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::MalguardError;

/// Threat severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = MalguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(MalguardError::InvalidInput(format!(
                "Invalid severity '{}'. Use: low, medium, high, critical",
                other
            ))),
        }
    }
}

/// Why a scan ended the way it did.
///
/// Serialized as its display string (`"clean"`, `"extraction_error: ..."`)
/// so history rows written by either store read back identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Classification {
    Clean,
    Skipped,
    SignatureMatch,
    PatternMatch,
    HashError,
    ExtractionError(String),
}

impl Classification {
    pub fn is_detection(&self) -> bool {
        matches!(self, Classification::SignatureMatch | Classification::PatternMatch)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Classification::HashError | Classification::ExtractionError(_))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Clean => f.write_str("clean"),
            Classification::Skipped => f.write_str("skipped"),
            Classification::SignatureMatch => f.write_str("signature_match"),
            Classification::PatternMatch => f.write_str("pattern_match"),
            Classification::HashError => f.write_str("hash_error"),
            Classification::ExtractionError(detail) => write!(f, "extraction_error: {}", detail),
        }
    }
}

impl FromStr for Classification {
    type Err = MalguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(detail) = s.strip_prefix("extraction_error") {
            let detail = detail.trim_start_matches(':').trim();
            return Ok(Classification::ExtractionError(detail.to_string()));
        }
        match s {
            "clean" => Ok(Classification::Clean),
            "skipped" => Ok(Classification::Skipped),
            "signature_match" => Ok(Classification::SignatureMatch),
            // older history files call it after the rule engine
            "pattern_match" | "yara_match" => Ok(Classification::PatternMatch),
            "hash_error" => Ok(Classification::HashError),
            other => Err(MalguardError::InvalidInput(format!("Unknown classification '{}'", other))),
        }
    }
}

impl From<Classification> for String {
    fn from(value: Classification) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Classification {
    type Error = MalguardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Outcome of the detection chain, before it is stamped onto a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Skipped,
    HashError,
    ExtractionError(String),
    SignatureMatch { name: String, severity: Severity },
    PatternMatch { rule: String },
}

/// Identity of one inspected artifact, on disk or inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub artifact_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub extension: String,
    pub parent_archive: Option<String>,
}

impl ArtifactInfo {
    pub fn new(artifact_path: impl Into<String>, file_name: impl Into<String>, file_size: u64) -> Self {
        let file_name = file_name.into();
        let extension = extension_of(&file_name);
        Self {
            artifact_path: artifact_path.into(),
            file_name,
            file_size,
            extension,
            parent_archive: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_archive = Some(parent.into());
        self
    }
}

/// Lowercased extension with its leading dot, or empty.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// One scanned artifact. Built only through [`ScanResult::new`], which keeps
/// `detected`, `malware_name` and `severity` consistent with the
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub artifact_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub extension: String,
    pub hash: Option<String>,
    pub detected: bool,
    pub malware_name: Option<String>,
    pub severity: Option<Severity>,
    pub reason: Classification,
    pub timestamp: DateTime<Local>,
    pub from_archive: Option<String>,
}

impl ScanResult {
    pub fn new(info: ArtifactInfo, hash: Option<String>, verdict: Verdict) -> Self {
        let (reason, malware_name, severity) = match verdict {
            Verdict::Clean => (Classification::Clean, None, None),
            Verdict::Skipped => (Classification::Skipped, None, None),
            Verdict::HashError => (Classification::HashError, None, None),
            Verdict::ExtractionError(detail) => (Classification::ExtractionError(detail), None, None),
            Verdict::SignatureMatch { name, severity } => {
                (Classification::SignatureMatch, Some(name), Some(severity))
            }
            // rules carry no severity metadata
            Verdict::PatternMatch { rule } => (Classification::PatternMatch, Some(rule), Some(Severity::Medium)),
        };

        Self {
            artifact_path: info.artifact_path,
            file_name: info.file_name,
            file_size: info.file_size,
            extension: info.extension,
            hash,
            detected: reason.is_detection(),
            malware_name,
            severity,
            reason,
            timestamp: Local::now(),
            from_archive: info.parent_archive,
        }
    }
}

/// Known-bad hash entry owned by a signature store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub hash: String,
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub added_on: String,
}

fn default_source() -> String {
    "user".to_string()
}

/// Result of a bare hash lookup, no bytes involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashLookup {
    pub hash: String,
    pub detected: bool,
    pub malware_name: Option<String>,
    pub severity: Option<Severity>,
    pub reason: String,
    pub timestamp: DateTime<Local>,
}

/// Manifest record for an isolated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub original_path: Option<String>,
    pub original_name: String,
    pub file_hash: String,
    /// Where the isolated bytes live; absent for metadata-only entries
    #[serde(default)]
    pub quarantine_path: Option<PathBuf>,
    pub malware_name: String,
    #[serde(default)]
    pub severity: Severity,
    pub quarantined_on: String,
}

/// Entry paired with its composite key, as listed to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineListing {
    pub key: String,
    #[serde(flatten)]
    pub entry: QuarantineEntry,
}

/// Aggregate counts over the history sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_scans: u64,
    pub detections: u64,
    pub clean: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl HistoryStats {
    pub fn record(&mut self, reason: &Classification) {
        self.total_scans += 1;
        match reason {
            Classification::SignatureMatch | Classification::PatternMatch => self.detections += 1,
            Classification::Clean => self.clean += 1,
            Classification::Skipped => self.skipped += 1,
            Classification::HashError | Classification::ExtractionError(_) => self.errors += 1,
        }
    }

    pub fn detection_rate(&self) -> f64 {
        if self.total_scans == 0 {
            return 0.0;
        }
        self.detections as f64 / self.total_scans as f64 * 100.0
    }
}
