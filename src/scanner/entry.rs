//! Entry Processing Module
//!
//! Directory traversal and the parallel batch driver.

use crate::errors::{MalguardError, MalguardResult};
use crate::models::{ArtifactInfo, ScanResult, Verdict};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ScanOptions, Scanner, Source};

impl Scanner {
    /// Collect every regular file under `base_path`
    pub(crate) fn collect_entries(&self, base_path: &Path) -> Vec<PathBuf> {
        log::debug!("Collecting directory entries from: {:?}", base_path);

        let entries: Vec<PathBuf> = WalkDir::new(base_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => {
                    log::trace!("Found entry: {:?}", entry.path());
                    Some(entry)
                }
                Err(e) => {
                    log::warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        log::debug!("Collected {} files", entries.len());
        entries
    }

    /// Scan a file, or every file under a directory.
    ///
    /// Results keep enumeration order. `threads == 0` uses one worker per
    /// CPU. A file that vanishes mid-batch yields a `hash_error` result.
    pub fn scan_path(
        &self,
        path: &Path,
        options: &ScanOptions,
        threads: usize,
        progress: &ProgressBar,
    ) -> MalguardResult<Vec<ScanResult>> {
        if path.is_file() {
            progress.set_length(1);
            let results = self.scan_file(path, options)?.into_results();
            progress.inc(1);
            return Ok(results);
        }
        if !path.is_dir() {
            return Err(MalguardError::NotFound(format!("Path not found: {}", path.display())));
        }

        let files = self.collect_entries(path);
        progress.set_length(files.len() as u64);

        let thread_count = if threads == 0 { num_cpus::get() } else { threads };
        log::info!("Scanning {} files with {} threads", files.len(), thread_count);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build()
            .map_err(|e| MalguardError::external("thread pool", e.to_string()))?;

        let batches: Vec<Vec<ScanResult>> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    progress.set_message(file.display().to_string());
                    let results = match self.scan_file(file, options) {
                        Ok(outcome) => outcome.into_results(),
                        Err(e) => {
                            log::warn!("Failed to scan {:?}: {}", file, e);
                            vec![self.vanished(file)]
                        }
                    };
                    progress.inc(1);
                    results
                })
                .collect()
        });

        Ok(batches.into_iter().flatten().collect())
    }

    fn vanished(&self, file: &Path) -> ScanResult {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let info = ArtifactInfo::new(file.display().to_string(), name, 0);
        self.finish(ScanResult::new(info, None, Verdict::HashError), Source::Disk(file))
    }
}
