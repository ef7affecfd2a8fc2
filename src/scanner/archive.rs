//! ZIP member walking.

use super::{ScanOptions, Scanner, Source};
use crate::models::{ArtifactInfo, ScanResult, Verdict};
use std::io::{Cursor, Read};
use zip::ZipArchive;

impl Scanner {
    /// Scan every file member of the ZIP in `data`.
    ///
    /// Returns nothing when the container cannot be opened or `depth` has
    /// reached the bound; callers then treat the container as a plain file.
    /// Nested archives recurse while `depth + 1 < max_archive_depth`, deeper
    /// ones are scanned as ordinary members. A member that cannot be read
    /// becomes an `extraction_error` result without stopping its siblings.
    pub(crate) fn scan_archive(
        &self,
        data: &[u8],
        archive_name: &str,
        options: &ScanOptions,
        depth: usize,
    ) -> Vec<ScanResult> {
        if depth >= options.max_archive_depth {
            log::debug!("Not descending into {}: depth {} reached", archive_name, depth);
            return Vec::new();
        }

        let mut archive = match ZipArchive::new(Cursor::new(data)) {
            Ok(archive) => archive,
            Err(e) => {
                log::debug!("{} is not a readable archive: {}", archive_name, e);
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            // central directory metadata stays readable for encrypted members
            let raw = archive
                .by_index_raw(index)
                .map(|raw| (raw.is_dir(), raw.name().to_string(), raw.size()));
            let (entry_name, declared_size) = match raw {
                Ok((true, ..)) => continue,
                Ok((false, name, size)) => (name, size),
                Err(_) => (
                    archive
                        .name_for_index(index)
                        .map_or_else(|| format!("#{}", index), str::to_string),
                    0,
                ),
            };

            let content = match archive.by_index(index) {
                Ok(mut entry) => self.read_member(&mut entry, declared_size),
                Err(e) => Err(e.to_string()),
            };

            let member_path = format!("{}/{}", archive_name, entry_name);
            let content = match content {
                Ok(content) => content,
                Err(detail) => {
                    log::warn!("Cannot extract {}: {}", member_path, detail);
                    let info = member_info(&member_path, &entry_name, declared_size, archive_name);
                    let failed = ScanResult::new(info, None, Verdict::ExtractionError(detail));
                    results.push(self.finish(failed, Source::Memory(&[])));
                    continue;
                }
            };

            if self.is_archive_name(&entry_name) && depth + 1 < options.max_archive_depth {
                let nested = self.scan_archive(&content, &member_path, options, depth + 1);
                if !nested.is_empty() {
                    results.extend(nested);
                    continue;
                }
            }

            let info = member_info(&member_path, &entry_name, content.len() as u64, archive_name);
            results.push(self.scan_source(info, Source::Memory(&content), options));
        }

        log::info!("Scanned {} members of {}", results.len(), archive_name);
        results
    }

    /// Read one member, refusing anything past the size limit
    fn read_member<R: Read>(&self, entry: &mut R, declared_size: u64) -> Result<Vec<u8>, String> {
        if declared_size > self.max_entry_bytes {
            return Err(format!("member is {} bytes, limit is {}", declared_size, self.max_entry_bytes));
        }

        let mut content = Vec::with_capacity(declared_size as usize);
        entry
            .take(self.max_entry_bytes + 1)
            .read_to_end(&mut content)
            .map_err(|e| e.to_string())?;
        if content.len() as u64 > self.max_entry_bytes {
            return Err(format!("member expands past {} bytes", self.max_entry_bytes));
        }
        Ok(content)
    }
}

fn member_info(member_path: &str, entry_name: &str, size: u64, archive_name: &str) -> ArtifactInfo {
    let file_name = entry_name.rsplit('/').next().unwrap_or(entry_name);
    ArtifactInfo::new(member_path, file_name, size).with_parent(archive_name)
}
