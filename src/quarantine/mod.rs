//! Quarantine manager.
//!
//! Detected artifacts are moved into an isolation directory and recorded in
//! `manifest.json`, keyed by `<hash>:<sanitized file name>`. Every
//! load-mutate-save cycle on the manifest runs under one lock.

use crate::errors::{MalguardError, MalguardResult};
use crate::hasher::{normalize_hash, FileHasher, HashAlgorithm};
use crate::models::{QuarantineEntry, QuarantineListing, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    files: BTreeMap<String, QuarantineEntry>,
    #[serde(default)]
    metadata: ManifestMeta,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestMeta {
    #[serde(default)]
    created: String,
    #[serde(default)]
    updated: String,
}

/// What `quarantine_file`/`track` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineOutcome {
    Quarantined { key: String },
    /// Key already in the manifest; nothing changed
    AlreadyQuarantined { key: String },
}

impl QuarantineOutcome {
    pub fn key(&self) -> &str {
        match self {
            QuarantineOutcome::Quarantined { key } | QuarantineOutcome::AlreadyQuarantined { key } => key,
        }
    }
}

/// What `restore` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { key: String, path: PathBuf },
    /// Isolated bytes were missing; the entry was dropped
    AlreadyGone { key: String },
}

pub struct QuarantineManager {
    dir: PathBuf,
    manifest_path: PathBuf,
    lock: Mutex<()>,
}

impl QuarantineManager {
    pub fn new(dir: impl Into<PathBuf>) -> MalguardResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| MalguardError::io(e, dir.clone()))?;
        Ok(Self {
            manifest_path: dir.join(MANIFEST_NAME),
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `path` into isolation and record it.
    ///
    /// A missing source or a failed move leaves the manifest untouched.
    pub fn quarantine_file(
        &self,
        path: &Path,
        hash: &str,
        malware_name: &str,
        severity: Severity,
    ) -> MalguardResult<QuarantineOutcome> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let hash = normalize_hash(hash);
        let key = composite_key(&hash, &original_name);

        let _guard = self.guard();
        let mut manifest = self.load()?;
        if manifest.files.contains_key(&key) {
            log::info!("{} is already quarantined", key);
            return Ok(QuarantineOutcome::AlreadyQuarantined { key });
        }

        if !path.is_file() {
            return Err(MalguardError::NotFound(format!("{} is not a file", path.display())));
        }

        let destination = self.dir.join(storage_name(&hash, &key));
        move_file(&path, &destination)?;

        manifest.files.insert(
            key.clone(),
            QuarantineEntry {
                original_path: Some(path.to_string_lossy().into_owned()),
                original_name,
                file_hash: hash,
                quarantine_path: Some(destination.clone()),
                malware_name: malware_name.to_string(),
                severity,
                quarantined_on: now_iso(),
            },
        );

        if let Err(e) = self.save(&mut manifest) {
            // put the file back so disk and manifest agree
            if let Err(undo) = move_file(&destination, &path) {
                log::error!("Could not return {:?} after manifest failure: {}", path, undo);
            }
            return Err(e);
        }

        log::warn!("Quarantined {:?} ({})", path, malware_name);
        Ok(QuarantineOutcome::Quarantined { key })
    }

    /// Record a detection that has no file on disk (uploads, archive members)
    pub fn track(
        &self,
        artifact_path: &str,
        file_name: &str,
        hash: &str,
        malware_name: &str,
        severity: Severity,
    ) -> MalguardResult<QuarantineOutcome> {
        let hash = normalize_hash(hash);
        let key = composite_key(&hash, file_name);

        let _guard = self.guard();
        let mut manifest = self.load()?;
        if manifest.files.contains_key(&key) {
            return Ok(QuarantineOutcome::AlreadyQuarantined { key });
        }

        manifest.files.insert(
            key.clone(),
            QuarantineEntry {
                original_path: Some(artifact_path.to_string()),
                original_name: file_name.to_string(),
                file_hash: hash,
                quarantine_path: None,
                malware_name: malware_name.to_string(),
                severity,
                quarantined_on: now_iso(),
            },
        );
        self.save(&mut manifest)?;

        log::info!("Tracking in-memory detection {} ({})", artifact_path, malware_name);
        Ok(QuarantineOutcome::Quarantined { key })
    }

    /// Resolve an identifier to its composite key
    pub fn resolve(&self, ident: &str) -> MalguardResult<String> {
        let _guard = self.guard();
        resolve_key(&self.load()?, ident)
    }

    pub fn get(&self, ident: &str) -> MalguardResult<QuarantineListing> {
        let _guard = self.guard();
        let mut manifest = self.load()?;
        let key = resolve_key(&manifest, ident)?;
        let entry = manifest
            .files
            .remove(&key)
            .ok_or_else(|| MalguardError::NotFound(ident.to_string()))?;
        Ok(QuarantineListing { key, entry })
    }

    /// Move isolated bytes back to `target` (or the recorded original path)
    pub fn restore(&self, ident: &str, target: Option<&Path>) -> MalguardResult<RestoreOutcome> {
        let _guard = self.guard();
        let mut manifest = self.load()?;
        let key = resolve_key(&manifest, ident)?;
        let entry = manifest.files[&key].clone();

        let stored = match &entry.quarantine_path {
            Some(p) if p.is_file() => p.clone(),
            _ => {
                manifest.files.remove(&key);
                self.save(&mut manifest)?;
                log::info!("Isolated bytes for {} are gone; entry dropped", key);
                return Ok(RestoreOutcome::AlreadyGone { key });
            }
        };

        let destination = match (target, &entry.original_path) {
            (Some(t), _) => t.to_path_buf(),
            (None, Some(original)) => PathBuf::from(original),
            (None, None) => {
                return Err(MalguardError::InvalidInput(format!(
                    "{} has no original path; pass a destination",
                    key
                )))
            }
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MalguardError::io(e, parent.to_path_buf()))?;
        }
        move_file(&stored, &destination)?;

        manifest.files.remove(&key);
        self.save(&mut manifest)?;

        log::info!("Restored {} to {:?}", key, destination);
        Ok(RestoreOutcome::Restored { key, path: destination })
    }

    /// Purge isolated bytes and drop the entry; returns the removed key
    pub fn delete(&self, ident: &str) -> MalguardResult<String> {
        let _guard = self.guard();
        let mut manifest = self.load()?;
        let key = resolve_key(&manifest, ident)?;

        if let Some(stored) = &manifest.files[&key].quarantine_path {
            match std::fs::remove_file(stored) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(MalguardError::io(e, stored.clone())),
            }
        }

        manifest.files.remove(&key);
        self.save(&mut manifest)?;
        log::info!("Deleted quarantined {}", key);
        Ok(key)
    }

    pub fn list(&self) -> MalguardResult<Vec<QuarantineListing>> {
        let _guard = self.guard();
        Ok(self
            .load()?
            .files
            .into_iter()
            .map(|(key, entry)| QuarantineListing { key, entry })
            .collect())
    }

    pub fn count(&self) -> MalguardResult<usize> {
        let _guard = self.guard();
        Ok(self.load()?.files.len())
    }

    /// Drop every entry. Unlink failures are logged and ignored.
    pub fn clear(&self) -> MalguardResult<usize> {
        let _guard = self.guard();
        let mut manifest = self.load()?;
        let count = manifest.files.len();

        for (key, entry) in std::mem::take(&mut manifest.files) {
            if let Some(stored) = entry.quarantine_path {
                if let Err(e) = std::fs::remove_file(&stored) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("Could not purge {:?} for {}: {}", stored, key, e);
                    }
                }
            }
        }

        self.save(&mut manifest)?;
        Ok(count)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> MalguardResult<Manifest> {
        match std::fs::read_to_string(&self.manifest_path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest {
                metadata: ManifestMeta {
                    created: now_iso(),
                    updated: String::new(),
                },
                ..Default::default()
            }),
            Err(e) => Err(MalguardError::io(e, self.manifest_path.clone())),
        }
    }

    fn save(&self, manifest: &mut Manifest) -> MalguardResult<()> {
        manifest.metadata.updated = now_iso();
        let mut temp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| MalguardError::io(e, self.dir.clone()))?;
        temp.write_all(serde_json::to_string_pretty(manifest)?.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.manifest_path)
            .map_err(|e| MalguardError::io(e.error, self.manifest_path.clone()))?;
        Ok(())
    }
}

/// `<hash>:<name>` with path separators and colons in the name replaced
pub fn composite_key(hash: &str, file_name: &str) -> String {
    let safe_name: String = file_name
        .chars()
        .map(|c| if matches!(c, ':' | '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}:{}", hash, safe_name)
}

/// Name of the isolated file for `key`
pub fn storage_name(hash: &str, key: &str) -> String {
    let key_digest = FileHasher::new(HashAlgorithm::Md5).hash_bytes(key.as_bytes());
    let prefix = &hash[..hash.len().min(8)];
    format!("{}_{}.quarantine", prefix, &key_digest[..12])
}

/// Exact key, else a unique key-prefix or file-name match
fn resolve_key(manifest: &Manifest, ident: &str) -> MalguardResult<String> {
    if manifest.files.contains_key(ident) {
        return Ok(ident.to_string());
    }

    let lowered = ident.to_lowercase();
    let candidates: Vec<String> = manifest
        .files
        .keys()
        .filter(|key| {
            let name = key.split_once(':').map(|(_, name)| name);
            key.starts_with(&lowered) || name == Some(ident)
        })
        .cloned()
        .collect();

    match candidates.len() {
        0 => Err(MalguardError::NotFound(format!("No quarantined file matches '{}'", ident))),
        1 => Ok(candidates.into_iter().next().unwrap_or_default()),
        _ => Err(MalguardError::Ambiguous {
            ident: ident.to_string(),
            candidates,
        }),
    }
}

/// Rename, or copy-then-unlink across filesystems
fn move_file(from: &Path, to: &Path) -> MalguardResult<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| MalguardError::io(e, from.to_path_buf()))?;
    if let Err(e) = std::fs::remove_file(from) {
        let _ = std::fs::remove_file(to);
        return Err(MalguardError::io(e, from.to_path_buf()));
    }
    Ok(())
}

fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "3f2a9c1e00000000000000000000000000000000000000000000000000000000";

    fn setup() -> (tempfile::TempDir, QuarantineManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = QuarantineManager::new(dir.path().join("quarantine")).unwrap();
        (dir, manager)
    }

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_composite_key_and_storage_name() {
        assert_eq!(composite_key("ab", "C:\\x/y:z.exe"), "ab:C__x_y_z.exe");
        let name = storage_name(HASH, &composite_key(HASH, "a.exe"));
        assert!(name.starts_with("3f2a9c1e_"));
        assert!(name.ends_with(".quarantine"));
        assert_eq!(name.len(), "3f2a9c1e_".len() + 12 + ".quarantine".len());
    }

    #[test]
    fn test_quarantine_is_idempotent() {
        let (dir, manager) = setup();
        let path = write(dir.path(), "evil.exe", b"MZ payload");

        let first = manager.quarantine_file(&path, HASH, "Trojan.X", Severity::Critical).unwrap();
        assert!(matches!(first, QuarantineOutcome::Quarantined { .. }));
        assert!(!path.exists());

        // same content back under the same name
        write(dir.path(), "evil.exe", b"MZ payload");
        let second = manager.quarantine_file(&path, HASH, "Trojan.X", Severity::Critical).unwrap();
        assert_eq!(second, QuarantineOutcome::AlreadyQuarantined { key: first.key().to_string() });
        assert_eq!(manager.count().unwrap(), 1);
    }

    #[test]
    fn test_missing_source_leaves_manifest_alone() {
        let (dir, manager) = setup();
        let err = manager
            .quarantine_file(&dir.path().join("gone.exe"), HASH, "Trojan.X", Severity::High)
            .unwrap_err();
        assert!(matches!(err, MalguardError::NotFound(_)));
        assert_eq!(manager.count().unwrap(), 0);
    }

    #[test]
    fn test_restore_round_trip() {
        let (dir, manager) = setup();
        let bytes = b"\x4d\x5a\x90\x00 original bytes".to_vec();
        let path = write(dir.path(), "dropper.exe", &bytes);
        manager.quarantine_file(&path, HASH, "Dropper", Severity::High).unwrap();

        let outcome = manager.restore(&HASH[..8], None).unwrap();
        let RestoreOutcome::Restored { path: restored, .. } = outcome else {
            panic!("expected restore");
        };
        assert_eq!(std::fs::read(&restored).unwrap(), bytes);
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_restore_to_override_creates_parents() {
        let (dir, manager) = setup();
        let path = write(dir.path(), "a.exe", b"data");
        manager.quarantine_file(&path, HASH, "X", Severity::Low).unwrap();

        let target = dir.path().join("restored").join("deep").join("a.exe");
        manager.restore("a.exe", Some(&target)).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn test_restore_after_external_removal_drops_entry() {
        let (dir, manager) = setup();
        let path = write(dir.path(), "a.exe", b"data");
        manager.quarantine_file(&path, HASH, "X", Severity::Low).unwrap();

        let entry = manager.get("a.exe").unwrap();
        std::fs::remove_file(entry.entry.quarantine_path.unwrap()).unwrap();

        let outcome = manager.restore("a.exe", None).unwrap();
        assert!(matches!(outcome, RestoreOutcome::AlreadyGone { .. }));
        assert_eq!(manager.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_tolerates_missing_bytes() {
        let (dir, manager) = setup();
        let path = write(dir.path(), "a.exe", b"data");
        let key = manager.quarantine_file(&path, HASH, "X", Severity::Low).unwrap();

        let stored = manager.get(key.key()).unwrap().entry.quarantine_path.unwrap();
        std::fs::remove_file(&stored).unwrap();

        assert_eq!(manager.delete(key.key()).unwrap(), key.key());
        assert_eq!(manager.count().unwrap(), 0);
        assert!(matches!(manager.delete(key.key()), Err(MalguardError::NotFound(_))));
    }

    #[test]
    fn test_same_hash_different_names_are_separate_and_ambiguous() {
        let (dir, manager) = setup();
        let a = write(dir.path(), "a.exe", b"same");
        let b = write(dir.path(), "b.exe", b"same");
        manager.quarantine_file(&a, HASH, "X", Severity::High).unwrap();
        manager.quarantine_file(&b, HASH, "X", Severity::High).unwrap();
        assert_eq!(manager.count().unwrap(), 2);

        match manager.restore(&HASH[..6], None) {
            Err(MalguardError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
        // nothing moved
        assert_eq!(manager.count().unwrap(), 2);

        // the file name disambiguates
        manager.restore("b.exe", None).unwrap();
        assert_eq!(std::fs::read(&b).unwrap(), b"same");
    }

    #[test]
    fn test_track_and_clear() {
        let (dir, manager) = setup();
        let path = write(dir.path(), "a.exe", b"data");
        manager.quarantine_file(&path, HASH, "X", Severity::Low).unwrap();
        let tracked = manager
            .track("upload.zip/inner.exe", "inner.exe", &HASH.to_uppercase(), "Y", Severity::High)
            .unwrap();
        assert_eq!(tracked.key(), format!("{}:inner.exe", HASH));

        let listing = manager.get("inner.exe").unwrap();
        assert!(listing.entry.quarantine_path.is_none());

        let files_before = std::fs::read_dir(manager.dir()).unwrap().count();
        assert_eq!(manager.clear().unwrap(), 2);
        assert_eq!(manager.count().unwrap(), 0);
        // only the manifest remains
        assert!(std::fs::read_dir(manager.dir()).unwrap().count() < files_before);
    }

    #[test]
    fn test_concurrent_operations_share_one_manifest() {
        let (dir, manager) = setup();
        let files: Vec<PathBuf> = (0..16)
            .map(|i| write(dir.path(), &format!("sample{:02}.exe", i), format!("payload {}", i).as_bytes()))
            .collect();

        let keys: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = files
                .iter()
                .enumerate()
                .map(|(i, path)| {
                    let manager = &manager;
                    scope.spawn(move || {
                        let hash = format!("{:064x}", i + 1);
                        let outcome = manager.quarantine_file(path, &hash, "Trojan.Batch", Severity::High).unwrap();
                        outcome.key().to_string()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(manager.count().unwrap(), 16);
        assert!(files.iter().all(|path| !path.exists()));

        // restores, deletes and new tracks racing on the same manifest
        std::thread::scope(|scope| {
            for (i, key) in keys.iter().enumerate() {
                let manager = &manager;
                scope.spawn(move || {
                    if i % 2 == 0 {
                        assert!(matches!(manager.restore(key, None).unwrap(), RestoreOutcome::Restored { .. }));
                    } else {
                        assert_eq!(&manager.delete(key).unwrap(), key);
                    }
                });
                scope.spawn(move || {
                    let name = format!("upload{:02}.exe", i);
                    manager
                        .track(&format!("batch.zip/{}", name), &name, HASH, "Worm.Upload", Severity::Low)
                        .unwrap();
                });
            }
        });

        let remaining = manager.list().unwrap();
        assert_eq!(remaining.len(), 16);
        assert!(remaining.iter().all(|listing| listing.entry.quarantine_path.is_none()));
        for (i, path) in files.iter().enumerate() {
            assert_eq!(path.exists(), i % 2 == 0);
        }
    }
}
