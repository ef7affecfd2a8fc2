//! Tamper-evident signature file.
//!
//! On disk: `{"signature": <hex hmac>, "data": {<hash>: {...}}}`. The HMAC is
//! computed over the compact, key-sorted JSON of `data`, so any edit made
//! outside this module invalidates the file.

use super::{record_matches, SignatureStore, SEARCH_LIMIT};
use crate::errors::{MalguardError, MalguardResult};
use crate::hasher::normalize_hash;
use crate::models::{Severity, SignatureRecord};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type HmacSha256 = Hmac<Sha256>;

/// How the file looked when the store was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No file yet
    Missing,
    Verified,
    /// HMAC did not match
    Tampered,
    /// Unparseable or missing `signature`/`data`
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSignature {
    name: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    added_on: String,
    #[serde(default)]
    source: String,
}

impl StoredSignature {
    fn to_record(&self, hash: &str) -> SignatureRecord {
        SignatureRecord {
            hash: hash.to_string(),
            name: self.name.clone(),
            severity: self.severity,
            source: self.source.clone(),
            added_on: self.added_on.clone(),
        }
    }
}

pub struct SignedJsonStore {
    path: PathBuf,
    key: Vec<u8>,
    signatures: Mutex<BTreeMap<String, StoredSignature>>,
    status: LoadStatus,
}

impl SignedJsonStore {
    /// Open (or lazily create) the signed file at `path`.
    ///
    /// A file that fails verification is logged at error level and treated
    /// as empty; check [`SignedJsonStore::load_status`] to surface it.
    pub fn open(path: impl Into<PathBuf>, key: Vec<u8>) -> MalguardResult<Self> {
        let path = path.into();
        let (signatures, status) = match Self::load(&path, &key) {
            Ok(Some(signatures)) => (signatures, LoadStatus::Verified),
            Ok(None) => (BTreeMap::new(), LoadStatus::Missing),
            Err(MalguardError::StoreCorruption(reason)) => {
                log::error!("Signature database {:?} rejected: {}", path, reason);
                let status = if reason.contains("HMAC") { LoadStatus::Tampered } else { LoadStatus::Invalid };
                (BTreeMap::new(), status)
            }
            Err(e) => return Err(e),
        };

        log::debug!("Loaded {} signatures from {:?} ({:?})", signatures.len(), path, status);

        Ok(Self {
            path,
            key,
            signatures: Mutex::new(signatures),
            status,
        })
    }

    pub fn load_status(&self) -> LoadStatus {
        self.status
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path, key: &[u8]) -> MalguardResult<Option<BTreeMap<String, StoredSignature>>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MalguardError::io(e, path.to_path_buf())),
        };

        let document: Value = serde_json::from_str(&raw)
            .map_err(|e| MalguardError::StoreCorruption(format!("not valid JSON: {}", e)))?;

        let (Some(Value::String(stored)), Some(data)) = (document.get("signature"), document.get("data")) else {
            return Err(MalguardError::StoreCorruption("missing signature or data section".to_string()));
        };

        let expected = hex::decode(stored)
            .map_err(|_| MalguardError::StoreCorruption("HMAC is not hex".to_string()))?;
        let mut mac = new_mac(key)?;
        mac.update(canonical_json(data).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| MalguardError::StoreCorruption("HMAC mismatch".to_string()))?;

        let signatures: BTreeMap<String, StoredSignature> = serde_json::from_value(data.clone())
            .map_err(|e| MalguardError::StoreCorruption(format!("bad record: {}", e)))?;

        Ok(Some(
            signatures
                .into_iter()
                .map(|(hash, sig)| (normalize_hash(&hash), sig))
                .collect(),
        ))
    }

    /// Rewrite the whole file: sign, write to a sibling temp file, rename.
    fn save(&self, signatures: &BTreeMap<String, StoredSignature>) -> MalguardResult<()> {
        let data = serde_json::to_value(signatures)?;
        let mut mac = new_mac(&self.key)?;
        mac.update(canonical_json(&data).as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let document = serde_json::json!({
            "signature": signature,
            "data": data,
        });

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| MalguardError::io(e, parent.to_path_buf()))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| MalguardError::io(e, parent.to_path_buf()))?;
        temp.write_all(serde_json::to_string_pretty(&document)?.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|e| MalguardError::io(e.error, self.path.clone()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredSignature>> {
        self.signatures.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn collect<F>(&self, filter: F) -> Vec<SignatureRecord>
    where
        F: Fn(&SignatureRecord) -> bool,
    {
        let mut records: Vec<SignatureRecord> = self
            .lock()
            .iter()
            .map(|(hash, sig)| sig.to_record(hash))
            .filter(|r| filter(r))
            .collect();
        // newest first, matching the relational store
        records.sort_by(|a, b| b.added_on.cmp(&a.added_on).then_with(|| a.hash.cmp(&b.hash)));
        records
    }
}

impl SignatureStore for SignedJsonStore {
    fn add(&self, hash: &str, name: &str, severity: Severity, source: &str) -> MalguardResult<bool> {
        let hash = normalize_hash(hash);
        let mut signatures = self.lock();
        if signatures.contains_key(&hash) {
            log::info!("Signature already exists: {}", name);
            return Ok(false);
        }

        signatures.insert(
            hash.clone(),
            StoredSignature {
                name: name.to_string(),
                severity,
                added_on: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                source: source.to_string(),
            },
        );

        if let Err(e) = self.save(&signatures) {
            signatures.remove(&hash);
            return Err(e);
        }
        log::info!("Added signature: {} ({}...)", name, &hash[..hash.len().min(16)]);
        Ok(true)
    }

    fn remove(&self, hash: &str) -> MalguardResult<bool> {
        let hash = normalize_hash(hash);
        let mut signatures = self.lock();
        let Some(removed) = signatures.remove(&hash) else {
            return Ok(false);
        };

        if let Err(e) = self.save(&signatures) {
            signatures.insert(hash, removed);
            return Err(e);
        }
        log::info!("Removed signature: {}", removed.name);
        Ok(true)
    }

    fn get(&self, hash: &str) -> MalguardResult<Option<SignatureRecord>> {
        let hash = normalize_hash(hash);
        Ok(self.lock().get(&hash).map(|sig| sig.to_record(&hash)))
    }

    fn list(&self, limit: usize, offset: usize) -> MalguardResult<Vec<SignatureRecord>> {
        Ok(self.collect(|_| true).into_iter().skip(offset).take(limit).collect())
    }

    fn search(&self, query: &str) -> MalguardResult<Vec<SignatureRecord>> {
        Ok(self
            .collect(|r| record_matches(r, query))
            .into_iter()
            .take(SEARCH_LIMIT)
            .collect())
    }

    fn filter_by_severity(&self, severity: Severity) -> MalguardResult<Vec<SignatureRecord>> {
        Ok(self.collect(|r| r.severity == severity))
    }

    fn count(&self) -> MalguardResult<usize> {
        Ok(self.lock().len())
    }

    fn clear(&self) -> MalguardResult<usize> {
        let mut signatures = self.lock();
        let previous = std::mem::take(&mut *signatures);
        if let Err(e) = self.save(&signatures) {
            *signatures = previous;
            return Err(e);
        }
        Ok(previous.len())
    }
}

fn new_mac(key: &[u8]) -> MalguardResult<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| MalguardError::external("HMAC key", e.to_string()))
}

/// Compact JSON with object keys sorted at every level
fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, sorted(v))).collect();
                Value::Object(ordered.into_iter().map(|(k, v)| (k.clone(), v)).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-key";

    fn hash(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[test]
    fn test_add_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");

        let store = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();
        assert_eq!(store.load_status(), LoadStatus::Missing);
        assert!(store.add(&hash('A'), "Trojan.Test", Severity::Critical, "cli").unwrap());
        assert!(!store.add(&hash('a'), "Trojan.Dup", Severity::Low, "cli").unwrap());

        let reopened = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();
        assert_eq!(reopened.load_status(), LoadStatus::Verified);
        let record = reopened.get(&hash('A')).unwrap().unwrap();
        assert_eq!(record.hash, hash('a'));
        assert_eq!(record.name, "Trojan.Test");
        assert_eq!(record.severity, Severity::Critical);
    }

    #[test]
    fn test_edited_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        let store = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();
        store.add(&hash('b'), "Worm.Test", Severity::High, "cli").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("Worm.Test", "Harmless")).unwrap();

        let reopened = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();
        assert_eq!(reopened.load_status(), LoadStatus::Tampered);
        assert_eq!(reopened.count().unwrap(), 0);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        SignedJsonStore::open(&path, KEY.to_vec())
            .unwrap()
            .add(&hash('c'), "Backdoor.Test", Severity::Medium, "cli")
            .unwrap();

        let other = SignedJsonStore::open(&path, b"other-key".to_vec()).unwrap();
        assert_eq!(other.load_status(), LoadStatus::Tampered);
    }

    #[test]
    fn test_garbage_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();
        assert_eq!(store.load_status(), LoadStatus::Invalid);
    }

    #[test]
    fn test_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignedJsonStore::open(dir.path().join("s.json"), KEY.to_vec()).unwrap();
        store.add(&hash('1'), "Trojan.Alpha", Severity::High, "cli").unwrap();
        store.add(&hash('2'), "Worm.Beta", Severity::Low, "cli").unwrap();
        store.add(&hash('3'), "Trojan.Gamma", Severity::High, "import").unwrap();

        assert_eq!(store.search("trojan").unwrap().len(), 2);
        assert_eq!(store.search(&hash('2')[..10]).unwrap().len(), 1);
        assert_eq!(store.filter_by_severity(Severity::High).unwrap().len(), 2);
        assert_eq!(store.list(2, 0).unwrap().len(), 2);
        assert_eq!(store.list(10, 2).unwrap().len(), 1);

        assert!(store.remove(&hash('2')).unwrap());
        assert!(!store.remove(&hash('2')).unwrap());
        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = serde_json::json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        assert_eq!(canonical_json(&value), r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_concurrent_adds_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        let store = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();

        std::thread::scope(|scope| {
            for i in 0..16u32 {
                let store = &store;
                scope.spawn(move || {
                    let hash = format!("{:064x}", i);
                    assert!(store.add(&hash, &format!("Trojan.Thread{}", i), Severity::High, "cli").unwrap());
                });
            }
        });
        assert_eq!(store.count().unwrap(), 16);

        let reopened = SignedJsonStore::open(&path, KEY.to_vec()).unwrap();
        assert_eq!(reopened.load_status(), LoadStatus::Verified);
        assert_eq!(reopened.count().unwrap(), 16);
        assert_eq!(reopened.get(&format!("{:064x}", 7)).unwrap().unwrap().name, "Trojan.Thread7");
    }
}
