//! Signature import/export documents.
//!
//! Export always writes `{"signatures": {hash: record}, "metadata": {...}}`.
//! Import accepts that wrapper, a bare `{hash: record}` map, or a list of
//! records carrying their own `hash` field.

use super::SignatureStore;
use crate::errors::{MalguardError, MalguardResult};
use crate::hasher::{is_sha256_hex, normalize_hash};
use crate::models::Severity;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;

/// Page size used when walking a store for export
const EXPORT_PAGE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    /// Duplicates plus entries without a usable hash or name
    pub skipped: usize,
}

/// Build the export document for every signature in `store`
pub fn export_document(store: &dyn SignatureStore) -> MalguardResult<Value> {
    let mut signatures = Map::new();
    let mut offset = 0;
    loop {
        let page = store.list(EXPORT_PAGE, offset)?;
        if page.is_empty() {
            break;
        }
        offset += page.len();
        for record in page {
            signatures.insert(
                record.hash.clone(),
                json!({
                    "name": record.name,
                    "severity": record.severity,
                    "source": record.source,
                    "added_on": record.added_on,
                }),
            );
        }
    }

    let total = signatures.len();
    Ok(json!({
        "signatures": signatures,
        "metadata": {
            "exported_on": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            "total": total,
            "source": "malguard",
        }
    }))
}

/// Write every signature to `path`; returns how many were written
pub fn export_signatures(store: &dyn SignatureStore, path: &Path) -> MalguardResult<usize> {
    let document = export_document(store)?;
    let total = document["metadata"]["total"].as_u64().unwrap_or_default() as usize;

    std::fs::write(path, serde_json::to_string_pretty(&document)?)
        .map_err(|e| MalguardError::io(e, path.to_path_buf()))?;
    log::info!("Exported {} signatures to {:?}", total, path);
    Ok(total)
}

/// Read a signature document from disk and merge it into `store`
pub fn import_signatures(store: &dyn SignatureStore, path: &Path) -> MalguardResult<ImportReport> {
    let raw = std::fs::read_to_string(path).map_err(|e| MalguardError::io(e, path.to_path_buf()))?;
    let document: Value = serde_json::from_str(&raw)?;
    let report = import_document(store, &document)?;
    log::info!(
        "Imported {} signatures from {:?} ({} skipped)",
        report.added,
        path,
        report.skipped
    );
    Ok(report)
}

/// Merge an already-parsed document. Existing hashes are left untouched.
pub fn import_document(store: &dyn SignatureStore, document: &Value) -> MalguardResult<ImportReport> {
    let body = match document {
        Value::Object(map) => map.get("signatures").unwrap_or(document),
        other => other,
    };

    let entries: Vec<(Option<String>, &Value)> = match body {
        Value::Object(map) => map.iter().map(|(hash, v)| (Some(hash.clone()), v)).collect(),
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        _ => {
            return Err(MalguardError::InvalidInput(
                "signature document must be an object or a list".to_string(),
            ))
        }
    };

    let mut report = ImportReport::default();
    for (key, entry) in entries {
        let hash = key.or_else(|| entry.get("hash").and_then(Value::as_str).map(str::to_string));
        let name = entry.get("name").and_then(Value::as_str);

        let (Some(hash), Some(name)) = (hash, name) else {
            report.skipped += 1;
            continue;
        };
        let hash = normalize_hash(&hash);
        if !is_sha256_hex(&hash) || name.trim().is_empty() {
            report.skipped += 1;
            continue;
        }

        let severity = entry
            .get("severity")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Severity>().ok())
            .unwrap_or_default();
        let source = entry.get("source").and_then(Value::as_str).unwrap_or("import");

        if store.add(&hash, name, severity, source)? {
            report.added += 1;
        } else {
            report.skipped += 1;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn digest(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[test]
    fn test_accepts_all_document_shapes() {
        let store = SqliteStore::open_in_memory().unwrap();

        let bare = json!({ digest('A'): { "name": "One", "severity": "high" } });
        assert_eq!(import_document(&store, &bare).unwrap(), ImportReport { added: 1, skipped: 0 });

        let wrapped = json!({
            "signatures": { digest('b'): { "name": "Two" }, digest('a'): { "name": "Dup" } },
            "metadata": { "total": 2 }
        });
        assert_eq!(import_document(&store, &wrapped).unwrap(), ImportReport { added: 1, skipped: 1 });

        let list = json!([
            { "hash": digest('c'), "name": "Three", "severity": "bogus" },
            { "name": "no hash" },
            { "hash": digest('d') }
        ]);
        assert_eq!(import_document(&store, &list).unwrap(), ImportReport { added: 1, skipped: 2 });

        assert_eq!(store.get(&digest('a')).unwrap().unwrap().severity, Severity::High);
        assert_eq!(store.get(&digest('c')).unwrap().unwrap().severity, Severity::Medium);
        assert_eq!(store.get(&digest('b')).unwrap().unwrap().source, "import");
    }

    #[test]
    fn test_malformed_hashes_are_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let list = json!([
            { "hash": "aa", "name": "Too.Short" },
            { "hash": "z".repeat(64), "name": "Not.Hex" },
            { "hash": "0".repeat(40), "name": "Sha1.Length" },
            { "hash": format!("  {}  ", digest('E')), "name": "Padded" }
        ]);

        assert_eq!(import_document(&store, &list).unwrap(), ImportReport { added: 1, skipped: 3 });
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(&digest('e')).unwrap().unwrap().name, "Padded");
        assert!(store.get("aa").unwrap().is_none());
    }

    #[test]
    fn test_rejects_scalar_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(import_document(&store, &json!("nope")).is_err());
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");

        let source = SqliteStore::open_in_memory().unwrap();
        source.add(&"1".repeat(64), "Trojan.A", Severity::Critical, "cli").unwrap();
        source.add(&"2".repeat(64), "Worm.B", Severity::Low, "cli").unwrap();
        assert_eq!(export_signatures(&source, &path).unwrap(), 2);

        let exported: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(exported["metadata"]["total"], 2);

        let target = SqliteStore::open_in_memory().unwrap();
        let report = import_signatures(&target, &path).unwrap();
        assert_eq!(report.added, 2);
        let record = target.get(&"1".repeat(64)).unwrap().unwrap();
        assert_eq!(record.name, "Trojan.A");
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.source, "cli");
    }
}
