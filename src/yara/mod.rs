//! Pattern rule engine.
//!
//! The scan pipeline consults an optional [`PatternMatcher`] after the hash
//! lookup misses. The concrete engine is YARA-X, compiled in with the `yara`
//! feature; without it, or with no loadable rules, pattern matching is simply
//! unavailable and scans fall through to clean.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Content matcher consulted after a signature miss.
pub trait PatternMatcher: Send + Sync {
    /// False when no rules are loaded
    fn is_available(&self) -> bool;

    /// Identifier of the first matching rule, if any
    fn match_bytes(&self, data: &[u8]) -> Option<String>;

    /// Same as [`match_bytes`](Self::match_bytes) over a file on disk
    fn match_file(&self, path: &Path) -> Option<String> {
        match std::fs::read(path) {
            Ok(data) => self.match_bytes(&data),
            Err(e) => {
                log::warn!("Cannot read {:?} for pattern rules: {}", path, e);
                None
            }
        }
    }
}

/// Extensions picked up from a rules directory
pub const RULE_EXTENSIONS: &[&str] = &["yar", "yara"];

/// Rule files directly under `dir`, sorted by name
pub fn rule_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| RULE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}

#[cfg(feature = "yara")]
pub use engine::YaraEngine;

#[cfg(feature = "yara")]
mod engine {
    use super::{rule_files, PatternMatcher};
    use crate::errors::{MalguardError, MalguardResult};
    use std::path::Path;
    use std::sync::Arc;
    use yara_x::{Compiler, Rules, Scanner};

    /// YARA-X rules compiled from a directory of `.yar`/`.yara` files
    pub struct YaraEngine {
        /// Compiled rules
        rules: Option<Arc<Rules>>,
        /// Number of rule files that compiled
        file_count: usize,
    }

    impl YaraEngine {
        /// An engine with nothing loaded
        pub fn empty() -> Self {
            Self {
                rules: None,
                file_count: 0,
            }
        }

        /// Compile every rule file in `dir`. Files that fail to compile are
        /// logged and left out; the rest still load.
        pub fn from_dir(dir: &Path) -> MalguardResult<Self> {
            let files = rule_files(dir);

            let mut sources = Vec::with_capacity(files.len());
            for path in &files {
                match std::fs::read_to_string(path) {
                    Ok(text) => {
                        let namespace = path
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or("default")
                            .to_string();
                        sources.push((namespace, text));
                    }
                    Err(e) => log::warn!("Cannot read rule file {:?}: {}", path, e),
                }
            }

            Self::from_sources(sources.iter().map(|(ns, text)| (ns.as_str(), text.as_str())))
        }

        /// Compile `(namespace, source)` pairs
        pub fn from_sources<'a, I>(sources: I) -> MalguardResult<Self>
        where
            I: IntoIterator<Item = (&'a str, &'a str)>,
        {
            let mut compiler = Compiler::new();
            let mut file_count = 0;

            for (namespace, text) in sources {
                compiler.new_namespace(namespace);
                match compiler.add_source(text) {
                    Ok(_) => file_count += 1,
                    Err(e) => log::warn!("Failed to compile rules in '{}': {}", namespace, e),
                }
            }

            if file_count == 0 {
                return Err(MalguardError::PatternRules("no rule file compiled".to_string()));
            }

            let rules = compiler.build();
            log::info!("Loaded {} YARA rule files", file_count);
            Ok(Self {
                rules: Some(Arc::new(rules)),
                file_count,
            })
        }

        pub fn file_count(&self) -> usize {
            self.file_count
        }
    }

    impl PatternMatcher for YaraEngine {
        fn is_available(&self) -> bool {
            self.rules.is_some()
        }

        fn match_bytes(&self, data: &[u8]) -> Option<String> {
            let rules = self.rules.as_ref()?;
            let mut scanner = Scanner::new(rules);
            match scanner.scan(data) {
                Ok(results) => results
                    .matching_rules()
                    .next()
                    .map(|rule| rule.identifier().to_string()),
                Err(e) => {
                    log::warn!("YARA scan failed: {}", e);
                    None
                }
            }
        }

        fn match_file(&self, path: &Path) -> Option<String> {
            let rules = self.rules.as_ref()?;
            let mut scanner = Scanner::new(rules);
            match scanner.scan_file(path) {
                Ok(results) => results
                    .matching_rules()
                    .next()
                    .map(|rule| rule.identifier().to_string()),
                Err(e) => {
                    log::warn!("YARA scan of {:?} failed: {}", path, e);
                    None
                }
            }
        }
    }
}

/// Load whatever rules `dir` holds. Returns `None` when the directory is
/// missing or empty, nothing compiles, or the engine is not built in.
pub fn load_pattern_matcher(dir: &Path) -> Option<Arc<dyn PatternMatcher>> {
    if rule_files(dir).is_empty() {
        log::debug!("No rule files in {:?}", dir);
        return None;
    }

    #[cfg(feature = "yara")]
    {
        match YaraEngine::from_dir(dir) {
            Ok(engine) => Some(Arc::new(engine)),
            Err(e) => {
                log::warn!("Pattern matching disabled: {}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "yara"))]
    {
        log::info!("Built without the yara feature; ignoring rules in {:?}", dir);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_yields_none() {
        assert!(load_pattern_matcher(Path::new("/no/such/rules/dir")).is_none());
    }

    #[test]
    fn test_empty_dir_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_pattern_matcher(dir.path()).is_none());
    }

    #[cfg(feature = "yara")]
    #[test]
    fn test_rules_from_dir_match_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("droppers.yar"),
            r#"rule Test_Dropper { strings: $a = "EVIL_PAYLOAD_MARKER" condition: $a }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a rule").unwrap();

        let matcher = load_pattern_matcher(dir.path()).unwrap();
        assert!(matcher.is_available());
        assert_eq!(
            matcher.match_bytes(b"header EVIL_PAYLOAD_MARKER trailer").as_deref(),
            Some("Test_Dropper")
        );
        assert!(matcher.match_bytes(b"benign content").is_none());

        let sample = dir.path().join("sample.bin");
        std::fs::write(&sample, b"on disk EVIL_PAYLOAD_MARKER").unwrap();
        assert_eq!(matcher.match_file(&sample).as_deref(), Some("Test_Dropper"));
        assert!(matcher.match_file(&dir.path().join("missing.bin")).is_none());
    }

    #[cfg(feature = "yara")]
    #[test]
    fn test_broken_file_does_not_block_others() {
        let engine = YaraEngine::from_sources([
            ("broken", "rule {"),
            ("good", r#"rule Good { strings: $a = "xyz" condition: $a }"#),
        ])
        .unwrap();
        assert_eq!(engine.file_count(), 1);
        assert_eq!(engine.match_bytes(b"..xyz..").as_deref(), Some("Good"));
    }

    #[cfg(feature = "yara")]
    #[test]
    fn test_nothing_compiles_is_an_error() {
        assert!(YaraEngine::from_sources([("broken", "rule {")]).is_err());
        assert!(!YaraEngine::empty().is_available());
    }
}
