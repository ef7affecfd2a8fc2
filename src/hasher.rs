//! Content fingerprinting.
//!
//! Every source, whether an open file or an archive member held in memory,
//! goes through the same chunked reader so identical bytes always produce the
//! same digest.

use crate::errors::{MalguardError, MalguardResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Read buffer size for streaming digests
pub const CHUNK_SIZE: usize = 8192;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    #[value(name = "sha3-256")]
    Sha3_256,
    Blake3,
    Md5,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "SHA-256"),
            HashAlgorithm::Sha3_256 => write!(f, "SHA3-256"),
            HashAlgorithm::Blake3 => write!(f, "BLAKE3"),
            HashAlgorithm::Md5 => write!(f, "MD5"),
        }
    }
}

/// Streaming file hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHasher {
    algorithm: HashAlgorithm,
}

impl FileHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash a file on disk
    pub fn hash_file(&self, path: &Path) -> MalguardResult<String> {
        let file = File::open(path).map_err(|e| MalguardError::io(e, path.to_path_buf()))?;
        self.hash_reader(BufReader::with_capacity(CHUNK_SIZE, file))
            .map_err(|e| match e {
                MalguardError::Io { source, .. } => MalguardError::io(source, path.to_path_buf()),
                other => other,
            })
    }

    /// Hash an in-memory buffer
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        // reading from a slice cannot fail
        self.hash_reader(data).unwrap_or_default()
    }

    /// Hash any byte source in fixed-size chunks; lowercase hex output
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> MalguardResult<String> {
        let mut buffer = [0u8; CHUNK_SIZE];
        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                pump(&mut reader, &mut buffer, |chunk| hasher.update(chunk))?;
                Ok(hex::encode(hasher.finalize()))
            }
            HashAlgorithm::Sha3_256 => {
                let mut hasher = sha3::Sha3_256::new();
                pump(&mut reader, &mut buffer, |chunk| hasher.update(chunk))?;
                Ok(hex::encode(hasher.finalize()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                pump(&mut reader, &mut buffer, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(hex::encode(hasher.finalize().as_bytes()))
            }
            HashAlgorithm::Md5 => {
                let mut hasher = md5::Md5::new();
                pump(&mut reader, &mut buffer, |chunk| hasher.update(chunk))?;
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }
}

fn pump<R: Read>(reader: &mut R, buffer: &mut [u8], mut sink: impl FnMut(&[u8])) -> MalguardResult<()> {
    loop {
        let bytes_read = match reader.read(buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if bytes_read == 0 {
            return Ok(());
        }
        sink(&buffer[..bytes_read]);
    }
}

/// Canonical form used for every store lookup and write
pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_lowercase()
}

/// True for a 64-character hex string
pub fn is_sha256_hex(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_known_digests() {
        let hasher = FileHasher::default();
        assert_eq!(hasher.hash_bytes(b""), EMPTY_SHA256);
        assert_eq!(
            hasher.hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            FileHasher::new(HashAlgorithm::Md5).hash_bytes(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_file_and_buffer_agree() {
        // larger than one chunk so the loop runs several times
        let payload: Vec<u8> = (0..=255u8).cycle().take(CHUNK_SIZE * 3 + 17).collect();
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&payload).unwrap();
        temp.flush().unwrap();

        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha3_256, HashAlgorithm::Blake3, HashAlgorithm::Md5] {
            let hasher = FileHasher::new(algorithm);
            assert_eq!(hasher.hash_file(temp.path()).unwrap(), hasher.hash_bytes(&payload));
        }
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = FileHasher::default()
            .hash_file(Path::new("/definitely/not/here.exe"))
            .unwrap_err();
        assert!(err.to_string().contains("not/here.exe"));
    }

    #[test]
    fn test_normalize_hash() {
        assert_eq!(normalize_hash("  ABCdef \n"), "abcdef");
        assert!(is_sha256_hex(EMPTY_SHA256));
        assert!(!is_sha256_hex("xyz"));
    }
}
