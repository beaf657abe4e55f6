//! Multi-algorithm checksum engine
//!
//! Every byte is read exactly once and fanned out to all hash states, so the
//! source may be a write-once upload stream. All states are set up before the
//! first read; if any of them cannot be initialized nothing is consumed.

use crate::error::{AppError, Result};
use crate::storage::MetadataRecord;
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2sVar;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use tracing::debug;

const BUFFER_SIZE: usize = 64 * 1024;
const BLAKE2SP_OUTPUT_SIZE: usize = 32;

/// CRC-64/XZ (ECMA-182 polynomial, reflected, all-ones init and xor-out)
static CRC64: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_XZ);

/// Supported integrity algorithms, named by their metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Crc32,
    Crc64,
    Sha1,
    Sha256,
    Blake2sp,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 5] = [
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Crc64,
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Blake2sp,
    ];

    /// Metadata field name carrying this checksum
    pub fn field_name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "CRC32",
            ChecksumAlgorithm::Crc64 => "CRC64",
            ChecksumAlgorithm::Sha1 => "SHA1",
            ChecksumAlgorithm::Sha256 => "SHA256",
            ChecksumAlgorithm::Blake2sp => "BLAKE2sp",
        }
    }
}

/// Hex-encoded checksums of one content stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSet {
    /// 8 hex chars, upper-case
    #[serde(rename = "CRC32")]
    pub crc32: String,
    #[serde(rename = "CRC64")]
    pub crc64: String,
    #[serde(rename = "SHA1")]
    pub sha1: String,
    #[serde(rename = "SHA256")]
    pub sha256: String,
    #[serde(rename = "BLAKE2sp")]
    pub blake2sp: String,
}

impl ChecksumSet {
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> &str {
        match algorithm {
            ChecksumAlgorithm::Crc32 => &self.crc32,
            ChecksumAlgorithm::Crc64 => &self.crc64,
            ChecksumAlgorithm::Sha1 => &self.sha1,
            ChecksumAlgorithm::Sha256 => &self.sha256,
            ChecksumAlgorithm::Blake2sp => &self.blake2sp,
        }
    }

    /// Integrity fields ready to be merged into a sidecar record
    pub fn to_record(&self) -> MetadataRecord {
        ChecksumAlgorithm::ALL
            .iter()
            .map(|alg| (alg.field_name().to_string(), self.get(*alg).to_string()))
            .collect()
    }
}

/// Running state of all five hashes
struct ChecksumState {
    crc32: crc32fast::Hasher,
    crc64: crc::Digest<'static, u64>,
    sha1: Sha1,
    sha256: Sha256,
    blake2sp: Blake2sVar,
}

impl ChecksumState {
    fn new() -> Result<Self> {
        let blake2sp = Blake2sVar::new(BLAKE2SP_OUTPUT_SIZE).map_err(|_| {
            AppError::IntegrityEngineInit {
                algorithm: ChecksumAlgorithm::Blake2sp.field_name(),
            }
        })?;

        Ok(Self {
            crc32: crc32fast::Hasher::new(),
            crc64: CRC64.digest(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            blake2sp,
        })
    }

    fn update(&mut self, chunk: &[u8]) {
        self.crc32.update(chunk);
        self.crc64.update(chunk);
        Digest::update(&mut self.sha1, chunk);
        Digest::update(&mut self.sha256, chunk);
        Update::update(&mut self.blake2sp, chunk);
    }

    fn finalize(self) -> Result<ChecksumSet> {
        let mut blake2sp = [0u8; BLAKE2SP_OUTPUT_SIZE];
        self.blake2sp
            .finalize_variable(&mut blake2sp)
            .map_err(|_| AppError::io_error("BLAKE2sp output buffer size mismatch", None))?;

        Ok(ChecksumSet {
            crc32: format!("{:08X}", self.crc32.finalize()),
            crc64: format!("{:016x}", self.crc64.finalize()),
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
            blake2sp: hex::encode(blake2sp),
        })
    }
}

/// Checksum engine
///
/// Stateless; safe to run concurrently on different sources.
pub struct ChecksumEngine;

impl ChecksumEngine {
    /// Compute all checksums of `reader` in one forward pass
    ///
    /// # Example
    ///
    /// ```
    /// use file_station::integrity::ChecksumEngine;
    ///
    /// let sums = ChecksumEngine::compute_all(&b"hello world"[..]).unwrap();
    /// assert_eq!(sums.crc32, "0D4A1185");
    /// assert_eq!(sums.sha256.len(), 64);
    /// ```
    pub fn compute_all<R: Read>(reader: R) -> Result<ChecksumSet> {
        Self::copy_and_compute(reader, std::io::sink()).map(|(sums, _)| sums)
    }

    /// Tee `reader` into `writer` while hashing; returns checksums and byte count
    ///
    /// Used for uploads: the destination file and the hash states see the
    /// same single pass over the request body.
    pub fn copy_and_compute<R: Read, W: Write>(
        mut reader: R,
        mut writer: W,
    ) -> Result<(ChecksumSet, u64)> {
        let mut state = ChecksumState::new()?;
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(AppError::io_error(
                        format!("Failed to read content for hashing: {}", e),
                        None,
                    ))
                }
            };
            state.update(&buffer[..n]);
            writer.write_all(&buffer[..n]).map_err(|e| {
                AppError::io_error(format!("Failed to write hashed content: {}", e), None)
            })?;
            total += n as u64;
        }

        writer
            .flush()
            .map_err(|e| AppError::io_error(format!("Failed to flush hashed content: {}", e), None))?;

        Ok((state.finalize()?, total))
    }

    /// Re-open an on-disk file read-only and compute its checksums
    pub fn recompute(path: &Path) -> Result<ChecksumSet> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::NotFound(path.to_path_buf()),
            _ => AppError::io_error(
                format!("Failed to open file for hashing: {}", e),
                Some(path.to_path_buf()),
            ),
        })?;

        if file.metadata()?.is_dir() {
            return Err(AppError::invalid_path(format!(
                "{} is a directory and has no checksums",
                path.display()
            )));
        }

        let sums = Self::compute_all(file).map_err(|e| match e {
            AppError::IoDetailed { message, .. } => {
                AppError::io_error(message, Some(path.to_path_buf()))
            }
            other => other,
        })?;

        debug!(path = %path.display(), sha256 = %sums.sha256, "Recomputed checksums");
        Ok(sums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_vectors_empty_input() {
        let sums = ChecksumEngine::compute_all(&b""[..]).unwrap();
        assert_eq!(sums.crc32, "00000000");
        assert_eq!(sums.crc64, "0000000000000000");
        assert_eq!(sums.sha1, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            sums.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sums.blake2sp,
            "69217a3079908094e11121d042354a7c1f55b6482ca1a51e1b250dfd1ed0eef9"
        );
    }

    #[test]
    fn test_known_vectors_check_string() {
        // "123456789" is the standard CRC check input
        let sums = ChecksumEngine::compute_all(&b"123456789"[..]).unwrap();
        assert_eq!(sums.crc32, "CBF43926");
        assert_eq!(sums.crc64, "995dc9bbdf1939fa");
    }

    #[test]
    fn test_output_format() {
        let sums = ChecksumEngine::compute_all(&b"format check"[..]).unwrap();
        assert_eq!(sums.crc32.len(), 8);
        assert_eq!(sums.crc64.len(), 16);
        assert_eq!(sums.sha1.len(), 40);
        assert_eq!(sums.sha256.len(), 64);
        assert_eq!(sums.blake2sp.len(), 64);
        assert!(!sums.crc32.chars().any(|c| c.is_ascii_lowercase()));
        for lower in [&sums.crc64, &sums.sha1, &sums.sha256, &sums.blake2sp] {
            assert!(!lower.chars().any(|c| c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_copy_and_compute_matches_compute_all() {
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut copied = Vec::new();

        let (teed, written) = ChecksumEngine::copy_and_compute(&content[..], &mut copied).unwrap();
        let direct = ChecksumEngine::compute_all(&content[..]).unwrap();

        assert_eq!(teed, direct);
        assert_eq!(written, content.len() as u64);
        assert_eq!(copied, content);
    }

    #[test]
    fn test_recompute_does_not_mutate_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"stable content").unwrap();
        let before = std::fs::read(&path).unwrap();

        let sums = ChecksumEngine::recompute(&path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(sums, ChecksumEngine::compute_all(&before[..]).unwrap());
    }

    #[test]
    fn test_recompute_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = ChecksumEngine::recompute(&dir.path().join("missing.bin"));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_recompute_directory_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(ChecksumEngine::recompute(dir.path()).is_err());
    }

    #[test]
    fn test_checksum_set_serializes_with_field_names() {
        let sums = ChecksumEngine::compute_all(&b"x"[..]).unwrap();
        let json = serde_json::to_value(&sums).unwrap();
        for alg in ChecksumAlgorithm::ALL {
            assert_eq!(json[alg.field_name()], sums.get(alg));
        }
        assert_eq!(sums.to_record().len(), 5);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_checksums_deterministic(content in prop::collection::vec(any::<u8>(), 0..4096)) {
                let first = ChecksumEngine::compute_all(&content[..]).unwrap();
                let second = ChecksumEngine::compute_all(&content[..]).unwrap();
                prop_assert_eq!(first, second);
            }

            #[test]
            fn prop_single_byte_change_alters_sha256(
                content in prop::collection::vec(any::<u8>(), 1..4096),
                index in any::<prop::sample::Index>(),
                flip in 1u8..=255
            ) {
                let mut changed = content.clone();
                let i = index.index(changed.len());
                changed[i] ^= flip;

                let original = ChecksumEngine::compute_all(&content[..]).unwrap();
                let altered = ChecksumEngine::compute_all(&changed[..]).unwrap();
                prop_assert_ne!(original.sha256, altered.sha256);
            }
        }
    }
}
