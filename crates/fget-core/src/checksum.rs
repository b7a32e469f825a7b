//! File checksum verification.

use md5::{Digest as Md5Digest, Md5};
use sha2::Sha256;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Digest algorithm a verifier call can be parameterized with. MD5 is the
/// one the engine uses for resumed-download verification; SHA-256 is kept
/// as a second, equally pluggable algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha256,
}

/// Computes the hex digest of `path` under `algorithm`. Returns `Err` if the
/// file cannot be opened or read.
pub fn digest_path(path: &Path, algorithm: Algorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 64 * 1024];

    match algorithm {
        Algorithm::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                sha2::Digest::update(&mut hasher, &buf[..n]);
            }
            Ok(hex::encode(sha2::Digest::finalize(hasher)))
        }
    }
}

/// Computes the MD5 digest of `path`.
pub fn md5_path(path: &Path) -> io::Result<String> {
    digest_path(path, Algorithm::Md5)
}

/// Computes the SHA-256 digest of `path`.
pub fn sha256_path(path: &Path) -> io::Result<String> {
    digest_path(path, Algorithm::Sha256)
}

/// Verifies `path` against `expected` (case-insensitive hex comparison).
/// Returns `false`, rather than erroring, if the file cannot be read.
pub fn verify(path: &Path, expected: &str, algorithm: Algorithm) -> bool {
    match digest_path(path, algorithm) {
        Ok(actual) => actual.eq_ignore_ascii_case(expected),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        // md5("hello world")
        assert_eq!(md5_path(&path).unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn verify_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        assert!(verify(&path, "5EB63BBBE01EEED093CB22BB8F5ACDC3", Algorithm::Md5));
        assert!(!verify(&path, "deadbeef", Algorithm::Md5));
    }

    #[test]
    fn verify_missing_file_is_false() {
        let path = Path::new("/nonexistent/path/to/file.bin");
        assert!(!verify(path, "anything", Algorithm::Md5));
    }

    #[test]
    fn sha256_differs_from_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        assert_ne!(
            sha256_path(&path).unwrap(),
            md5_path(&path).unwrap()
        );
    }
}
