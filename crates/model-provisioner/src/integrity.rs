//! SHA-256 integrity check for staged model files

use crate::ProvisioningError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Hex-encoded SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String, ProvisioningError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare a file's digest with the expected hex string (case-insensitive)
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), ProvisioningError> {
    let expected = expected.trim().to_ascii_lowercase();
    let actual = sha256_file(path)?;

    if actual != expected {
        warn!("Checksum mismatch for {}", path.display());
        return Err(ProvisioningError::ChecksumMismatch { expected, actual });
    }

    debug!("Checksum verified for {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), ABC);
        assert!(verify_sha256(&path, &ABC.to_uppercase()).is_ok());
    }

    #[test]
    fn test_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abd.bin");
        std::fs::write(&path, b"abd").unwrap();

        match verify_sha256(&path, ABC) {
            Err(ProvisioningError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, ABC);
                assert_ne!(actual, ABC);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
