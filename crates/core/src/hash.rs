//! Content digests identifying retrieved receipts.
//!
//! Notes and candidate loading compare artifacts by the lowercase hex
//! SHA-256 of their bytes.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Hex digest of an artifact already in memory.
pub fn digest_hex(data: &[u8]) -> String {
    hex_of(Sha256::digest(data).as_slice())
}

/// Hex digest of the artifact at `path`, read in streaming fashion.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_of(hasher.finalize().as_slice()))
}

fn hex_of(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn digest_of_empty_input() {
        assert_eq!(digest_hex(b""), EMPTY);
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.pdf");
        let body = vec![b'%'; 20_000];
        std::fs::write(&path, &body).unwrap();
        assert_eq!(file_digest(&path).unwrap(), digest_hex(&body));

        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(file_digest(&empty).unwrap(), EMPTY);
    }

    #[test]
    fn file_digest_missing_file_errors() {
        assert!(file_digest(Path::new("/nonexistent/receipt.pdf")).is_err());
    }
}
