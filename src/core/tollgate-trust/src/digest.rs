//! Short content digests for audit lines.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest.
pub const SHORT_DIGEST_LEN: usize = 16;

/// First [`SHORT_DIGEST_LEN`] hex characters of the SHA-256 of `path`.
pub fn short_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(truncate(hex::encode(hasher.finalize())))
}

/// Short digest of an in-memory buffer.
pub fn short_digest_bytes(data: &[u8]) -> String {
    truncate(hex::encode(Sha256::digest(data)))
}

fn truncate(mut hex: String) -> String {
    hex.truncate(SHORT_DIGEST_LEN);
    hex
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(short_digest_bytes(b"abc"), "ba7816bf8f01cfea");
    }

    #[test]
    fn test_file_matches_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("crl.pem");
        let body = vec![b'x'; 20_000];
        std::fs::write(&path, &body).unwrap();

        assert_eq!(short_digest(&path).unwrap(), short_digest_bytes(&body));
        assert_eq!(short_digest(&path).unwrap().len(), SHORT_DIGEST_LEN);
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(short_digest(&tmp.path().join("nope")).is_err());
    }
}
