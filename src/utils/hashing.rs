//! Content hashing used to derive the `{hash8}` prefix attached to every
//! copied media file.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Returns the lowercase hex digest of `path`'s full content.
pub fn content_digest(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// The first 8 hex characters of `digest`, used as the on-disk filename
/// prefix.
pub fn hash8(digest: &str) -> String {
    digest.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn digest_is_stable_for_identical_content() {
        let f1 = NamedTempFile::new().unwrap();
        let f2 = NamedTempFile::new().unwrap();
        std::fs::write(f1.path(), b"same bytes").unwrap();
        std::fs::write(f2.path(), b"same bytes").unwrap();

        let d1 = content_digest(f1.path()).unwrap();
        let d2 = content_digest(f2.path()).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(hash8(&d1).len(), 8);
    }
}
