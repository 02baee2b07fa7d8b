//! Purely syntactic identifier extraction from filenames and paths.
//!
//! No heuristics beyond plain string/regex matches here, not content
//! inspection.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// `file-{ID}_...` or `file-{ID}-...`, where `{ID}` is alphanumeric and ends
/// at the first `_` or `-` following the literal `file-`. Does not match
/// `file-` appearing in the interior of a filename.
static FILE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^file-([A-Za-z0-9]+)[_-]").unwrap());

/// `file_{32-hex}-{uuid}.{ext}`, exactly.
static CONTENT_HASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^file_([0-9a-fA-F]{32})-[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\.[A-Za-z0-9]+$",
    )
    .unwrap()
});

pub static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

pub static FILE_ID_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"file-[A-Za-z0-9]+").unwrap());

/// `..._{genid}.ext` where `{genid}` begins with the literal `gen` marker,
/// e.g. `image_gen-one.png` -> `Some("gen-one")`. Lets a file declare its own
/// generation id so same-size files can be told apart in strategy 5 without
/// relying on a citation alone.
static GEN_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(gen[A-Za-z0-9-]*)\.[A-Za-z0-9]+$").unwrap());

pub fn extract_gen_id(base_name: &str) -> Option<String> {
    GEN_ID_RE.captures(base_name).map(|c| c[1].to_string())
}

/// Extracts the file-id from a base filename, e.g. `file-ABC123_doc.pdf` ->
/// `Some("ABC123")`.
pub fn extract_file_id(base_name: &str) -> Option<String> {
    FILE_ID_RE.captures(base_name).map(|c| c[1].to_string())
}

/// Extracts the content hash from a base filename, e.g.
/// `file_deadbeef...-<uuid>.png` -> the 32-hex segment.
pub fn extract_content_hash(base_name: &str) -> Option<String> {
    CONTENT_HASH_RE.captures(base_name).map(|c| c[1].to_lowercase())
}

/// Walks the path's ancestor directory names and returns the nearest one
/// that is a canonical 8-4-4-4-12 hex UUID.
pub fn extract_conversation_id(path: &Path) -> Option<String> {
    for ancestor in path.ancestors().skip(1) {
        if let Some(name) = ancestor.file_name().and_then(|n| n.to_str()) {
            if UUID_RE.is_match(name) {
                return Some(name.to_string());
            }
        }
    }
    None
}

pub fn is_uuid(s: &str) -> bool {
    UUID_RE.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn file_id_extraction_handles_common_forms() {
        assert_eq!(extract_file_id("file-ABC123_doc.pdf"), Some("ABC123".to_string()));
        assert_eq!(extract_file_id("file-XYZ-thumb.png"), Some("XYZ".to_string()));
        assert_eq!(extract_file_id("notes_file-ABC_doc.pdf"), None);
        assert_eq!(extract_file_id("fileABC_doc.pdf"), None);
    }

    #[test]
    fn content_hash_extraction_requires_exact_shape() {
        let name = "file_00112233445566778899aabbccddeeff-11111111-2222-3333-4444-555555555555.png";
        assert_eq!(
            extract_content_hash(name),
            Some("00112233445566778899aabbccddeeff".to_string())
        );
        assert_eq!(extract_content_hash("file_short-11111111-2222-3333-4444-555555555555.png"), None);
    }

    #[test]
    fn conversation_id_from_nearest_ancestor() {
        let path = PathBuf::from(
            "/tmp/root/conversations/11111111-2222-3333-4444-555555555555/media/img.png",
        );
        assert_eq!(
            extract_conversation_id(&path),
            Some("11111111-2222-3333-4444-555555555555".to_string())
        );
    }

    #[test]
    fn conversation_id_absent_when_no_ancestor_is_a_uuid() {
        let path = PathBuf::from("/tmp/root/media/img.png");
        assert_eq!(extract_conversation_id(&path), None);
    }

    #[test]
    fn gen_id_extraction_requires_the_gen_marker_before_the_extension() {
        assert_eq!(extract_gen_id("image_gen-one.png"), Some("gen-one".to_string()));
        assert_eq!(extract_gen_id("image.png"), None);
        assert_eq!(extract_gen_id("generic_report.pdf"), None);
    }
}
