//! Small CLI-local helpers shared by the default and `rematch-media` commands.

use std::path::{Path, PathBuf};

/// Derives `<archive-stem>_corpus` next to the archive when `-o` is absent.
pub fn default_output_dir(archive: &Path) -> PathBuf {
    let stem = archive.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "export".to_string());
    archive.parent().unwrap_or_else(|| Path::new(".")).join(format!("{stem}_corpus"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_corpus_suffix_next_to_archive() {
        let dir = default_output_dir(Path::new("/tmp/exports/chatgpt-export.zip"));
        assert_eq!(dir, PathBuf::from("/tmp/exports/chatgpt-export_corpus"));
    }
}
