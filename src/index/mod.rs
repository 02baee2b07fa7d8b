//! Media Indexer: walks the extraction tree once and builds the read-only
//! `MediaIndex` consumed by every downstream resolution worker.

pub mod patterns;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{MediaFile, MimeClass};

/// Read-only aggregation over every `MediaFile` discovered under the
/// extraction root. `files` is the arena; every lookup table below stores
/// indices into it rather than owning copies.
#[derive(Debug, Default)]
pub struct MediaIndex {
    pub files: Vec<MediaFile>,
    pub by_conversation: HashMap<String, Vec<usize>>,
    pub by_file_id: HashMap<String, usize>,
    pub by_hash: HashMap<String, usize>,
    pub by_size: HashMap<u64, Vec<usize>>,
    pub by_name_size: HashMap<(String, u64), usize>,
    /// Finalized by a cooperative pass in `resolve` before the parallel
    /// per-conversation phase starts; empty until then. Disambiguates
    /// same-size files via each file's own `gen_id` when the size alone
    /// isn't unique.
    pub by_size_and_gen_id: HashMap<(u64, String), usize>,
    pub collisions: usize,
}

impl MediaIndex {
    pub fn get(&self, id: usize) -> &MediaFile {
        &self.files[id]
    }

    pub fn by_conversation_files(&self, conversation_id: &str) -> Vec<&MediaFile> {
        self.by_conversation
            .get(conversation_id)
            .map(|ids| ids.iter().map(|&i| &self.files[i]).collect())
            .unwrap_or_default()
    }
}

/// Partial index built by one worker over its slice of the path worklist,
/// merged deterministically into the shared `MediaIndex`.
#[derive(Default)]
struct PartialIndex {
    files: Vec<MediaFile>,
}

/// Walks `root` (and, if present, `recovered_dir`) and returns the frozen
/// `MediaIndex`. Parallelized over the discovered file list with rayon; the
/// merge step applies a fixed lexicographic-path tiebreaker so the result is
/// independent of worker count or scheduling order.
pub fn build_index(
    root: &Path,
    recovered_dir: Option<&Path>,
    media_extensions: &std::collections::HashSet<String>,
) -> MediaIndex {
    let mut paths: Vec<(PathBuf, bool)> = collect_candidate_paths(root, media_extensions)
        .into_iter()
        .map(|p| (p, false))
        .collect();
    if let Some(recovered) = recovered_dir {
        paths.extend(
            collect_candidate_paths(recovered, media_extensions)
                .into_iter()
                .map(|p| (p, true)),
        );
    }
    // Deterministic regardless of filesystem walk order.
    paths.sort_by(|a, b| a.0.cmp(&b.0));

    info!(candidate_files = paths.len(), "media indexer: walk complete");

    let partial: PartialIndex = paths
        .par_iter()
        .fold(PartialIndex::default, |mut acc, (path, recovered)| {
            if let Some(file) = build_media_file(path, *recovered) {
                acc.files.push(file);
            }
            acc
        })
        .reduce(PartialIndex::default, |mut a, b| {
            a.files.extend(b.files);
            a
        });

    merge_into_index(partial.files)
}

fn collect_candidate_paths(
    root: &Path,
    media_extensions: &std::collections::HashSet<String>,
) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_media_like(e.path(), media_extensions))
        .map(|e| e.path().to_path_buf())
        .collect()
}

fn is_media_like(path: &Path, media_extensions: &std::collections::HashSet<String>) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if media_extensions.contains(&ext.to_lowercase()) {
            return true;
        }
    }
    sniff_magic_bytes(path).is_some()
}

/// Small fixed magic-number table; deliberately not a dependency since the
/// set of containers we care about is small and fixed.
fn sniff_magic_bytes(path: &Path) -> Option<MimeClass> {
    let mut buf = [0u8; 12];
    let n = {
        use std::io::Read;
        let mut f = std::fs::File::open(path).ok()?;
        f.read(&mut buf).ok()?
    };
    let buf = &buf[..n];

    if buf.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(MimeClass::Image);
    }
    if buf.starts_with(b"\xFF\xD8\xFF") {
        return Some(MimeClass::Image);
    }
    if buf.starts_with(b"GIF87a") || buf.starts_with(b"GIF89a") {
        return Some(MimeClass::Image);
    }
    if buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WEBP" {
        return Some(MimeClass::Image);
    }
    if buf.starts_with(b"%PDF-") {
        return Some(MimeClass::Document);
    }
    if buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE" {
        return Some(MimeClass::Audio);
    }
    if buf.starts_with(b"ID3") || (buf.len() >= 2 && buf[0] == 0xFF && (buf[1] & 0xE0) == 0xE0) {
        return Some(MimeClass::Audio);
    }
    if buf.starts_with(b"OggS") {
        return Some(MimeClass::Audio);
    }
    None
}

fn classify_mime(path: &Path) -> MimeClass {
    match path.extension().and_then(|e| e.to_str()).map(|s| s.to_lowercase()) {
        Some(ext) => match ext.as_str() {
            "png" | "webp" | "jpg" | "jpeg" | "gif" | "bmp" | "heic" | "heif" => MimeClass::Image,
            "wav" | "mp3" | "m4a" | "ogg" => MimeClass::Audio,
            "pdf" => MimeClass::Document,
            _ => sniff_magic_bytes(path).unwrap_or(MimeClass::Other),
        },
        None => sniff_magic_bytes(path).unwrap_or(MimeClass::Other),
    }
}

fn build_media_file(path: &Path, recovered: bool) -> Option<MediaFile> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    let base_name = path.file_name()?.to_string_lossy().to_string();

    Some(MediaFile {
        arena_id: 0, // assigned during merge
        path: path.to_path_buf(),
        base_name: base_name.clone(),
        size_bytes: metadata.len(),
        file_id: patterns::extract_file_id(&base_name),
        content_hash: patterns::extract_content_hash(&base_name),
        conversation_id: patterns::extract_conversation_id(path),
        gen_id: patterns::extract_gen_id(&base_name),
        mime_class: classify_mime(path),
        recovered,
    })
}

/// Assigns arena ids and builds every lookup table, applying the "first
/// encountered wins, later duplicates discarded" rule for unique-valued
/// indices. Input must already be sorted lexicographically by path so the
/// result is deterministic.
fn merge_into_index(mut files: Vec<MediaFile>) -> MediaIndex {
    let mut index = MediaIndex::default();

    for (id, file) in files.iter_mut().enumerate() {
        file.arena_id = id;
    }

    for file in &files {
        let id = file.arena_id;

        if let Some(conv_id) = &file.conversation_id {
            index.by_conversation.entry(conv_id.clone()).or_default().push(id);
        }

        if let Some(file_id) = &file.file_id {
            if index.by_file_id.contains_key(file_id) && !file.recovered {
                index.collisions += 1;
                debug!(key = %file_id, path = %file.path.display(), "by_file_id collision, first wins");
            } else {
                index.by_file_id.entry(file_id.clone()).or_insert(id);
            }
        }

        if let Some(hash) = &file.content_hash {
            if index.by_hash.contains_key(hash) && !file.recovered {
                index.collisions += 1;
                debug!(key = %hash, path = %file.path.display(), "by_hash collision, first wins");
            } else {
                index.by_hash.entry(hash.clone()).or_insert(id);
            }
        }

        index.by_size.entry(file.size_bytes).or_default().push(id);

        let name_size_key = (file.base_name.clone(), file.size_bytes);
        if index.by_name_size.contains_key(&name_size_key) && !file.recovered {
            index.collisions += 1;
        } else {
            index.by_name_size.entry(name_size_key).or_insert(id);
        }
    }

    index.files = files;
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builds_all_indices_for_a_well_named_file() {
        let dir = tempdir().unwrap();
        let conv_dir = dir.path().join("conversations/11111111-2222-3333-4444-555555555555");
        fs::create_dir_all(&conv_dir).unwrap();
        let file_path = conv_dir.join("file-ABC123_doc.pdf");
        fs::write(&file_path, b"%PDF-1.4 body").unwrap();

        let exts: std::collections::HashSet<String> =
            crate::domain::media_extensions().iter().map(|s| s.to_string()).collect();
        let index = build_index(dir.path(), None, &exts);

        assert_eq!(index.files.len(), 1);
        assert!(index.by_file_id.contains_key("ABC123"));
        assert!(index
            .by_conversation
            .contains_key("11111111-2222-3333-4444-555555555555"));
        let size = fs::metadata(&file_path).unwrap().len();
        assert_eq!(index.by_size.get(&size).map(|v| v.len()), Some(1));
    }

    #[test]
    fn recovered_files_never_displace_in_archive_files_on_collision() {
        let dir = tempdir().unwrap();
        let main_dir = dir.path().join("main");
        let recovered_dir = dir.path().join("recovered_files");
        fs::create_dir_all(&main_dir).unwrap();
        fs::create_dir_all(&recovered_dir).unwrap();

        fs::write(main_dir.join("file-DUP_a.png"), b"\x89PNG\r\n\x1a\nmain").unwrap();
        fs::write(recovered_dir.join("file-DUP_a.png"), b"\x89PNG\r\n\x1a\nrecovered").unwrap();

        let exts: std::collections::HashSet<String> =
            crate::domain::media_extensions().iter().map(|s| s.to_string()).collect();
        let index = build_index(&main_dir, Some(&recovered_dir), &exts);

        let winner_id = *index.by_file_id.get("DUP").unwrap();
        assert!(!index.files[winner_id].recovered);
    }
}
