//! Archive Extractor: recursively unpacks the top-level archive and every
//! nested archive under an ephemeral working directory.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::{AppError, NestedArchiveSkipped};

/// Result of unpacking the whole archive tree.
#[derive(Debug)]
pub struct ExtractionOutcome {
    /// Root of the extracted tree.
    pub root: PathBuf,
    /// Nested archives that failed every extractor and were skipped.
    pub skipped: Vec<NestedArchiveSkipped>,
    pub archives_extracted: usize,
}

/// Unpacks `archive_path` (and every nested archive found inside it) under
/// `work_dir`, which must already exist and be empty.
pub fn extract_tree(
    archive_path: &Path,
    work_dir: &Path,
    max_depth: usize,
) -> Result<ExtractionOutcome, AppError> {
    let mut skipped = Vec::new();
    let mut archives_extracted = 0usize;

    let mut queue: VecDeque<(PathBuf, PathBuf, usize)> = VecDeque::new();
    queue.push_back((archive_path.to_path_buf(), work_dir.to_path_buf(), 0));

    let mut is_root = true;
    while let Some((archive, dest, depth)) = queue.pop_front() {
        if depth > max_depth {
            warn!(path = %archive.display(), "archive nesting exceeds max_depth, skipping");
            skipped.push(NestedArchiveSkipped {
                path: archive.clone(),
                reason: "max_depth exceeded".to_string(),
            });
            is_root = false;
            continue;
        }

        fs::create_dir_all(&dest).map_err(|e| AppError::Io { path: dest.clone(), source: e })?;

        let entries_recovered = match extract_in_process(&archive, &dest) {
            Ok(n) => n,
            Err(primary_err) => {
                debug!(path = %archive.display(), error = %primary_err, "in-process extraction failed, trying fallback");
                match extract_with_fallback_tool(&archive, &dest) {
                    Ok(n) => n,
                    Err(fallback_err) => {
                        if is_root {
                            return Err(AppError::ArchiveMalformed {
                                path: archive.clone(),
                                source: anyhow::anyhow!(
                                    "in-process: {primary_err}; fallback: {fallback_err}"
                                ),
                            });
                        }
                        warn!(path = %archive.display(), "nested archive failed all extractors, skipping");
                        skipped.push(NestedArchiveSkipped {
                            path: archive.clone(),
                            reason: format!("{primary_err}; {fallback_err}"),
                        });
                        is_root = false;
                        continue;
                    }
                }
            }
        };

        if entries_recovered == 0 {
            if is_root {
                return Err(AppError::ArchiveMalformed {
                    path: archive.clone(),
                    source: anyhow::anyhow!("no entries recovered from archive"),
                });
            }
            skipped.push(NestedArchiveSkipped {
                path: archive.clone(),
                reason: "no entries recovered".to_string(),
            });
            is_root = false;
            continue;
        }

        archives_extracted += 1;
        info!(path = %archive.display(), entries = entries_recovered, "extracted archive");
        is_root = false;

        for nested in find_nested_archives(&dest) {
            let nested_dest = nested.with_extension("");
            queue.push_back((nested, nested_dest, depth + 1));
        }
    }

    Ok(ExtractionOutcome { root: work_dir.to_path_buf(), skipped, archives_extracted })
}

/// In-process extraction via the `zip` crate. Returns the number of entries
/// successfully written, so a partial (but non-empty) result is still
/// accepted by the caller.
fn extract_in_process(archive_path: &Path, dest: &Path) -> anyhow::Result<usize> {
    let file = fs::File::open(archive_path)?;
    let mut zip = zip::ZipArchive::new(file)?;

    let mut recovered = 0usize;
    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(index = i, error = %e, "skipping unreadable zip entry");
                continue;
            }
        };

        let Some(relative) = entry.enclosed_name() else {
            debug!(index = i, "skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = match fs::File::create(&out_path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %out_path.display(), error = %e, "skipping unwritable entry");
                continue;
            }
        };
        if io::copy(&mut entry, &mut out_file).is_err() {
            continue;
        }
        recovered += 1;
    }

    Ok(recovered)
}

/// OS-level tolerant extraction used when the in-process extractor chokes on
/// a malformed header. Prefers a native "copy-preserving" tool when present,
/// else a permissive command-line unzipper.
fn extract_with_fallback_tool(archive_path: &Path, dest: &Path) -> anyhow::Result<usize> {
    let tools: &[(&str, &[&str])] = if cfg!(target_os = "macos") {
        &[("ditto", &["-x", "-k"]), ("unzip", &["-o", "-q"])]
    } else {
        &[("unzip", &["-o", "-q"]), ("7z", &["x", "-y"])]
    };

    for (tool, base_args) in tools {
        let mut cmd = Command::new(tool);
        match *tool {
            "ditto" => {
                cmd.args(*base_args).arg(archive_path).arg(dest);
            }
            "7z" => {
                cmd.args(*base_args).arg(format!("-o{}", dest.display())).arg(archive_path);
            }
            _ => {
                cmd.args(*base_args).arg(archive_path).arg("-d").arg(dest);
            }
        }

        match cmd.output() {
            Ok(output) if output.status.success() => {
                let recovered = count_regular_files(dest).unwrap_or(0);
                if recovered > 0 {
                    return Ok(recovered);
                }
            }
            Ok(_) => continue,
            Err(_) => continue,
        }
    }

    anyhow::bail!("no fallback extraction tool succeeded")
}

fn count_regular_files(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn find_nested_archives(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path().extension().and_then(|s| s.to_str()).map(|s| s.eq_ignore_ascii_case("zip")).unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_flat_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("in.zip");
        write_zip(&archive_path, &[("conversations.json", b"[]"), ("a/b.png", b"\x89PNG")]);

        let work_dir = dir.path().join("work");
        let outcome = extract_tree(&archive_path, &work_dir, 8).unwrap();

        assert_eq!(outcome.archives_extracted, 1);
        assert!(work_dir.join("conversations.json").exists());
        assert!(work_dir.join("a/b.png").exists());
    }

    #[test]
    fn extracts_nested_archive() {
        let dir = tempdir().unwrap();
        let inner_path = dir.path().join("inner_src.zip");
        write_zip(&inner_path, &[("media/file-ABC_doc.pdf", b"%PDF-1.4")]);
        let inner_bytes = fs::read(&inner_path).unwrap();

        let outer_path = dir.path().join("out.zip");
        write_zip(&outer_path, &[("nested.zip", &inner_bytes)]);

        let work_dir = dir.path().join("work");
        let outcome = extract_tree(&outer_path, &work_dir, 8).unwrap();

        assert_eq!(outcome.archives_extracted, 2);
        assert!(work_dir.join("nested/media/file-ABC_doc.pdf").exists());
    }

    #[test]
    fn fatal_when_root_archive_is_malformed() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.zip");
        fs::write(&bad, b"not a zip file").unwrap();

        let work_dir = dir.path().join("work");
        let result = extract_tree(&bad, &work_dir, 8);
        assert!(result.is_err());
    }
}
