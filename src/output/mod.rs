//! Output Writer: emits one directory per surviving conversation plus the
//! master index.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use crate::domain::{
    Conversation, ConversationDescriptor, MasterIndex, MediaManifest, MediaManifestEntry,
    ResolverStats, OUTPUT_SCHEMA_VERSION,
};
use crate::error::AppError;
use crate::utils;

/// Writes one conversation's directory: `conversation.json`, `media/`,
/// `assets/`, and `media_manifest.json`. Returns the descriptor row destined
/// for the master index.
pub fn write_conversation(
    out_root: &Path,
    conversation: &Conversation,
    citation_bindings: &[(String, PathBuf)],
    ordinal: usize,
) -> Result<ConversationDescriptor, AppError> {
    let date = format_date(conversation.create_time);
    let slug = utils::slugify_title(&conversation.title);
    let folder_name = format!("{date}_{slug}_{ord}", ord = utils::format_ordinal(ordinal));
    let dir = out_root.join(&folder_name);

    std::fs::create_dir_all(&dir).map_err(|e| AppError::OutputUnwritable { path: dir.clone(), source: e })?;

    let media_dir = dir.join("media");
    std::fs::create_dir_all(&media_dir)
        .map_err(|e| AppError::OutputUnwritable { path: media_dir.clone(), source: e })?;
    let assets_dir = dir.join("assets");
    std::fs::create_dir_all(&assets_dir)
        .map_err(|e| AppError::OutputUnwritable { path: assets_dir.clone(), source: e })?;

    let manifest = copy_media(&media_dir, &conversation.resolved_media, citation_bindings)?;

    for asset in &conversation.assets {
        let asset_path = assets_dir.join(&asset.file_name);
        std::fs::write(&asset_path, &asset.payload)
            .map_err(|e| AppError::OutputUnwritable { path: asset_path.clone(), source: e })?;
    }

    let conversation_path = dir.join("conversation.json");
    let body = serde_json::to_vec_pretty(conversation).map_err(|e| AppError::Other(e.into()))?;
    std::fs::write(&conversation_path, body)
        .map_err(|e| AppError::OutputUnwritable { path: conversation_path.clone(), source: e })?;

    let manifest_path = dir.join("media_manifest.json");
    let manifest_body = serde_json::to_vec_pretty(&manifest).map_err(|e| AppError::Other(e.into()))?;
    std::fs::write(&manifest_path, manifest_body)
        .map_err(|e| AppError::OutputUnwritable { path: manifest_path.clone(), source: e })?;

    debug!(folder = %folder_name, "wrote conversation directory");

    Ok(ConversationDescriptor {
        conversation_id: conversation.conversation_id.clone(),
        title: conversation.title.clone(),
        date,
        message_count: conversation.messages.len(),
        has_media: !conversation.resolved_media.is_empty(),
        has_assets: !conversation.assets.is_empty(),
        folder_name,
    })
}

/// Copies every resolved media file in, renamed to `{hash8}_{basename}`,
/// sorted by the post-copy filename so output ordering is deterministic
/// regardless of resolution order.
fn copy_media(
    media_dir: &Path,
    resolved_media: &[PathBuf],
    citation_bindings: &[(String, PathBuf)],
) -> Result<MediaManifest, AppError> {
    struct Entry {
        src: PathBuf,
        dest_name: String,
    }

    let mut entries = Vec::new();
    for src in resolved_media {
        let digest = utils::content_digest(src)
            .map_err(|e| AppError::Io { path: src.clone(), source: e })?;
        let prefix = utils::hash8(&digest);
        let basename = src.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let basename = rename_dat_extension(&basename);
        entries.push(Entry { src: src.clone(), dest_name: format!("{prefix}_{basename}") });
    }
    entries.sort_by(|a, b| a.dest_name.cmp(&b.dest_name));

    let mut manifest = MediaManifest::default();
    for entry in &entries {
        let dest = media_dir.join(&entry.dest_name);
        std::fs::copy(&entry.src, &dest).map_err(|e| AppError::OutputUnwritable { path: dest.clone(), source: e })?;

        for (token, src_path) in citation_bindings {
            if src_path == &entry.src {
                manifest.entries.push(MediaManifestEntry {
                    citation_token: token.clone(),
                    on_disk_name: entry.dest_name.clone(),
                });
            }
        }
    }

    Ok(manifest)
}

/// `.dat` files with media magic bytes are renamed only in the output copy,
/// never in place under the extraction tree.
fn rename_dat_extension(basename: &str) -> String {
    if basename.to_lowercase().ends_with(".dat") {
        format!("{}.bin", &basename[..basename.len() - 4])
    } else {
        basename.to_string()
    }
}

fn format_date(create_time: f64) -> String {
    Utc.timestamp_opt(create_time as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

/// Writes `index.json` and, unless `flat`, the `_with_media`/`_with_assets`
/// link directories.
pub fn write_master_index(
    out_root: &Path,
    descriptors: Vec<ConversationDescriptor>,
    stats: ResolverStats,
    processing_time_seconds: f64,
    extraction_root: Option<PathBuf>,
    flat: bool,
) -> Result<(), AppError> {
    let index = MasterIndex {
        schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
        total_conversations: descriptors.len(),
        stats,
        processing_time_seconds,
        extraction_root,
        conversations: descriptors.clone(),
    };

    let index_path = out_root.join("index.json");
    let body = serde_json::to_vec_pretty(&index).map_err(|e| AppError::Other(e.into()))?;
    std::fs::write(&index_path, body)
        .map_err(|e| AppError::OutputUnwritable { path: index_path.clone(), source: e })?;

    if !flat {
        write_link_tree(out_root, "_with_media", descriptors.iter().filter(|d| d.has_media))?;
        write_link_tree(out_root, "_with_assets", descriptors.iter().filter(|d| d.has_assets))?;
    }

    info!(conversations = index.total_conversations, "wrote master index");
    Ok(())
}

fn write_link_tree<'a>(
    out_root: &Path,
    dir_name: &str,
    descriptors: impl Iterator<Item = &'a ConversationDescriptor>,
) -> Result<(), AppError> {
    let link_root = out_root.join(dir_name);
    std::fs::create_dir_all(&link_root)
        .map_err(|e| AppError::OutputUnwritable { path: link_root.clone(), source: e })?;

    for descriptor in descriptors {
        let target = out_root.join(&descriptor.folder_name);
        let link = link_root.join(&descriptor.folder_name);
        create_link(&target, &link)?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<(), AppError> {
    if link.exists() {
        return Ok(());
    }
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| AppError::OutputUnwritable { path: link.to_path_buf(), source: e })
}

#[cfg(not(unix))]
fn create_link(target: &Path, link: &Path) -> Result<(), AppError> {
    if link.exists() {
        return Ok(());
    }
    copy_dir_recursive(target, link)
}

#[cfg(not(unix))]
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dst).map_err(|e| AppError::OutputUnwritable { path: dst.to_path_buf(), source: e })?;
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| AppError::Other(e.into()))?;
        let rel = entry.path().strip_prefix(src).unwrap();
        let dest = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)
                .map_err(|e| AppError::OutputUnwritable { path: dest.clone(), source: e })?;
        } else {
            std::fs::copy(entry.path(), &dest)
                .map_err(|e| AppError::OutputUnwritable { path: dest.clone(), source: e })?;
        }
    }
    Ok(())
}
