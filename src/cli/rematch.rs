//! `rematch-media`: re-run the Media Resolver over an existing output tree
//! without re-unpacking the original archive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::citation;
use crate::config::PipelineConfig;
use crate::domain::{Conversation, ConversationDescriptor, MasterIndex, ResolverStats};
use crate::error::AppError;
use crate::index::{self, MediaIndex};
use crate::output;
use crate::resolve;

#[derive(Args)]
pub struct RematchArgs {
    /// An existing corpus directory produced by a prior run
    pub output_dir: PathBuf,
}

pub fn run(args: RematchArgs) -> Result<()> {
    let start_time = Instant::now();
    let index_path = args.output_dir.join("index.json");
    let existing: MasterIndex = serde_json::from_slice(
        &std::fs::read(&index_path).with_context(|| format!("reading {}", index_path.display()))?,
    )
    .with_context(|| format!("parsing {}", index_path.display()))?;

    let extraction_root = existing
        .extraction_root
        .clone()
        .ok_or_else(|| anyhow::anyhow!("{} has no retained extraction root to rematch against", index_path.display()))?;
    if !extraction_root.is_dir() {
        anyhow::bail!("retained extraction root {} no longer exists", extraction_root.display());
    }

    let media_extensions: std::collections::HashSet<String> =
        PipelineConfig::default().media_extensions.into_iter().collect();
    let mut media_index = index::build_index(&extraction_root, None, &media_extensions);

    let (mut conversations, folder_names) = load_existing_conversations(&args.output_dir)?;
    let per_conversation_citations: Vec<Vec<crate::domain::Citation>> = conversations
        .iter()
        .map(|c| citation::extract_citations(&c.conversation_id, &c.mapping))
        .collect();
    let all_citations: Vec<crate::domain::Citation> =
        per_conversation_citations.iter().flatten().cloned().collect();

    resolve::prepare_size_gen_id_index(&mut media_index, &all_citations);
    let mut stats = ResolverStats::default();
    stats.media_index_collisions = media_index.collisions;
    let media_index = Arc::new(media_index);

    let mut descriptors = Vec::with_capacity(conversations.len());
    for ((conversation, citations), folder_name) in
        conversations.iter_mut().zip(per_conversation_citations.iter()).zip(folder_names.iter())
    {
        let descriptor = rematch_one(&media_index, &args.output_dir, conversation, citations, folder_name, &mut stats)?;
        descriptors.push(descriptor);
    }

    // Rebuild the link directories fresh rather than trying to recover the
    // original run's --flat choice, which isn't persisted in index.json.
    let had_link_dirs = args.output_dir.join("_with_media").is_dir() || args.output_dir.join("_with_assets").is_dir();

    let processing_time = start_time.elapsed().as_secs_f64();
    output::write_master_index(
        &args.output_dir,
        descriptors,
        stats,
        processing_time,
        Some(extraction_root),
        !had_link_dirs,
    )?;

    info!(conversations = conversations.len(), "rematch-media complete");
    Ok(())
}

fn rematch_one(
    media_index: &Arc<MediaIndex>,
    output_dir: &std::path::Path,
    conversation: &mut Conversation,
    citations: &[crate::domain::Citation],
    folder_name: &str,
    stats: &mut ResolverStats,
) -> Result<ConversationDescriptor> {
    let (resolution, conv_stats) =
        resolve::resolve_conversation(media_index, &conversation.conversation_id, citations);
    stats.merge(conv_stats);

    conversation.resolved_media = resolution.resolved_media;
    conversation.unresolved_citations = resolution.unresolved;

    let conversation_dir = output_dir.join(folder_name);
    let media_dir = conversation_dir.join("media");
    if media_dir.is_dir() {
        std::fs::remove_dir_all(&media_dir)
            .map_err(|e| AppError::OutputUnwritable { path: media_dir.clone(), source: e })?;
    }
    std::fs::create_dir_all(&media_dir)
        .map_err(|e| AppError::OutputUnwritable { path: media_dir.clone(), source: e })?;

    let manifest = rewrite_media(&media_dir, &conversation.resolved_media, &resolution.citation_bindings)?;

    let manifest_path = conversation_dir.join("media_manifest.json");
    std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .map_err(|e| AppError::OutputUnwritable { path: manifest_path.clone(), source: e })?;

    let conversation_path = conversation_dir.join("conversation.json");
    std::fs::write(&conversation_path, serde_json::to_vec_pretty(conversation)?)
        .map_err(|e| AppError::OutputUnwritable { path: conversation_path.clone(), source: e })?;

    Ok(ConversationDescriptor {
        conversation_id: conversation.conversation_id.clone(),
        title: conversation.title.clone(),
        date: folder_name.split('_').next().unwrap_or_default().to_string(),
        message_count: conversation.messages.len(),
        has_media: !conversation.resolved_media.is_empty(),
        has_assets: !conversation.assets.is_empty(),
        folder_name: folder_name.to_string(),
    })
}

fn rewrite_media(
    media_dir: &std::path::Path,
    resolved_media: &[PathBuf],
    citation_bindings: &[(String, PathBuf)],
) -> Result<crate::domain::MediaManifest> {
    let mut manifest = crate::domain::MediaManifest::default();
    let mut entries: Vec<(PathBuf, String)> = Vec::new();

    for src in resolved_media {
        let digest = crate::utils::content_digest(src)?;
        let prefix = crate::utils::hash8(&digest);
        let basename = src.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        entries.push((src.clone(), format!("{prefix}_{basename}")));
    }
    entries.sort_by(|a, b| a.1.cmp(&b.1));

    for (src, dest_name) in &entries {
        let dest = media_dir.join(dest_name);
        std::fs::copy(src, &dest).map_err(|e| AppError::OutputUnwritable { path: dest.clone(), source: e })?;
        for (token, token_src) in citation_bindings {
            if token_src == src {
                manifest.entries.push(crate::domain::MediaManifestEntry {
                    citation_token: token.clone(),
                    on_disk_name: dest_name.clone(),
                });
            }
        }
    }

    Ok(manifest)
}

/// Reads every `{folder}/conversation.json` under `output_dir`, skipping the
/// `_with_media`/`_with_assets` link directories.
fn load_existing_conversations(output_dir: &std::path::Path) -> Result<(Vec<Conversation>, Vec<String>)> {
    let mut conversations = Vec::new();
    let mut folder_names = Vec::new();

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(output_dir)
        .with_context(|| format!("reading {}", output_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name != "_with_media" && name != "_with_assets" && name != ".extraction_cache"
        })
        .collect();
    dirs.sort();

    for dir in dirs {
        let conversation_path = dir.join("conversation.json");
        if !conversation_path.is_file() {
            continue;
        }
        let conversation: Conversation = serde_json::from_slice(
            &std::fs::read(&conversation_path).with_context(|| format!("reading {}", conversation_path.display()))?,
        )
        .with_context(|| format!("parsing {}", conversation_path.display()))?;
        folder_names.push(dir.file_name().unwrap().to_string_lossy().to_string());
        conversations.push(conversation);
    }

    Ok((conversations, folder_names))
}
