//! Media Resolver: binds citations to indexed media files via seven ordered
//! strategies and accumulates global resolution statistics.

pub mod strategy;

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::domain::{Citation, CitationKind, ResolveStrategy, ResolverStats, UnresolvedCitation};
use crate::index::MediaIndex;

/// One citation's resolution progress while walking the seven strategies.
struct Pending<'a> {
    citation: &'a Citation,
    bound: Option<usize>,
    strategy: Option<ResolveStrategy>,
}

/// Result of resolving one conversation's citations against a frozen index.
pub struct ConversationResolution {
    pub resolved_media: Vec<PathBuf>,
    pub unresolved: Vec<UnresolvedCitation>,
    /// citation payload -> bound file path, for the Output Writer's
    /// `media_manifest` (token -> on-disk-name is derived downstream once
    /// the hashed filename is known).
    pub citation_bindings: Vec<(String, PathBuf)>,
}

/// Single-threaded cooperative pass that finalizes `by_size_and_gen_id`
/// before the parallel per-conversation phase starts. Must run exactly once
/// over every citation from every conversation; the index is immutable
/// afterward.
///
/// When a size is unique, the citation's own `(size, gen_id)` pair is bound
/// directly. When a size collides across several files, each candidate's own
/// `gen_id` (parsed from its filename by the indexer) breaks the tie — the
/// pair binds only if exactly one candidate's `gen_id` matches the
/// citation's, so two same-size citations with distinct gen-ids each resolve
/// to their own file rather than aliasing or both declining.
pub fn prepare_size_gen_id_index(index: &mut MediaIndex, all_citations: &[Citation]) {
    for citation in all_citations {
        if citation.kind != CitationKind::FileServicePointer {
            continue;
        }
        let (Some(size), Some(gen_id)) = (citation.expected_size, citation.gen_id.as_ref()) else {
            continue;
        };
        let key = (size, gen_id.clone());
        if index.by_size_and_gen_id.contains_key(&key) {
            continue;
        }

        let Some(candidates) = index.by_size.get(&size).cloned() else {
            continue;
        };

        if candidates.len() == 1 {
            index.by_size_and_gen_id.insert(key, candidates[0]);
            continue;
        }

        let mut matching =
            candidates.iter().filter(|&&id| index.files[id].gen_id.as_deref() == Some(gen_id.as_str()));
        if let (Some(&only), None) = (matching.next(), matching.next()) {
            index.by_size_and_gen_id.insert(key, only);
        }
    }
}

/// Resolves every citation belonging to one conversation, applying strategies
/// 1-7 in the fixed order. Returns the resolution alongside this
/// conversation's own partial statistics, so parallel callers can fold them
/// into the global `ResolverStats` without sharing a mutable reference.
pub fn resolve_conversation(
    index: &MediaIndex,
    conversation_id: &str,
    citations: &[Citation],
) -> (ConversationResolution, ResolverStats) {
    let mut stats = ResolverStats::default();
    for citation in citations {
        *stats.citations_by_kind.entry(kind_label(citation.kind).to_string()).or_insert(0) += 1;
    }

    let mut pending: Vec<Pending> =
        citations.iter().map(|c| Pending { citation: c, bound: None, strategy: None }).collect();

    for slot in &mut pending {
        if let Some(id) = strategy::try_hash_match(index, slot.citation) {
            slot.bound = Some(id);
            slot.strategy = Some(ResolveStrategy::HashMatch);
            continue;
        }
        if let Some(id) = strategy::try_file_id_match(index, slot.citation) {
            slot.bound = Some(id);
            slot.strategy = Some(ResolveStrategy::FileIdMatch);
            continue;
        }
        if let Some(id) = strategy::try_name_size_match(index, slot.citation) {
            slot.bound = Some(id);
            slot.strategy = Some(ResolveStrategy::NameSizeMatch);
        }
    }

    let mut directory_attached: Vec<usize> = Vec::new();
    let guard_kind_present = citations
        .iter()
        .any(|c| matches!(c.kind, CitationKind::DalleAsset | CitationKind::FileServicePointer));
    if guard_kind_present {
        let dir_files = index.by_conversation.get(conversation_id).cloned().unwrap_or_default();
        if !dir_files.is_empty() {
            directory_attached = dir_files;
            for slot in &mut pending {
                if slot.bound.is_none()
                    && matches!(
                        slot.citation.kind,
                        CitationKind::DalleAsset | CitationKind::FileServicePointer
                    )
                {
                    slot.bound = Some(directory_attached[0]);
                    slot.strategy = Some(ResolveStrategy::ConversationDirectoryMatch);
                }
            }
        }
    }

    for slot in &mut pending {
        if slot.bound.is_some() {
            continue;
        }
        if let Some(id) = strategy::try_size_gen_id_match(index, slot.citation) {
            slot.bound = Some(id);
            slot.strategy = Some(ResolveStrategy::SizeGenIdMatch);
        }
    }

    for slot in &mut pending {
        if slot.bound.is_some() {
            continue;
        }
        if let Some(id) = strategy::try_size_only_match(index, slot.citation) {
            slot.bound = Some(id);
            slot.strategy = Some(ResolveStrategy::SizeOnlyMatch);
        }
    }

    for slot in &mut pending {
        if slot.bound.is_some() {
            continue;
        }
        if let Some(id) = strategy::try_inline_text_match(index, slot.citation) {
            slot.bound = Some(id);
            slot.strategy = Some(ResolveStrategy::InlineTextMatch);
        }
    }

    let mut resolved_ids: BTreeSet<usize> = directory_attached.into_iter().collect();
    let mut unresolved = Vec::new();
    let mut citation_bindings = Vec::new();

    for slot in &pending {
        match (slot.bound, slot.strategy) {
            (Some(id), Some(strategy)) => {
                resolved_ids.insert(id);
                citation_bindings.push((slot.citation.payload.clone(), index.get(id).path.clone()));
                *stats
                    .resolutions_by_strategy
                    .entry(strategy.as_str().to_string())
                    .or_insert(0) += 1;
            }
            _ => {
                stats.unresolved_count += 1;
                unresolved.push(UnresolvedCitation {
                    message_id: slot.citation.message_id.clone(),
                    kind: slot.citation.kind,
                    payload: slot.citation.payload.clone(),
                });
            }
        }
    }

    // Sort lexicographically so output is independent of resolution order.
    let mut resolved_media: Vec<PathBuf> =
        resolved_ids.iter().map(|&id| index.get(id).path.clone()).collect();
    resolved_media.sort();

    (ConversationResolution { resolved_media, unresolved, citation_bindings }, stats)
}

fn kind_label(kind: CitationKind) -> &'static str {
    match kind {
        CitationKind::FileIdAttachment => "file_id_attachment",
        CitationKind::SedimentPointer => "sediment_pointer",
        CitationKind::FileServicePointer => "file_service_pointer",
        CitationKind::DalleAsset => "dalle_asset",
        CitationKind::InlineName => "inline_name",
        CitationKind::InlineUuid => "inline_uuid",
        CitationKind::InlineFileId => "inline_file_id",
    }
}
