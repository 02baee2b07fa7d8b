//! Core domain types shared across the pipeline.
//!
//! The data model here is a direct Rust rendering of the conversation/media
//! model: `MediaFile`/`MediaIndex` own the universe of on-disk media,
//! `Citation` is one reference to media found inside a message, and
//! `Conversation`/`Asset` are the normalized output shape.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Current output schema version, bumped whenever `conversation.json` or
/// `index.json`'s shape changes in an incompatible way.
pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

/// Coarse media classification derived from extension or magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeClass {
    Image,
    Audio,
    Document,
    Other,
}

/// One physical file under the extraction root.
///
/// Immutable once built by the Media Indexer; `arena_id` is this file's index
/// into `MediaIndex::files`, so every lookup table stores an index rather
/// than a copy of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub arena_id: usize,
    pub path: PathBuf,
    pub base_name: String,
    pub size_bytes: u64,
    pub file_id: Option<String>,
    pub content_hash: Option<String>,
    pub conversation_id: Option<String>,
    /// This file's own generation id, parsed from its filename when present.
    /// Used as a strategy-5 size-collision tiebreaker.
    #[serde(default)]
    pub gen_id: Option<String>,
    pub mime_class: MimeClass,
    /// True when this file was only found under a `recovered_files` sibling
    /// directory rather than inside the archive proper.
    #[serde(default)]
    pub recovered: bool,
}

/// The kind of media reference a `Citation` carries. Drives which resolver
/// strategies are even attempted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    FileIdAttachment,
    SedimentPointer,
    FileServicePointer,
    DalleAsset,
    InlineName,
    InlineUuid,
    InlineFileId,
}

/// One reference to media found inside a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub conversation_id: String,
    pub message_id: String,
    pub kind: CitationKind,
    /// The literal token extracted (file-id, hash, uuid, or bare name).
    pub payload: String,
    pub expected_size: Option<u64>,
    pub gen_id: Option<String>,
    pub original_name: Option<String>,
}

/// Why a resolver strategy bound (or declined to bind) a citation. Used for
/// the per-citation resolution status and for the verbose-mode report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    HashMatch,
    FileIdMatch,
    NameSizeMatch,
    ConversationDirectoryMatch,
    SizeGenIdMatch,
    SizeOnlyMatch,
    InlineTextMatch,
}

impl ResolveStrategy {
    /// The fixed evaluation order. A stronger match never
    /// loses to a weaker one because weaker strategies are simply never
    /// tried once an earlier one has bound the citation.
    pub const ORDER: [ResolveStrategy; 7] = [
        ResolveStrategy::HashMatch,
        ResolveStrategy::FileIdMatch,
        ResolveStrategy::NameSizeMatch,
        ResolveStrategy::ConversationDirectoryMatch,
        ResolveStrategy::SizeGenIdMatch,
        ResolveStrategy::SizeOnlyMatch,
        ResolveStrategy::InlineTextMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveStrategy::HashMatch => "hash",
            ResolveStrategy::FileIdMatch => "file_id",
            ResolveStrategy::NameSizeMatch => "name_size",
            ResolveStrategy::ConversationDirectoryMatch => "conversation_directory",
            ResolveStrategy::SizeGenIdMatch => "size_gen_id",
            ResolveStrategy::SizeOnlyMatch => "size_only",
            ResolveStrategy::InlineTextMatch => "inline_text",
        }
    }
}

/// A citation that survived all seven strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedCitation {
    pub message_id: String,
    pub kind: CitationKind,
    pub payload: String,
}

/// One linearized message in a normalized conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub node_id: String,
    pub role: String,
    pub create_time: Option<f64>,
    pub content_type: Option<String>,
    pub text: String,
}

/// The normalized conversation record written as `conversation.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub title: String,
    pub create_time: f64,
    pub update_time: f64,
    pub messages: Vec<NormalizedMessage>,
    /// The original branching map, kept verbatim so round-tripping the
    /// Resolver against a re-loaded `conversation.json` is possible.
    pub mapping: serde_json::Value,
    pub resolved_media: Vec<PathBuf>,
    pub unresolved_citations: Vec<UnresolvedCitation>,
    pub assets: Vec<Asset>,
}

/// A code-bearing artifact extracted from a message, independent of media
/// resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub node_id: String,
    pub ordinal: usize,
    pub language: String,
    pub kind: AssetKind,
    pub file_name: String,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Canvas,
    CodeBlock,
}

/// Global, cross-conversation statistics produced by the Resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverStats {
    pub citations_by_kind: std::collections::BTreeMap<String, usize>,
    pub resolutions_by_strategy: std::collections::BTreeMap<String, usize>,
    pub unresolved_count: usize,
    pub media_index_collisions: usize,
}

impl ResolverStats {
    /// Folds `other` into `self`. Used to combine per-conversation partial
    /// stats produced by parallel resolution workers.
    pub fn merge(&mut self, other: ResolverStats) {
        for (k, v) in other.citations_by_kind {
            *self.citations_by_kind.entry(k).or_insert(0) += v;
        }
        for (k, v) in other.resolutions_by_strategy {
            *self.resolutions_by_strategy.entry(k).or_insert(0) += v;
        }
        self.unresolved_count += other.unresolved_count;
        self.media_index_collisions += other.media_index_collisions;
    }
}

/// One row of the master index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDescriptor {
    pub conversation_id: String,
    pub title: String,
    pub date: String,
    pub message_count: usize,
    pub has_media: bool,
    pub has_assets: bool,
    pub folder_name: String,
}

/// The master index document (`index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterIndex {
    pub schema_version: String,
    pub total_conversations: usize,
    pub conversations: Vec<ConversationDescriptor>,
    pub stats: ResolverStats,
    pub processing_time_seconds: f64,
    /// Recorded so `rematch-media` can find the extraction root without
    /// re-unpacking, when it was retained.
    pub extraction_root: Option<PathBuf>,
}

/// Citation-token -> on-disk-name map written alongside each conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaManifest {
    pub entries: Vec<MediaManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaManifestEntry {
    pub citation_token: String,
    pub on_disk_name: String,
}

/// Media filename extensions the Indexer treats as media-like, in the
/// absence of a magic-byte match.
pub fn media_extensions() -> &'static BTreeSet<&'static str> {
    static SET: once_cell::sync::Lazy<BTreeSet<&'static str>> = once_cell::sync::Lazy::new(|| {
        [
            "png", "webp", "jpg", "jpeg", "gif", "bmp", "wav", "mp3", "m4a", "ogg", "pdf", "dat",
            "heic", "heif", "mov", "mp4", "webm",
        ]
        .into_iter()
        .collect()
    });
    &SET
}
