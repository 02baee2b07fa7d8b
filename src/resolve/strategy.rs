//! Individual strategy lookups used by `resolve_conversation`. Each returns
//! the arena id of the file it binds, or `None` if this strategy declines.

use crate::domain::{Citation, CitationKind};
use crate::index::MediaIndex;

pub fn try_hash_match(index: &MediaIndex, citation: &Citation) -> Option<usize> {
    if citation.kind != CitationKind::SedimentPointer {
        return None;
    }
    index.by_hash.get(&citation.payload).copied()
}

pub fn try_file_id_match(index: &MediaIndex, citation: &Citation) -> Option<usize> {
    if !matches!(
        citation.kind,
        CitationKind::FileIdAttachment | CitationKind::FileServicePointer | CitationKind::InlineFileId
    ) {
        return None;
    }
    index.by_file_id.get(&citation.payload).copied()
}

pub fn try_name_size_match(index: &MediaIndex, citation: &Citation) -> Option<usize> {
    let name = citation.original_name.as_ref()?;
    let size = citation.expected_size?;
    index.by_name_size.get(&(name.clone(), size)).copied()
}

pub fn try_size_gen_id_match(index: &MediaIndex, citation: &Citation) -> Option<usize> {
    if citation.kind != CitationKind::FileServicePointer {
        return None;
    }
    let size = citation.expected_size?;
    let gen_id = citation.gen_id.as_ref()?;
    index.by_size_and_gen_id.get(&(size, gen_id.clone())).copied()
}

/// Declines (returns `None`) on size collisions, never guesses.
pub fn try_size_only_match(index: &MediaIndex, citation: &Citation) -> Option<usize> {
    let size = citation.expected_size?;
    let candidates = index.by_size.get(&size)?;
    if candidates.len() == 1 {
        Some(candidates[0])
    } else {
        None
    }
}

/// Only for `inline_name`/`inline_uuid`; binds only when the token appears in
/// exactly one indexed base name.
pub fn try_inline_text_match(index: &MediaIndex, citation: &Citation) -> Option<usize> {
    if !matches!(citation.kind, CitationKind::InlineName | CitationKind::InlineUuid) {
        return None;
    }
    let mut matches = index.files.iter().filter(|f| f.base_name.contains(&citation.payload));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first.arena_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MimeClass;
    use std::path::PathBuf;

    fn index_with(files: Vec<(&str, u64)>) -> MediaIndex {
        let mut index = MediaIndex::default();
        for (id, (name, size)) in files.into_iter().enumerate() {
            index.files.push(crate::domain::MediaFile {
                arena_id: id,
                path: PathBuf::from(name),
                base_name: name.to_string(),
                size_bytes: size,
                file_id: None,
                content_hash: None,
                conversation_id: None,
                gen_id: None,
                mime_class: MimeClass::Other,
                recovered: false,
            });
        }
        index
    }

    #[test]
    fn size_only_declines_on_collision() {
        let index = index_with(vec![("a.png", 100), ("b.png", 100)]);
        let citation = Citation {
            conversation_id: "c".into(),
            message_id: "m".into(),
            kind: CitationKind::InlineName,
            payload: "x".into(),
            expected_size: Some(100),
            gen_id: None,
            original_name: None,
        };
        assert!(try_size_only_match(&index, &citation).is_none());
    }

    #[test]
    fn inline_text_requires_unique_substring_match() {
        let index = index_with(vec![("photo.png", 10), ("photo_copy.png", 20)]);
        let citation = Citation {
            conversation_id: "c".into(),
            message_id: "m".into(),
            kind: CitationKind::InlineName,
            payload: "photo.png".into(),
            expected_size: None,
            gen_id: None,
            original_name: None,
        };
        assert_eq!(try_inline_text_match(&index, &citation), Some(0));
    }
}
