//! Paragraph-boundary segmenter for ingested lecture files.
//!
//! A file body is cut into [`Chunk`]s of at most `max_tokens` (approximated
//! as four characters per token). Cuts fall on blank lines where possible;
//! a paragraph that is too long on its own is split at the last newline or
//! space before the limit. Transcripts often arrive as one giant paragraph,
//! so that fallback is the common path for them.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into segments with contiguous indices starting at 0.
///
/// Whitespace-only input yields no segments.
pub fn segment_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();
        let buf_len = buf.chars().count();

        if !buf.is_empty() && buf_len + 2 + para_len > max_chars {
            pieces.push(std::mem::take(&mut buf));
        }

        if para_len > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.extend(hard_split(para, max_chars));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, piece))
        .collect()
}

/// Split an oversize paragraph, preferring newline then space boundaries.
fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = para;

    while !remaining.is_empty() {
        let limit = byte_offset_of_char(remaining, max_chars);
        if limit >= remaining.len() {
            out.push(remaining.trim().to_string());
            break;
        }
        let window = &remaining[..limit];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }

    out
}

/// Byte offset of the `n`th char, or `s.len()` when `s` is shorter.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: format!("{:x}", hasher.finalize()),
    }
}
