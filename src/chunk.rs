//! Overlapping text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks share up to `overlap` characters so
//! retrieval keeps context that straddles a boundary. Cuts prefer, in
//! order, a paragraph break (`\n\n`), a line break, then a space, searched
//! in the back half of the window; otherwise the cut is hard.
//!
//! Each chunk carries a SHA-256 hash of its text so the index can embed
//! repeated passages once.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split text into overlapping chunks. Returns chunks with contiguous
/// indices starting at 0, or no chunks if the text is blank.
///
/// `overlap` must be smaller than `chunk_size`; callers validate this
/// through the config.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = skip_whitespace(&chars, 0);

    while start < total {
        let hard_end = (start + chunk_size).min(total);
        let end = if hard_end < total {
            find_break(&chars, start, hard_end).unwrap_or(hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(chunk_index, piece));
            chunk_index += 1;
        }

        if end >= total {
            break;
        }

        // Step back by the overlap, then forward to a word start so the
        // next chunk does not open mid-word.
        let mut next = end.saturating_sub(overlap).max(start + 1);
        if next < end && !chars[next - 1].is_whitespace() {
            if let Some(ws) = (next..end).find(|&i| chars[i].is_whitespace()) {
                next = ws;
            }
        }
        start = skip_whitespace(&chars, next);
    }

    chunks
}

/// Finds the best cut position in `(start, end]`, looking only at the back
/// half of the window. Returns the index just past the separator.
fn find_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let floor = start + (end - start) / 2;

    let paragraph = (floor..end.saturating_sub(1))
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i + 1] == '\n')
        .map(|i| i + 2);
    if paragraph.is_some() {
        return paragraph;
    }

    for sep in ['\n', ' '] {
        if let Some(i) = (floor..end).rev().find(|&i| chars[i] == sep) {
            return Some(i + 1);
        }
    }
    None
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn make_chunk(index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
