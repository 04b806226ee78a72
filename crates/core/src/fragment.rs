//! Request-shaped text fragmentation for plagiarism checks.
//!
//! Two chunking modes: sentence-boundary chunks with a minimum word count,
//! and fixed-size sliding windows with overlap. Both emit `(index, text)`
//! pairs where the index numbers the emitted chunks.

use crate::error::{CoreError, CoreResult};

/// Sentence terminators: ASCII and their fullwidth/ideographic counterparts.
const TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Split `text` on sentence boundaries and emit chunks of at least
/// `min_words` words. Consecutive sentences below the minimum are
/// concatenated until it is reached. A text whose sentences never reach the
/// minimum is emitted whole as a single chunk.
pub fn sentences(text: &str, min_words: usize) -> Vec<(usize, String)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffered_words = 0usize;

    for sentence in split_sentences(trimmed) {
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(sentence);
        buffered_words += sentence.split_whitespace().count();

        if buffered_words >= min_words {
            chunks.push((chunks.len(), std::mem::take(&mut buffer)));
            buffered_words = 0;
        }
    }

    // Text too short for any chunk: fall back to the whole input.
    if chunks.is_empty() {
        chunks.push((0, trimmed.to_string()));
    }

    chunks
}

/// Overlapping windows of `window_words` words advancing by
/// `window_words - overlap_words`. A text with at most `window_words` words
/// is returned as one window. Requires `0 < overlap_words < window_words`.
pub fn sliding(
    text: &str,
    window_words: usize,
    overlap_words: usize,
) -> CoreResult<Vec<(usize, String)>> {
    if overlap_words == 0 || overlap_words >= window_words {
        return Err(CoreError::InvalidInput(format!(
            "sliding window requires 0 < overlap < window, got overlap={overlap_words} window={window_words}"
        )));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }
    if words.len() <= window_words {
        return Ok(vec![(0, words.join(" "))]);
    }

    let step = window_words - overlap_words;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window_words).min(words.len());
        chunks.push((chunks.len(), words[start..end].join(" ")));
        if end >= words.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Iterate sentences: a terminator counts only when followed by whitespace or
/// the end of the text, so abbreviation dots inside a token do not split.
fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if TERMINATORS.contains(&ch) {
            let boundary = match chars.peek() {
                Some(&(_, next)) => next.is_whitespace(),
                None => true,
            };
            if boundary {
                let end = idx + ch.len_utf8();
                let piece = text[start..end].trim();
                if !piece.is_empty() {
                    sentences.push(piece);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences.into_iter()
}
