//! Whitespace-aware chunking for the sink's per-message length limit.

use crate::error::SplitError;

/// Split `input` into chunks of at most `chunk_size` characters, preferring
/// to break on whitespace and trimming each piece.
///
/// A chunk is only shortened when taking the full `chunk_size` would cut a
/// word in half (the next character exists and is not whitespace); the cut
/// then moves back to the last whitespace inside the chunk, which is counted
/// as consumed so the walk always advances. Pieces that trim to nothing are
/// dropped. Sizes are counted in characters, never bytes, so multibyte input
/// cannot be split inside a code point.
pub fn split(input: &str, chunk_size: usize) -> Result<Vec<String>, SplitError> {
    if input.is_empty() {
        return Err(SplitError::EmptyInput);
    }
    if chunk_size < 1 {
        return Err(SplitError::InvalidChunkSize(chunk_size));
    }

    let chars: Vec<char> = input.chars().collect();
    let mut chunks = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let mut length = chunk_size.min(chars.len() - index);
        let candidate = &chars[index..index + length];

        let cuts_mid_word = length == chunk_size
            && chars
                .get(index + length)
                .is_some_and(|next| !next.is_whitespace());
        if cuts_mid_word
            && let Some(last_ws) = candidate.iter().rposition(|c| c.is_whitespace())
        {
            length = last_ws + 1;
        }

        let chunk: String = chars[index..index + length].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        index += length;
    }

    Ok(chunks)
}
