//! Sentence-boundary text chunker.
//!
//! Splits cleaned document text into chunks of at most `chunk_size` words.
//! Sentences are never split: they are packed greedily, and when the next
//! sentence would overflow the current chunk, the chunk is closed and the
//! next one is seeded with trailing sentences of the closed chunk whose
//! combined word count fits the `overlap` budget.
//!
//! A sentence longer than `chunk_size` on its own becomes a chunk by itself.
//! When the overlap seed plus the overflowing sentence would still exceed
//! `chunk_size`, the oldest seed sentences are dropped until it fits, so
//! `overlap >= chunk_size` degrades to smaller overlaps instead of
//! near-duplicate chunks.

use unicode_segmentation::UnicodeSegmentation;

/// Split text into trimmed sentences using Unicode sentence boundaries
/// (UAX #29). Fragments without any alphanumeric character are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split text into overlapping chunks. Returns an empty vector when the
/// text has no sentences.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    chunk_sentences(text, chunk_size, overlap)
        .into_iter()
        .map(|sentences| sentences.join(" "))
        .collect()
}

/// Same as [`chunk_text`] but keeps each chunk as its list of sentences.
pub fn chunk_sentences(text: &str, chunk_size: usize, overlap: usize) -> Vec<Vec<&str>> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for sentence in split_sentences(text) {
        let words = word_count(sentence);

        if current_words + words > chunk_size && !current.is_empty() {
            let seed = overlap_suffix(&current, overlap);
            chunks.push(std::mem::replace(&mut current, seed));
            current_words = current.iter().map(|s| word_count(s)).sum();

            while !current.is_empty() && current_words + words > chunk_size {
                let dropped = current.remove(0);
                current_words -= word_count(dropped);
            }
        }

        current.push(sentence);
        current_words += words;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Trailing sentences of `chunk` whose total word count stays within
/// `overlap`, in original order. Stops at the first sentence that would
/// exceed the budget.
fn overlap_suffix<'a>(chunk: &[&'a str], overlap: usize) -> Vec<&'a str> {
    let mut taken = 0usize;
    let mut start = chunk.len();

    for (i, sentence) in chunk.iter().enumerate().rev() {
        let words = word_count(sentence);
        if taken + words > overlap {
            break;
        }
        taken += words;
        start = i;
    }

    chunk[start..].to_vec()
}
