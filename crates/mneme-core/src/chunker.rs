//! Splits normalized document text into overlapping, bounded chunks.
//! Sentence boundaries first; a sentence longer than the target size is
//! emitted whole rather than split mid-sentence.

use serde::{Deserialize, Serialize};

use crate::keywords::extract_keywords;

/// Default target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default overlap budget in characters.
pub const DEFAULT_OVERLAP: usize = 100;
/// Chunks shorter than this are dropped by default.
pub const DEFAULT_MIN_CHARS: usize = 50;

/// A bounded span of source text with a stable, source-derived id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub index: usize,
    pub keywords: Vec<String>,
}

/// Chunking knobs. All sizes are character counts, never bytes; the corpus
/// is CJK-heavy and multi-byte throughout.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap budget in characters; the trailing `overlap / 5` words of an
    /// emitted chunk seed the next buffer.
    pub overlap: usize,
    /// Chunks shorter than this are dropped.
    pub min_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

/// Chunk one document's normalized text. Chunk ids are `"{source}-{index}"`,
/// unique and strictly increasing within a source; chunk order matches
/// document order.
pub fn chunk_text(text: &str, source: &str, opts: &ChunkingOptions) -> Vec<Chunk> {
    let mut buffers: Vec<String> = Vec::new();
    let mut buffer = String::new();

    for sentence in split_sentences(text) {
        if buffer.is_empty() {
            buffer = sentence.to_string();
            continue;
        }
        if char_len(&buffer) + 1 + char_len(sentence) > opts.chunk_size {
            // Seed the next buffer with the tail of the one we just emitted,
            // so context survives the boundary.
            let carry = overlap_carry(&buffer, opts.overlap);
            buffers.push(std::mem::take(&mut buffer));
            buffer = if carry.is_empty() {
                sentence.to_string()
            } else {
                format!("{carry} {sentence}")
            };
        } else {
            buffer.push(' ');
            buffer.push_str(sentence);
        }
    }
    if !buffer.trim().is_empty() {
        buffers.push(buffer);
    }

    buffers
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && char_len(t) >= opts.min_chars)
        .enumerate()
        .map(|(index, text)| Chunk {
            id: format!("{source}-{index}"),
            keywords: extract_keywords(&text),
            text,
            source: source.to_string(),
            index,
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on terminal punctuation followed by whitespace (or end of text).
/// Runs like "?!" stay with their sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if !is_terminal(ch) {
            continue;
        }
        let at_boundary = chars
            .peek()
            .map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn is_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Trailing `overlap / 5` whitespace-delimited words of the emitted buffer.
/// A buffer with no whitespace at all (one unbroken run) carries trailing
/// characters instead.
fn overlap_carry(buffer: &str, overlap: usize) -> String {
    let take = overlap / 5;
    if take == 0 {
        return String::new();
    }
    let words: Vec<&str> = buffer.split_whitespace().collect();
    if words.len() > 1 {
        words[words.len().saturating_sub(take)..].join(" ")
    } else {
        let chars: Vec<char> = buffer.chars().collect();
        chars[chars.len().saturating_sub(take)..].iter().collect()
    }
}
