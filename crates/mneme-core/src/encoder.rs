//! Term-frequency vector encoding over the current vocabulary.
//!
//! The same function encodes stored chunks and incoming queries. Encoding a
//! query with a different tokenizer or a stale vocabulary snapshot breaks
//! comparability, so there is exactly one entry point.

use crate::tokens::tokenize;
use crate::vocab::Vocabulary;

/// Encodes `text` into an L2-normalized term-frequency vector.
///
/// Tokens absent from the vocabulary contribute nothing. A text with no
/// vocabulary terms at all encodes to the all-zero vector. Output length
/// always equals `vocab.len()`.
pub fn encode(text: &str, vocab: &Vocabulary) -> Vec<f64> {
    let mut vector = vec![0.0f64; vocab.len()];
    for token in tokenize(text) {
        if let Some(idx) = vocab.index_of(&token) {
            vector[idx] += 1.0;
        }
    }
    normalize(&mut vector);
    vector
}

/// Scales the vector to unit Euclidean norm in place. The zero vector stays
/// zero.
pub fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product. Both inputs are unit vectors, so this is cosine similarity.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
