//! The ordered, append-only term dictionary that defines vector dimensions.
//!
//! A term's position is its permanent dimension index. Indices never change
//! across ingestion runs; that is what keeps previously computed vectors
//! valid after a merge.

use std::collections::HashMap;

use crate::tokens::tokenize;

/// Terms kept by the initial build, ranked by global frequency.
pub const DEFAULT_MAX_TERMS: usize = 1000;

/// Ordered term dictionary. All vector-producing paths go through
/// [`Vocabulary::index_of`] rather than touching raw positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the term→index map from an ordered term list, e.g. one read
    /// back from the embeddings file. Order is preserved verbatim.
    pub fn from_terms(terms: Vec<String>) -> Self {
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self { terms, index }
    }

    /// Dimension index of a term, if present.
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Number of terms, which equals the vector dimension.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in dimension order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Extends the vocabulary from the given texts and returns how many terms
    /// were appended.
    ///
    /// On an empty vocabulary this is the initial build: the top `max_terms`
    /// terms by descending global frequency, ties in first-encounter order.
    /// On a non-empty vocabulary every existing term keeps its index and every
    /// unseen term is appended in first-encounter order. The cap applies only
    /// to the initial build.
    pub fn extend_from_texts<'a, I>(&mut self, texts: I, max_terms: usize) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for text in texts {
            for token in tokenize(text) {
                match counts.get_mut(&token) {
                    Some(n) => *n += 1,
                    None => {
                        counts.insert(token.clone(), 1);
                        order.push(token);
                    }
                }
            }
        }

        if self.is_empty() {
            // Initial build: rank by frequency, stable sort keeps
            // first-encounter order for ties.
            order.sort_by_key(|term| std::cmp::Reverse(counts[term]));
            order.truncate(max_terms);
            let before = self.terms.len();
            for term in order {
                self.push(term);
            }
            return self.terms.len() - before;
        }

        let before = self.terms.len();
        for term in order {
            if !self.index.contains_key(&term) {
                self.push(term);
            }
        }
        self.terms.len() - before
    }

    fn push(&mut self, term: String) {
        let idx = self.terms.len();
        self.index.insert(term.clone(), idx);
        self.terms.push(term);
    }
}
