//! Query-time similarity retrieval over an immutable corpus snapshot.
//!
//! Read-only: any number of retrievals may run concurrently against the same
//! snapshot. A build that swaps in a new corpus never disturbs queries
//! already in flight; they keep the `Arc` they started with.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::corpus::Corpus;
use crate::encoder::{dot, encode};

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 5;

/// One ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub id: String,
    pub text: String,
    pub source: String,
    pub score: f64,
}

/// Encodes the query against the corpus vocabulary and returns the top `k`
/// chunks by cosine similarity. Ties keep corpus insertion order.
///
/// An empty corpus yields an empty result so the caller can proceed without
/// retrieved context. A dimension mismatch is fatal for this query: it means
/// the corpus files are corrupt or from different merge generations.
pub fn retrieve(corpus: &Corpus, query: &str, k: usize) -> Result<Vec<Hit>, RetrieveError> {
    if corpus.embeddings.is_empty() {
        return Ok(Vec::new());
    }

    let query_vector = encode(query, &corpus.vocabulary);
    let stored = corpus.embeddings[0].vector.len();
    if query_vector.len() != stored {
        return Err(RetrieveError::DimensionMismatch {
            query: query_vector.len(),
            stored,
        });
    }

    let mut scored: Vec<(usize, f64)> = corpus
        .embeddings
        .iter()
        .enumerate()
        .map(|(i, record)| (i, dot(&query_vector, &record.vector)))
        .collect();
    // Stable sort keeps insertion order for equal scores.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut hits = Vec::with_capacity(k.min(scored.len()));
    for (idx, score) in scored.into_iter().take(k) {
        let record = &corpus.embeddings[idx];
        let Some(chunk) = corpus.chunks.iter().find(|c| c.id == record.id) else {
            debug!(id = %record.id, "embedding record without a chunk, skipping");
            continue;
        };
        hits.push(Hit {
            id: chunk.id.clone(),
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            score,
        });
    }
    Ok(hits)
}

/// Serving-side holder of the latest corpus snapshot. `snapshot` is taken
/// once per query; `replace` swaps the snapshot after a build run or a
/// corpus-file change notification.
#[derive(Debug)]
pub struct CorpusHandle {
    current: RwLock<Arc<Corpus>>,
}

impl CorpusHandle {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
        }
    }

    /// The snapshot to bind a request to.
    pub fn snapshot(&self) -> Arc<Corpus> {
        Arc::clone(&self.current.read().expect("corpus lock poisoned"))
    }

    /// Publishes a new snapshot for subsequent requests.
    pub fn replace(&self, corpus: Corpus) {
        *self.current.write().expect("corpus lock poisoned") = Arc::new(corpus);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("query vector dimension {query} does not match stored embedding dimension {stored}")]
    DimensionMismatch { query: usize, stored: usize },
}
