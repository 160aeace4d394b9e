//! The embedding-provider seam between the build pipeline and whatever turns
//! chunk text into vectors. Two implementations: the local TF encoder here
//! and the remote batch client in [`crate::remote`]. The merger and the
//! retriever never know which one produced a vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::chunker::Chunk;
use crate::corpus::EmbeddingRecord;
use crate::encoder::encode;
use crate::vocab::Vocabulary;

/// Cooperative cancellation flag, checked between embedding batches. Never
/// interrupts a request already in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Vectors produced for one batch of chunks, plus how many chunks had to be
/// skipped after all fallbacks failed.
#[derive(Debug, Default)]
pub struct EmbeddingOutput {
    pub records: Vec<EmbeddingRecord>,
    pub skipped: usize,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name for logs and the build summary.
    fn name(&self) -> &str;

    /// Embeds the given chunks. Per-chunk failures are absorbed into
    /// `skipped`; an `Err` means the whole run cannot continue (for example,
    /// cancellation).
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancelToken,
    ) -> Result<EmbeddingOutput, ProviderError>;
}

/// Local term-frequency encoder over a vocabulary snapshot. Infallible and
/// instant; it never skips a chunk.
pub struct LocalTfProvider {
    vocabulary: Vocabulary,
}

impl LocalTfProvider {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalTfProvider {
    fn name(&self) -> &str {
        "local-tf"
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancelToken,
    ) -> Result<EmbeddingOutput, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let records = chunks
            .iter()
            .map(|c| EmbeddingRecord {
                id: c.id.clone(),
                vector: encode(&c.text, &self.vocabulary),
            })
            .collect();
        Ok(EmbeddingOutput {
            records,
            skipped: 0,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("embedding endpoint URL is invalid: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("API credential is not a valid header value")]
    InvalidCredential,
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("build cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunk;
    use crate::vocab::DEFAULT_MAX_TERMS;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source: "doc".to_string(),
            index: 0,
            keywords: Vec::new(),
        }
    }

    #[tokio::test]
    async fn local_provider_encodes_every_chunk() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.extend_from_texts(["사과 바나나"], DEFAULT_MAX_TERMS);
        let provider = LocalTfProvider::new(vocabulary);

        let chunks = vec![chunk("doc-0", "사과 사과"), chunk("doc-1", "바나나")];
        let output = provider
            .embed_chunks(&chunks, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.skipped, 0);
        assert_eq!(output.records[0].id, "doc-0");
        assert_eq!(output.records[0].vector.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_run() {
        let provider = LocalTfProvider::new(Vocabulary::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = provider.embed_chunks(&[], &cancel).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
