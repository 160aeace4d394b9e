//! Remote embedding client. Sends chunk texts to an OpenAI-compatible
//! embeddings endpoint in bounded batches, degrades to per-item retries when
//! a batch fails, and sleeps between requests to respect the service's
//! global rate limit. Batches are never issued concurrently.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::chunker::Chunk;
use crate::corpus::EmbeddingRecord;
use crate::provider::{CancelToken, EmbeddingOutput, EmbeddingProvider, ProviderError};

/// Maximum chunks per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Pause between successive batch requests.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;
/// Pause between successive single-item retries.
pub const DEFAULT_ITEM_DELAY_MS: u64 = 200;

/// One embedding round-trip. Factored out of the client so tests can stand
/// in a failing transport.
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    /// Returns one vector per input text, in request order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, TransportError>;
}

/// reqwest-backed transport for OpenAI-compatible `/embeddings` endpoints.
pub struct HttpEmbeddingTransport {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpEmbeddingTransport {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Url::parse(base_url)?;
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| ProviderError::InvalidCredential)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(ProviderError::Client)?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingTransport for HttpEmbeddingTransport {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, TransportError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(TransportError::CountMismatch {
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
    index: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

/// The remote embedding provider. Vectors are recorded exactly as the
/// service returns them, with no re-normalization.
pub struct RemoteEmbedder {
    transport: Box<dyn EmbeddingTransport>,
    model: String,
    batch_size: usize,
    batch_delay: Duration,
    item_delay: Duration,
}

impl RemoteEmbedder {
    pub fn new(transport: Box<dyn EmbeddingTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            item_delay: Duration::from_millis(DEFAULT_ITEM_DELAY_MS),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_delays(mut self, batch_delay: Duration, item_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self.item_delay = item_delay;
        self
    }

    /// Model identifier recorded in the remote embeddings file.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Re-issues a failed batch one chunk at a time. A chunk that fails here
    /// too is skipped for good, not retried again.
    async fn embed_singly(&self, batch: &[Chunk], output: &mut EmbeddingOutput) {
        for (i, chunk) in batch.iter().enumerate() {
            if i > 0 && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }
            match self
                .transport
                .embed(std::slice::from_ref(&chunk.text))
                .await
            {
                Ok(mut vectors) if !vectors.is_empty() => {
                    output.records.push(EmbeddingRecord {
                        id: chunk.id.clone(),
                        vector: vectors.swap_remove(0),
                    });
                }
                Ok(_) => {
                    warn!(id = %chunk.id, "embedding service returned no vector, skipping chunk");
                    output.skipped += 1;
                }
                Err(err) => {
                    warn!(id = %chunk.id, error = %err, "single-item retry failed, skipping chunk");
                    output.skipped += 1;
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    fn name(&self) -> &str {
        "remote"
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancelToken,
    ) -> Result<EmbeddingOutput, ProviderError> {
        let mut output = EmbeddingOutput::default();
        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            match self.transport.embed(&texts).await {
                Ok(vectors) => {
                    debug!(batch = i, size = batch.len(), "embedded batch");
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        output.records.push(EmbeddingRecord {
                            id: chunk.id.clone(),
                            vector,
                        });
                    }
                }
                Err(err) => {
                    warn!(batch = i, error = %err, "batch failed, falling back to per-item requests");
                    self.embed_singly(batch, &mut output).await;
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source: "doc".to_string(),
            index: 0,
            keywords: Vec::new(),
        }
    }

    /// Fails whole batches on demand; fails single items whose text contains
    /// "나쁜". Records the size of every request it sees.
    struct FlakyTransport {
        fail_batches: bool,
        request_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl FlakyTransport {
        fn new(fail_batches: bool) -> Self {
            Self {
                fail_batches,
                request_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl EmbeddingTransport for FlakyTransport {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, TransportError> {
            self.request_sizes.lock().unwrap().push(texts.len());
            if self.fail_batches && texts.len() > 1 {
                return Err(TransportError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            if texts.len() == 1 && texts[0].contains("나쁜") {
                return Err(TransportError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(texts.iter().map(|t| vec![t.chars().count() as f64]).collect())
        }
    }

    fn embedder(fail_batches: bool, batch_size: usize) -> RemoteEmbedder {
        RemoteEmbedder::new(Box::new(FlakyTransport::new(fail_batches)), "fake-model")
            .with_batch_size(batch_size)
            .with_delays(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn batches_are_bounded_and_ordered() {
        let embedder = embedder(false, 2);
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(&format!("doc-{i}"), &"글".repeat(i + 1)))
            .collect();
        let output = embedder
            .embed_chunks(&chunks, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(output.records.len(), 5);
        assert_eq!(output.skipped, 0);
        for (i, record) in output.records.iter().enumerate() {
            assert_eq!(record.id, format!("doc-{i}"));
            assert_eq!(record.vector, vec![(i + 1) as f64]);
        }
    }

    #[tokio::test]
    async fn failed_batch_falls_back_to_single_items() {
        let embedder = embedder(true, 3);
        let chunks = vec![
            chunk("doc-0", "좋은 문장"),
            chunk("doc-1", "나쁜 문장"),
            chunk("doc-2", "또 좋은 문장"),
        ];
        let output = embedder
            .embed_chunks(&chunks, &CancelToken::new())
            .await
            .unwrap();

        // Every chunk whose individual retry succeeded is present; the one
        // that failed twice is counted as skipped and nothing else.
        assert_eq!(output.skipped, 1);
        let ids: Vec<&str> = output.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-0", "doc-2"]);
    }

    #[tokio::test]
    async fn oversized_input_is_split_into_batches() {
        let transport = FlakyTransport::new(false);
        let sizes = Arc::clone(&transport.request_sizes);
        let embedder = RemoteEmbedder::new(Box::new(transport), "fake-model")
            .with_batch_size(2)
            .with_delays(Duration::ZERO, Duration::ZERO);

        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(&format!("doc-{i}"), "본문")).collect();
        embedder
            .embed_chunks(&chunks, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(*sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_batches() {
        let embedder = embedder(false, 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = embedder.embed_chunks(&[chunk("doc-0", "본문")], &cancel).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let embedder = embedder(true, 2);
        let output = embedder
            .embed_chunks(&[], &CancelToken::new())
            .await
            .unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.skipped, 0);
    }
}
