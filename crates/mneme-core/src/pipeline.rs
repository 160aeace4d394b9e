//! The offline build pipeline: documents → chunks → vocabulary → vectors →
//! merged corpus on disk.
//!
//! Runs as a single sequential batch job. The local TF corpus always
//! advances so the retriever has a consistent snapshot; the remote provider,
//! when requested, additionally produces the remote embeddings file for
//! downstream consumers.

use std::path::Path;

use tracing::{info, warn};

use crate::chunker::{chunk_text, Chunk};
use crate::config::{BuildSettings, RemoteSettings};
use crate::corpus::{Corpus, CorpusBatch, CorpusError, EmbeddingRecord, RemoteEmbeddingFile};
use crate::documents::{load_sources, DocumentError};
use crate::provider::{CancelToken, EmbeddingProvider, LocalTfProvider, ProviderError};
use crate::remote::{HttpEmbeddingTransport, RemoteEmbedder};

/// End-of-run counts reported to the operator.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Documents ingested this run.
    pub documents: usize,
    /// Sources that failed to load and were skipped.
    pub sources_skipped: usize,
    /// Chunks added to the corpus this run.
    pub chunks_added: usize,
    /// Chunks the embedding provider had to skip.
    pub chunks_skipped: usize,
    /// Terms appended to the vocabulary this run.
    pub terms_appended: usize,
    /// Vocabulary size after the run.
    pub vocabulary_size: usize,
    /// Corpus size after the run.
    pub total_chunks: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Documents(#[from] DocumentError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Runs one build: loads the existing corpus, ingests sources not yet in it,
/// extends the vocabulary, encodes, merges, and writes the output files with
/// an atomic replace. Per-source and per-chunk failures are isolated and
/// counted; they never abort the run.
pub async fn run_build(
    settings: &BuildSettings,
    cancel: &CancelToken,
) -> Result<BuildSummary, BuildError> {
    let existing = Corpus::load(&settings.output_dir)?;
    info!(
        chunks = existing.chunks.len(),
        terms = existing.vocabulary.len(),
        "loaded existing corpus"
    );

    let outcome = load_sources(
        &settings.input_dir,
        &settings.sources,
        settings.chunking.min_chars,
    )?;
    let mut summary = BuildSummary {
        sources_skipped: outcome.skipped,
        ..Default::default()
    };

    // Chunk ids derive from (source, index), so a source already in the
    // corpus is never re-ingested.
    let mut new_chunks: Vec<Chunk> = Vec::new();
    for doc in &outcome.documents {
        if existing.has_source(&doc.source) {
            info!(source = %doc.source, "source already in corpus, skipping");
            continue;
        }
        let chunks = chunk_text(&doc.text, &doc.source, &settings.chunking);
        info!(source = %doc.source, chunks = chunks.len(), "chunked source");
        summary.documents += 1;
        new_chunks.extend(chunks);
    }
    summary.chunks_added = new_chunks.len();

    if new_chunks.is_empty() {
        info!("no new sources, corpus left untouched");
        summary.vocabulary_size = existing.vocabulary.len();
        summary.total_chunks = existing.chunks.len();
        return Ok(summary);
    }

    // Remote vectors are produced before the merge consumes the chunks.
    if let Some(remote) = &settings.remote {
        summary.chunks_skipped +=
            run_remote(remote, &new_chunks, &settings.output_dir, cancel).await?;
    }

    let mut vocabulary = existing.vocabulary.clone();
    summary.terms_appended =
        vocabulary.extend_from_texts(new_chunks.iter().map(|c| c.text.as_str()), settings.max_terms);

    let provider = LocalTfProvider::new(vocabulary.clone());
    let output = provider.embed_chunks(&new_chunks, cancel).await?;
    summary.chunks_skipped += output.skipped;

    let merged = existing.merge(CorpusBatch {
        chunks: new_chunks,
        vocabulary,
        embeddings: output.records,
    })?;
    summary.vocabulary_size = merged.vocabulary.len();
    summary.total_chunks = merged.chunks.len();
    merged.save(&settings.output_dir)?;

    info!(
        documents = summary.documents,
        chunks = summary.chunks_added,
        skipped_sources = summary.sources_skipped,
        skipped_chunks = summary.chunks_skipped,
        vocabulary = summary.vocabulary_size,
        "build finished"
    );
    Ok(summary)
}

/// Embeds the new chunks through the remote endpoint and folds the records
/// into the remote embeddings file. Returns the skipped-chunk count.
async fn run_remote(
    remote: &RemoteSettings,
    chunks: &[Chunk],
    output_dir: &Path,
    cancel: &CancelToken,
) -> Result<usize, BuildError> {
    let transport =
        HttpEmbeddingTransport::new(&remote.base_url, &remote.api_key, &remote.model, remote.timeout)?;
    let embedder = RemoteEmbedder::new(Box::new(transport), remote.model.clone())
        .with_batch_size(remote.batch_size)
        .with_delays(remote.batch_delay, remote.item_delay);

    let output = embedder.embed_chunks(chunks, cancel).await?;
    if output.skipped > 0 {
        warn!(skipped = output.skipped, "remote embedding skipped chunks");
    }
    append_remote_records(output_dir, embedder.model(), output.records)?;
    Ok(output.skipped)
}

/// Appends new records to the remote embeddings file, replacing any stale
/// record with the same chunk id, and rewrites it atomically.
fn append_remote_records(
    dir: &Path,
    model: &str,
    new_records: Vec<EmbeddingRecord>,
) -> Result<(), CorpusError> {
    let mut records = match RemoteEmbeddingFile::load(dir)? {
        Some(file) => file.embeddings,
        None => Vec::new(),
    };
    for record in new_records {
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            records.push(record);
        }
    }
    let dimensions = records.first().map(|r| r.vector.len()).unwrap_or(0);
    let file = RemoteEmbeddingFile {
        model: model.to_string(),
        dimensions,
        count: records.len(),
        created_at: chrono::Utc::now().to_rfc3339(),
        embeddings: records,
    };
    file.save(dir)
}
