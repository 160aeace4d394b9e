//! The persisted corpus: chunks, vocabulary, and embedding records.
//!
//! One build run creates the corpus, later runs extend it through
//! [`Corpus::merge`], and the retriever reads it many times without ever
//! mutating it. Writes go through an atomic temp-file-and-rename replace so a
//! concurrent reader never sees a vocabulary and embeddings pair from two
//! different merge generations.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunker::Chunk;
use crate::vocab::Vocabulary;

/// Chunks file name inside the corpus directory.
pub const CHUNKS_FILE: &str = "chunks.json";
/// Local-variant embeddings file name (vocabulary + TF vectors).
pub const LOCAL_EMBEDDINGS_FILE: &str = "embeddings.json";
/// Remote-variant embeddings file name (provider vectors, for downstream use).
pub const REMOTE_EMBEDDINGS_FILE: &str = "embeddings_remote.json";
/// Migration discriminant written into the chunks and local embeddings files.
pub const SCHEMA_VERSION: u32 = 1;

/// One stored vector, keyed by chunk id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f64>,
}

/// On-disk shape of the chunks file.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunksFile {
    pub version: u32,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub chunks: Vec<Chunk>,
}

/// On-disk shape of the local-variant embeddings file.
#[derive(Debug, Serialize, Deserialize)]
pub struct LocalEmbeddingFile {
    pub version: u32,
    pub vocabulary: Vec<String>,
    pub embeddings: Vec<EmbeddingRecord>,
}

/// On-disk shape of the remote-variant embeddings file.
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteEmbeddingFile {
    pub model: String,
    pub dimensions: usize,
    pub count: usize,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub embeddings: Vec<EmbeddingRecord>,
}

impl RemoteEmbeddingFile {
    /// Loads the remote embeddings file if present.
    pub fn load(dir: &Path) -> Result<Option<Self>, CorpusError> {
        let path = dir.join(REMOTE_EMBEDDINGS_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| CorpusError::Read(path.clone(), e))?;
        let file = serde_json::from_str(&raw).map_err(|e| CorpusError::Json(path, e))?;
        Ok(Some(file))
    }

    /// Writes the file with an atomic replace.
    pub fn save(&self, dir: &Path) -> Result<(), CorpusError> {
        fs::create_dir_all(dir).map_err(|e| CorpusError::Write(dir.to_path_buf(), e))?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CorpusError::Json(dir.join(REMOTE_EMBEDDINGS_FILE), e))?;
        write_atomic(&dir.join(REMOTE_EMBEDDINGS_FILE), &json)
    }
}

/// A newly produced batch to fold into an existing corpus: the chunks of the
/// sources ingested this run, the already-extended vocabulary, and vectors
/// encoded against that vocabulary.
#[derive(Debug)]
pub struct CorpusBatch {
    pub chunks: Vec<Chunk>,
    pub vocabulary: Vocabulary,
    pub embeddings: Vec<EmbeddingRecord>,
}

/// The in-memory corpus aggregate. Immutable once built; the retriever holds
/// it behind an `Arc` snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub chunks: Vec<Chunk>,
    pub vocabulary: Vocabulary,
    pub embeddings: Vec<EmbeddingRecord>,
}

impl Corpus {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// True if any stored chunk came from the given source.
    pub fn has_source(&self, source: &str) -> bool {
        self.chunks.iter().any(|c| c.source == source)
    }

    /// Loads the corpus from `dir`. A directory without corpus files yields
    /// an empty corpus; present-but-malformed files are an error.
    pub fn load(dir: &Path) -> Result<Self, CorpusError> {
        let chunks_path = dir.join(CHUNKS_FILE);
        let embeddings_path = dir.join(LOCAL_EMBEDDINGS_FILE);
        if !chunks_path.is_file() || !embeddings_path.is_file() {
            debug!(dir = %dir.display(), "no corpus files found, starting empty");
            return Ok(Self::empty());
        }

        let raw = fs::read_to_string(&chunks_path)
            .map_err(|e| CorpusError::Read(chunks_path.clone(), e))?;
        let chunks_file: ChunksFile =
            serde_json::from_str(&raw).map_err(|e| CorpusError::Json(chunks_path.clone(), e))?;
        check_version(chunks_file.version, &chunks_path)?;

        let raw = fs::read_to_string(&embeddings_path)
            .map_err(|e| CorpusError::Read(embeddings_path.clone(), e))?;
        let embedding_file: LocalEmbeddingFile = serde_json::from_str(&raw)
            .map_err(|e| CorpusError::Json(embeddings_path.clone(), e))?;
        check_version(embedding_file.version, &embeddings_path)?;

        let vocabulary = Vocabulary::from_terms(embedding_file.vocabulary);
        for record in &embedding_file.embeddings {
            if record.vector.len() != vocabulary.len() {
                return Err(CorpusError::DimensionMismatch {
                    id: record.id.clone(),
                    expected: vocabulary.len(),
                    actual: record.vector.len(),
                });
            }
        }

        Ok(Self {
            chunks: chunks_file.chunks,
            vocabulary,
            embeddings: embedding_file.embeddings,
        })
    }

    /// Folds a new batch into this corpus.
    ///
    /// The batch vocabulary must extend this corpus's vocabulary append-only;
    /// every pre-existing vector is padded with trailing zeros up to the new
    /// dimension, leaving its prior components untouched. Verifies the
    /// dimension invariant over the merged result before returning.
    pub fn merge(self, batch: CorpusBatch) -> Result<Self, CorpusError> {
        let old_dim = self.vocabulary.len();
        let new_dim = batch.vocabulary.len();
        if new_dim < old_dim
            || batch.vocabulary.terms()[..old_dim] != *self.vocabulary.terms()
        {
            return Err(CorpusError::VocabularyRewrite);
        }

        for chunk in &batch.chunks {
            if self.chunks.iter().any(|c| c.id == chunk.id) {
                return Err(CorpusError::DuplicateChunk(chunk.id.clone()));
            }
        }

        let mut chunks = self.chunks;
        let mut embeddings = self.embeddings;
        let padding = new_dim - old_dim;
        if padding > 0 {
            for record in &mut embeddings {
                record.vector.resize(new_dim, 0.0);
            }
        }
        chunks.extend(batch.chunks);
        embeddings.extend(batch.embeddings);

        for record in &embeddings {
            if record.vector.len() != new_dim {
                return Err(CorpusError::DimensionMismatch {
                    id: record.id.clone(),
                    expected: new_dim,
                    actual: record.vector.len(),
                });
            }
        }

        Ok(Self {
            chunks,
            vocabulary: batch.vocabulary,
            embeddings,
        })
    }

    /// Writes the chunks and local embeddings files, each as an atomic
    /// replace.
    pub fn save(&self, dir: &Path) -> Result<(), CorpusError> {
        fs::create_dir_all(dir).map_err(|e| CorpusError::Write(dir.to_path_buf(), e))?;

        let chunks_file = ChunksFile {
            version: SCHEMA_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            chunks: self.chunks.clone(),
        };
        let chunks_path = dir.join(CHUNKS_FILE);
        let json = serde_json::to_string_pretty(&chunks_file)
            .map_err(|e| CorpusError::Json(chunks_path.clone(), e))?;
        write_atomic(&chunks_path, &json)?;

        let embedding_file = LocalEmbeddingFile {
            version: SCHEMA_VERSION,
            vocabulary: self.vocabulary.terms().to_vec(),
            embeddings: self.embeddings.clone(),
        };
        let embeddings_path = dir.join(LOCAL_EMBEDDINGS_FILE);
        let json = serde_json::to_string_pretty(&embedding_file)
            .map_err(|e| CorpusError::Json(embeddings_path.clone(), e))?;
        write_atomic(&embeddings_path, &json)
    }
}

fn check_version(found: u32, path: &Path) -> Result<(), CorpusError> {
    if found != SCHEMA_VERSION {
        return Err(CorpusError::UnsupportedVersion {
            path: path.to_path_buf(),
            found,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Write-then-rename replace. The temp file lives next to the target so the
/// rename stays on one filesystem.
fn write_atomic(path: &Path, contents: &str) -> Result<(), CorpusError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| CorpusError::Write(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| CorpusError::Write(path.to_path_buf(), e))
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("invalid JSON in {0}: {1}")]
    Json(PathBuf, serde_json::Error),
    #[error("unsupported schema version {found} in {path} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("embedding {id} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
    #[error("merge would rewrite existing vocabulary entries")]
    VocabularyRewrite,
    #[error("chunk id {0} already exists in the corpus")]
    DuplicateChunk(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::vocab::{Vocabulary, DEFAULT_MAX_TERMS};

    fn chunk(id: &str, text: &str) -> Chunk {
        let (source, index) = id.rsplit_once('-').unwrap();
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source: source.to_string(),
            index: index.parse().unwrap(),
            keywords: Vec::new(),
        }
    }

    fn small_corpus() -> Corpus {
        let mut vocabulary = Vocabulary::new();
        vocabulary.extend_from_texts(["사과 바나나 포도"], DEFAULT_MAX_TERMS);
        let chunks = vec![chunk("a-0", "사과 바나나"), chunk("a-1", "포도 사과")];
        let embeddings = chunks
            .iter()
            .map(|c| EmbeddingRecord {
                id: c.id.clone(),
                vector: encode(&c.text, &vocabulary),
            })
            .collect();
        Corpus {
            chunks,
            vocabulary,
            embeddings,
        }
    }

    fn batch_for(corpus: &Corpus, texts: &[(&str, &str)]) -> CorpusBatch {
        let mut vocabulary = corpus.vocabulary.clone();
        vocabulary.extend_from_texts(texts.iter().map(|(_, t)| *t), DEFAULT_MAX_TERMS);
        let chunks: Vec<Chunk> = texts.iter().map(|(id, t)| chunk(id, t)).collect();
        let embeddings = chunks
            .iter()
            .map(|c| EmbeddingRecord {
                id: c.id.clone(),
                vector: encode(&c.text, &vocabulary),
            })
            .collect();
        CorpusBatch {
            chunks,
            vocabulary,
            embeddings,
        }
    }

    #[test]
    fn merge_pads_existing_vectors_with_zeros() {
        let corpus = small_corpus();
        let old_vectors: Vec<Vec<f64>> =
            corpus.embeddings.iter().map(|r| r.vector.clone()).collect();
        let old_dim = corpus.vocabulary.len();

        let batch = batch_for(&corpus, &[("b-0", "수박 참외 사과")]);
        let grown = batch.vocabulary.len() - old_dim;
        assert!(grown > 0);

        let merged = corpus.merge(batch).unwrap();
        for (record, old) in merged.embeddings.iter().zip(&old_vectors) {
            assert_eq!(record.vector.len(), old_dim + grown);
            assert_eq!(&record.vector[..old_dim], &old[..]);
            assert!(record.vector[old_dim..].iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn merge_of_nothing_is_a_no_op() {
        let corpus = small_corpus();
        let before = corpus.clone();
        let batch = CorpusBatch {
            chunks: Vec::new(),
            vocabulary: corpus.vocabulary.clone(),
            embeddings: Vec::new(),
        };
        let merged = corpus.merge(batch).unwrap();
        assert_eq!(merged, before);
    }

    #[test]
    fn merge_appends_new_chunks_and_records() {
        let corpus = small_corpus();
        let batch = batch_for(&corpus, &[("b-0", "수박 사과")]);
        let merged = corpus.merge(batch).unwrap();
        assert_eq!(merged.chunks.len(), 3);
        assert_eq!(merged.embeddings.len(), 3);
        assert!(merged.has_source("b"));
        for record in &merged.embeddings {
            assert_eq!(record.vector.len(), merged.vocabulary.len());
        }
    }

    #[test]
    fn merge_rejects_vocabulary_rewrite() {
        let corpus = small_corpus();
        let mut reordered = Vocabulary::new();
        reordered.extend_from_texts(["바나나 사과 포도"], DEFAULT_MAX_TERMS);
        let batch = CorpusBatch {
            chunks: Vec::new(),
            vocabulary: reordered,
            embeddings: Vec::new(),
        };
        assert!(matches!(
            corpus.merge(batch),
            Err(CorpusError::VocabularyRewrite)
        ));
    }

    #[test]
    fn merge_rejects_duplicate_chunk_ids() {
        let corpus = small_corpus();
        let batch = batch_for(&corpus, &[("a-0", "사과")]);
        assert!(matches!(
            corpus.merge(batch),
            Err(CorpusError::DuplicateChunk(_))
        ));
    }

    #[test]
    fn merge_rejects_mismatched_batch_vectors() {
        let corpus = small_corpus();
        let batch = CorpusBatch {
            chunks: vec![chunk("b-0", "사과")],
            vocabulary: corpus.vocabulary.clone(),
            embeddings: vec![EmbeddingRecord {
                id: "b-0".to_string(),
                vector: vec![0.0; 1],
            }],
        };
        assert!(matches!(
            corpus.merge(batch),
            Err(CorpusError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = small_corpus();
        corpus.save(dir.path()).unwrap();

        let loaded = Corpus::load(dir.path()).unwrap();
        assert_eq!(loaded, corpus);
        // No temp files left behind after the rename.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "tmp")
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_of_missing_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::load(dir.path()).unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = small_corpus();
        corpus.save(dir.path()).unwrap();

        let path = dir.path().join(CHUNKS_FILE);
        let raw = std::fs::read_to_string(&path).unwrap();
        let bumped = raw.replacen("\"version\": 1", "\"version\": 9", 1);
        std::fs::write(&path, bumped).unwrap();

        assert!(matches!(
            Corpus::load(dir.path()),
            Err(CorpusError::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn load_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut corpus = small_corpus();
        corpus.embeddings[0].vector.push(0.5);
        // Bypass merge validation by writing directly.
        corpus.save(dir.path()).unwrap();

        assert!(matches!(
            Corpus::load(dir.path()),
            Err(CorpusError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn remote_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = RemoteEmbeddingFile {
            model: "text-embedding-3-small".to_string(),
            dimensions: 3,
            count: 1,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            embeddings: vec![EmbeddingRecord {
                id: "a-0".to_string(),
                vector: vec![0.1, 0.2, 0.3],
            }],
        };
        file.save(dir.path()).unwrap();
        let loaded = RemoteEmbeddingFile::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.count, 1);
        assert_eq!(loaded.embeddings[0].vector, vec![0.1, 0.2, 0.3]);
        assert!(RemoteEmbeddingFile::load(tempfile::tempdir().unwrap().path())
            .unwrap()
            .is_none());
    }
}
