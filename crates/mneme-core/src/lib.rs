//! All backend logic independent of how the pipeline is run (CLI or a
//! serving layer).
//!
//! Source documents live in a directory the operator chooses. Mneme stores
//! only config and the built corpus in its own app data directory (see
//! [app_data]).

pub mod app_data;
pub mod chunker;
pub mod config;
pub mod corpus;
pub mod documents;
pub mod encoder;
pub mod keywords;
pub mod pipeline;
pub mod provider;
pub mod remote;
pub mod retriever;
pub mod tokens;
pub mod vocab;
pub mod watcher;

pub use app_data::app_data_dir;
pub use chunker::{chunk_text, Chunk, ChunkingOptions, DEFAULT_CHUNK_SIZE};
pub use config::{load_config, load_config_from, Config, ConfigError, ProviderKind};
pub use corpus::{Corpus, CorpusBatch, CorpusError, EmbeddingRecord};
pub use documents::{load_sources, Document, DocumentError, SourceKind};
pub use keywords::extract_keywords;
pub use pipeline::{run_build, BuildError, BuildSummary};
pub use provider::{CancelToken, EmbeddingProvider, LocalTfProvider, ProviderError};
pub use retriever::{retrieve, CorpusHandle, Hit, RetrieveError, DEFAULT_TOP_K};
pub use vocab::Vocabulary;
pub use watcher::{watch_corpus, WatchError};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "mneme-core ready"
}
