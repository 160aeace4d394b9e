//! Loading and normalizing source documents before chunking.
//!
//! Sources live in a configured input directory, either pinned by an
//! explicit file list or discovered by extension. A failure to load or parse
//! one source is isolated: logged, counted, skipped. It never aborts the
//! build.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Origin kind of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Structured document: markdown with optional YAML frontmatter.
    Markdown,
    /// Plain text, taken as-is.
    PlainText,
}

/// A source document ready for chunking. Transient: consumed entirely by the
/// chunker, never persisted.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source identifier (file stem); chunk ids derive from it.
    pub source: String,
    pub kind: SourceKind,
    /// Whitespace-normalized body text.
    pub text: String,
}

/// Documents that loaded, plus how many sources were skipped.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub skipped: usize,
}

/// Loads the configured sources under `input_dir`. An empty `names` list
/// means "discover every `.md`/`.txt` file". Only a missing input directory
/// is fatal; everything per-source is skip-and-count.
pub fn load_sources(
    input_dir: &Path,
    names: &[String],
    min_chars: usize,
) -> Result<LoadOutcome, DocumentError> {
    if !input_dir.is_dir() {
        return Err(DocumentError::NotADirectory(input_dir.to_path_buf()));
    }

    let mut outcome = LoadOutcome::default();
    let paths: Vec<PathBuf> = if names.is_empty() {
        discover(input_dir, &mut outcome.skipped)
    } else {
        names.iter().map(|n| input_dir.join(n)).collect()
    };

    for path in paths {
        match load_document(&path, min_chars) {
            Ok(doc) => outcome.documents.push(doc),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping source");
                outcome.skipped += 1;
            }
        }
    }
    Ok(outcome)
}

/// Walks `root` for `.md` and `.txt` files, skipping hidden entries.
/// Sorted traversal keeps build runs deterministic.
fn discover(root: &Path, skipped: &mut usize) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && has_source_extension(path) {
                    paths.push(path.to_path_buf());
                }
            }
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                *skipped += 1;
            }
        }
    }
    paths
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn has_source_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown") | Some("txt")
    )
}

fn load_document(path: &Path, min_chars: usize) -> Result<Document, DocumentError> {
    if !path.is_file() {
        return Err(DocumentError::Missing(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|e| DocumentError::Read(path.to_path_buf(), e))?;

    let kind = match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => SourceKind::Markdown,
        _ => SourceKind::PlainText,
    };
    let body = match kind {
        SourceKind::Markdown => strip_frontmatter(&raw)
            .map_err(|e| DocumentError::Frontmatter(path.to_path_buf(), e))?,
        SourceKind::PlainText => raw,
    };

    let text = normalize_whitespace(&body);
    if text.chars().count() < min_chars {
        return Err(DocumentError::EmptyContent(path.to_path_buf()));
    }

    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    Ok(Document { source, kind, text })
}

/// Removes optional YAML frontmatter (between the first and second `---`).
/// The block must parse as YAML; a garbled block is an extraction failure.
fn strip_frontmatter(content: &str) -> Result<String, serde_yaml::Error> {
    let s = content.trim_start();
    if !s.starts_with("---") {
        return Ok(content.to_string());
    }
    let after_first = s.strip_prefix("---").unwrap_or(s);
    let Some(end) = after_first.find("\n---") else {
        return Ok(content.to_string());
    };
    let block = &after_first[..end];
    if !block.trim().is_empty() {
        serde_yaml::from_str::<serde_yaml::Value>(block)?;
    }
    Ok(after_first[end + 4..].trim_start().to_string())
}

/// Collapses all whitespace runs to single spaces and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("source not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid frontmatter in {0}: {1}")]
    Frontmatter(PathBuf, serde_yaml::Error),
    #[error("cleaned text of {0} is below the minimum length")]
    EmptyContent(PathBuf),
}
