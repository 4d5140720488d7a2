//! Ingestion: walk a path, extract text, segment, and store.
//!
//! A single file is stored under its file name. A directory is walked
//! recursively and each file is stored under its path relative to the
//! directory, filtered by `ingest.include_globs` / `ingest.exclude_globs`.
//! Files that are too large, of an unknown type, or fail extraction are
//! skipped and counted; they never abort the run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::chunk::segment_text;
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::extract::{content_type_for_path, extract_text};
use crate::models::{Collection, SourceFile};
use crate::sqlite_store::SqliteStore;
use crate::store::CollectionStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_seen: u64,
    pub ingested: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub segments_written: u64,
}

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    /// Name the file is stored under.
    pub filename: String,
}

pub async fn run_ingest(config: &Config, collection_name: &str, path: &Path) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let collection = store
        .create_collection(collection_name, &config.account.name)
        .await?;
    let stats = ingest_path(&store, &collection, config, path).await?;

    println!("ingest {} <- {}", collection.name, path.display());
    println!("  files seen: {}", stats.files_seen);
    println!("  ingested: {}", stats.ingested);
    println!("  unchanged: {}", stats.unchanged);
    println!("  skipped: {}", stats.skipped);
    println!("  segments written: {}", stats.segments_written);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// Ingest `path` into `collection`.
pub async fn ingest_path(
    store: &dyn CollectionStore,
    collection: &Collection,
    config: &Config,
    path: &Path,
) -> Result<IngestStats> {
    let candidates = scan_path(&config.ingest, path)?;
    let mut stats = IngestStats::default();

    for candidate in &candidates {
        stats.files_seen += 1;

        let file = match read_source_file(candidate, config.ingest.max_file_bytes) {
            Ok(Some(file)) => file,
            Ok(None) => {
                stats.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %candidate.filename, error = %format!("{:#}", e), "skipping file");
                stats.skipped += 1;
                continue;
            }
        };

        let status = store.lookup_file(collection, &file).await?;
        if !status.changed {
            tracing::debug!(file = %file.filename, "unchanged");
            stats.unchanged += 1;
            continue;
        }

        let chunks = segment_text(&status.document_id, &file.body, config.chunking.max_tokens);
        store
            .store_file(collection, &file, &status.document_id, &chunks)
            .await?;
        tracing::info!(file = %file.filename, segments = chunks.len(), "ingested");

        stats.ingested += 1;
        stats.segments_written += chunks.len() as u64;
    }

    Ok(stats)
}

/// List the files under `path` that pass the ingest filters, sorted by
/// stored name.
pub fn scan_path(ingest: &IngestConfig, path: &Path) -> Result<Vec<Candidate>> {
    if !path.exists() {
        bail!("ingest path does not exist: {}", path.display());
    }

    if path.is_file() {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("not a file path: {}", path.display()))?;
        return Ok(vec![Candidate {
            path: path.to_path_buf(),
            filename,
        }]);
    }

    let include_set = build_globset(&ingest.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    excludes.extend(ingest.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut out = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let full = entry.path();
        let relative = full.strip_prefix(path).unwrap_or(full);
        // stored names always use forward slashes
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        out.push(Candidate {
            path: full.to_path_buf(),
            filename: rel_str,
        });
    }

    out.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(out)
}

/// Read and extract one candidate.
///
/// `Ok(None)` means the file was skipped for size or type; extraction and
/// I/O failures are errors.
pub fn read_source_file(candidate: &Candidate, max_bytes: u64) -> Result<Option<SourceFile>> {
    let Some(content_type) = content_type_for_path(&candidate.path) else {
        tracing::debug!(file = %candidate.filename, "unsupported file type");
        return Ok(None);
    };

    let metadata = std::fs::metadata(&candidate.path)
        .with_context(|| format!("Failed to stat {}", candidate.path.display()))?;
    if metadata.len() > max_bytes {
        tracing::warn!(file = %candidate.filename, bytes = metadata.len(), max_bytes, "file too large");
        return Ok(None);
    }

    let modified_at = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let bytes = std::fs::read(&candidate.path)
        .with_context(|| format!("Failed to read {}", candidate.path.display()))?;
    let body = extract_text(&bytes, content_type)?;

    Ok(Some(SourceFile {
        filename: candidate.filename.clone(),
        content_type: content_type.to_string(),
        body,
        modified_at,
    }))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
