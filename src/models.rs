//! Core data models shared by ingestion, the store, and the summarizer.
//!
//! Segment records returned by queries live in [`crate::segment`]; the
//! summary type lives in [`crate::points`].

use serde::Serialize;

/// A named, account-scoped group of ingested files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub account: String,
    pub created_at: i64,
}

/// One ingested file within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub filename: String,
    pub content_type: String,
    pub segment_count: i64,
    pub updated_at: i64,
}

/// A file read from disk, with its text already extracted.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub content_type: String,
    pub body: String,
    pub modified_at: i64,
}

/// A segment of a file body produced by the chunker, before storage.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
