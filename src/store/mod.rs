//! Collection store abstraction.
//!
//! The [`CollectionStore`] trait is the boundary between the summarizer
//! pipeline and wherever ingested segments live. Two backends exist:
//! [`crate::sqlite_store::SqliteStore`] for real use and
//! [`memory::InMemoryStore`] for tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_collection`](CollectionStore::create_collection) | Create (or return) a collection |
//! | [`delete_collection`](CollectionStore::delete_collection) | Remove a collection and everything in it |
//! | [`load_collection`](CollectionStore::load_collection) | Look a collection up by name and account |
//! | [`list_collections`](CollectionStore::list_collections) | Collections of an account, by name |
//! | [`list_files`](CollectionStore::list_files) | Files of a collection, by filename |
//! | [`lookup_file`](CollectionStore::lookup_file) | Is a file new, changed, or unchanged |
//! | [`store_file`](CollectionStore::store_file) | Write one file and its segments atomically |
//! | [`all_segments`](CollectionStore::all_segments) | Every segment of a collection |
//! | [`query_by_topic`](CollectionStore::query_by_topic) | Segments matching a text query |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::{Chunk, Collection, FileRecord, SourceFile};
use crate::segment::Segment;

/// Result of [`CollectionStore::lookup_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Existing document id, or a fresh one for a new file.
    pub document_id: String,
    /// `false` when the stored text is already identical.
    pub changed: bool,
}

#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Create a collection, or return the existing one with that name.
    async fn create_collection(&self, name: &str, account: &str) -> Result<Collection>;

    async fn delete_collection(&self, collection: &Collection) -> Result<()>;

    async fn load_collection(&self, name: &str, account: &str) -> Result<Option<Collection>>;

    async fn list_collections(&self, account: &str) -> Result<Vec<Collection>>;

    async fn list_files(&self, collection: &Collection) -> Result<Vec<FileRecord>>;

    /// Compare `file` against what is stored, without writing.
    async fn lookup_file(&self, collection: &Collection, file: &SourceFile) -> Result<FileStatus>;

    /// Write the file record and replace its segments in one step. The
    /// stored dedup hash only changes when the segments are written too.
    async fn store_file(
        &self,
        collection: &Collection,
        file: &SourceFile,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<()>;

    /// Every segment in the collection as [`Segment::WholeFile`], ordered by
    /// filename then segment index.
    async fn all_segments(&self, collection: &Collection) -> Result<Vec<Segment>>;

    /// Segments matching `topic` as [`Segment::TopicMatch`], best first,
    /// at most `limit`.
    async fn query_by_topic(
        &self,
        collection: &Collection,
        topic: &str,
        limit: i64,
    ) -> Result<Vec<Segment>>;
}

/// Content hash used to skip re-ingesting unchanged files.
pub fn dedup_hash(file: &SourceFile) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file.filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(file.content_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(file.body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercased alphanumeric terms of a topic string.
pub fn topic_terms(topic: &str) -> Vec<String> {
    topic
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
