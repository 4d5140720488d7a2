//! In-memory [`CollectionStore`] for tests and throwaway sessions.
//!
//! Collections, files and segments sit in `Vec`s behind `RwLock`s. Topic
//! queries score a segment by how many times the topic's terms occur in
//! it, case-insensitively; there is no index.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Map};
use uuid::Uuid;

use super::{dedup_hash, topic_terms, CollectionStore, FileStatus};
use crate::models::{Chunk, Collection, FileRecord, SourceFile};
use crate::segment::{Segment, TopicSegment, WholeFileSegment};

struct StoredFile {
    document_id: String,
    collection_id: String,
    filename: String,
    content_type: String,
    updated_at: i64,
    dedup_hash: String,
}

struct StoredSegment {
    id: String,
    document_id: String,
    collection_id: String,
    file_source: String,
    index: i64,
    text: String,
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<Vec<Collection>>,
    files: RwLock<Vec<StoredFile>>,
    segments: RwLock<Vec<StoredSegment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn segment_metadata(seg: &StoredSegment) -> Map<String, serde_json::Value> {
    let mut m = Map::new();
    m.insert("document_id".to_string(), json!(seg.document_id));
    m
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn create_collection(&self, name: &str, account: &str) -> Result<Collection> {
        let mut collections = write(&self.collections)?;
        if let Some(existing) = collections
            .iter()
            .find(|c| c.name == name && c.account == account)
        {
            return Ok(existing.clone());
        }
        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            account: account.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };
        collections.push(collection.clone());
        Ok(collection)
    }

    async fn delete_collection(&self, collection: &Collection) -> Result<()> {
        write(&self.segments)?.retain(|s| s.collection_id != collection.id);
        write(&self.files)?.retain(|f| f.collection_id != collection.id);
        write(&self.collections)?.retain(|c| c.id != collection.id);
        Ok(())
    }

    async fn load_collection(&self, name: &str, account: &str) -> Result<Option<Collection>> {
        Ok(read(&self.collections)?
            .iter()
            .find(|c| c.name == name && c.account == account)
            .cloned())
    }

    async fn list_collections(&self, account: &str) -> Result<Vec<Collection>> {
        let mut out: Vec<Collection> = read(&self.collections)?
            .iter()
            .filter(|c| c.account == account)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn list_files(&self, collection: &Collection) -> Result<Vec<FileRecord>> {
        let files = read(&self.files)?;
        let segments = read(&self.segments)?;
        let mut out: Vec<FileRecord> = files
            .iter()
            .filter(|f| f.collection_id == collection.id)
            .map(|f| FileRecord {
                filename: f.filename.clone(),
                content_type: f.content_type.clone(),
                segment_count: segments
                    .iter()
                    .filter(|s| s.document_id == f.document_id)
                    .count() as i64,
                updated_at: f.updated_at,
            })
            .collect();
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(out)
    }

    async fn lookup_file(&self, collection: &Collection, file: &SourceFile) -> Result<FileStatus> {
        let hash = dedup_hash(file);
        let files = read(&self.files)?;
        Ok(match files
            .iter()
            .find(|f| f.collection_id == collection.id && f.filename == file.filename)
        {
            Some(existing) => FileStatus {
                document_id: existing.document_id.clone(),
                changed: existing.dedup_hash != hash,
            },
            None => FileStatus {
                document_id: Uuid::new_v4().to_string(),
                changed: true,
            },
        })
    }

    async fn store_file(
        &self,
        collection: &Collection,
        file: &SourceFile,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        // both locks held so readers never see a new hash with old segments
        let mut files = write(&self.files)?;
        let mut segments = write(&self.segments)?;

        let record = StoredFile {
            document_id: document_id.to_string(),
            collection_id: collection.id.clone(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            updated_at: file.modified_at,
            dedup_hash: dedup_hash(file),
        };
        match files
            .iter_mut()
            .find(|f| f.collection_id == collection.id && f.filename == file.filename)
        {
            Some(existing) => *existing = record,
            None => files.push(record),
        }

        segments.retain(|s| s.document_id != document_id);
        segments.extend(chunks.iter().map(|c| StoredSegment {
            id: c.id.clone(),
            document_id: document_id.to_string(),
            collection_id: collection.id.clone(),
            file_source: file.filename.clone(),
            index: c.chunk_index,
            text: c.text.clone(),
        }));
        Ok(())
    }

    async fn all_segments(&self, collection: &Collection) -> Result<Vec<Segment>> {
        let segments = read(&self.segments)?;
        let mut matching: Vec<&StoredSegment> = segments
            .iter()
            .filter(|s| s.collection_id == collection.id)
            .collect();
        matching.sort_by(|a, b| {
            a.file_source
                .cmp(&b.file_source)
                .then(a.index.cmp(&b.index))
        });
        Ok(matching
            .into_iter()
            .map(|s| {
                Segment::WholeFile(WholeFileSegment {
                    segment_id: s.id.clone(),
                    file_source: s.file_source.clone(),
                    segment_index: s.index,
                    text_search: s.text.clone(),
                    metadata: segment_metadata(s),
                })
            })
            .collect())
    }

    async fn query_by_topic(
        &self,
        collection: &Collection,
        topic: &str,
        limit: i64,
    ) -> Result<Vec<Segment>> {
        let terms = topic_terms(topic);
        if terms.is_empty() || limit < 1 {
            return Ok(Vec::new());
        }

        let segments = read(&self.segments)?;
        let mut scored: Vec<(f64, &StoredSegment)> = segments
            .iter()
            .filter(|s| s.collection_id == collection.id)
            .filter_map(|s| {
                let lower = s.text.to_lowercase();
                let hits: usize = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
                (hits > 0).then_some((hits as f64, s))
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.file_source.cmp(&b.file_source))
                .then(a.index.cmp(&b.index))
        });
        scored.truncate(limit as usize);

        Ok(scored
            .into_iter()
            .map(|(score, s)| {
                Segment::TopicMatch(TopicSegment {
                    segment_id: s.id.clone(),
                    file_source: s.file_source.clone(),
                    segment_index: s.index,
                    text: s.text.clone(),
                    score,
                    metadata: segment_metadata(s),
                })
            })
            .collect())
    }
}
