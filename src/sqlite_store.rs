//! SQLite-backed [`CollectionStore`].
//!
//! Collections, documents and segments are plain tables; topic queries go
//! through the `segments_fts` FTS5 table and are ranked by BM25. See
//! [`crate::migrate`] for the schema.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Chunk, Collection, FileRecord, SourceFile};
use crate::segment::{Segment, TopicSegment, WholeFileSegment};
use crate::store::{dedup_hash, topic_terms, CollectionStore, FileStatus};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn collection_from_row(row: &SqliteRow) -> Collection {
    Collection {
        id: row.get("id"),
        name: row.get("name"),
        account: row.get("account"),
        created_at: row.get("created_at"),
    }
}

fn segment_metadata(row: &SqliteRow) -> Map<String, Value> {
    let mut m = Map::new();
    let document_id: String = row.get("document_id");
    m.insert("document_id".to_string(), json!(document_id));
    m
}

/// Build an FTS5 MATCH expression: every term quoted, any term may match.
fn fts_match_expr(topic: &str) -> Option<String> {
    let terms = topic_terms(topic);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn create_collection(&self, name: &str, account: &str) -> Result<Collection> {
        sqlx::query(
            r#"
            INSERT INTO collections (id, name, account, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name, account) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(account)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.load_collection(name, account)
            .await?
            .ok_or_else(|| anyhow::anyhow!("collection {} vanished after insert", name))
    }

    async fn delete_collection(&self, collection: &Collection) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segments_fts WHERE collection_id = ?")
            .bind(&collection.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM segments WHERE collection_id = ?")
            .bind(&collection.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE collection_id = ?")
            .bind(&collection.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(&collection.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_collection(&self, name: &str, account: &str) -> Result<Option<Collection>> {
        let row = sqlx::query(
            "SELECT id, name, account, created_at FROM collections WHERE name = ? AND account = ?",
        )
        .bind(name)
        .bind(account)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(collection_from_row))
    }

    async fn list_collections(&self, account: &str) -> Result<Vec<Collection>> {
        let rows = sqlx::query(
            "SELECT id, name, account, created_at FROM collections WHERE account = ? ORDER BY name ASC",
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(collection_from_row).collect())
    }

    async fn list_files(&self, collection: &Collection) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT d.filename, d.content_type, d.updated_at, COUNT(s.id) AS segment_count
            FROM documents d
            LEFT JOIN segments s ON s.document_id = d.id
            WHERE d.collection_id = ?
            GROUP BY d.id
            ORDER BY d.filename ASC
            "#,
        )
        .bind(&collection.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FileRecord {
                filename: row.get("filename"),
                content_type: row.get("content_type"),
                segment_count: row.get("segment_count"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn lookup_file(&self, collection: &Collection, file: &SourceFile) -> Result<FileStatus> {
        let existing: Option<(String, String)> = sqlx::query_as(
            "SELECT id, dedup_hash FROM documents WHERE collection_id = ? AND filename = ?",
        )
        .bind(&collection.id)
        .bind(&file.filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match existing {
            Some((id, stored_hash)) => FileStatus {
                changed: stored_hash != dedup_hash(file),
                document_id: id,
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
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (id, collection_id, filename, content_type, body,
                                   created_at, updated_at, dedup_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection_id, filename) DO UPDATE SET
                content_type = excluded.content_type,
                body = excluded.body,
                updated_at = excluded.updated_at,
                dedup_hash = excluded.dedup_hash
            "#,
        )
        .bind(document_id)
        .bind(&collection.id)
        .bind(&file.filename)
        .bind(&file.content_type)
        .bind(&file.body)
        .bind(now)
        .bind(file.modified_at)
        .bind(dedup_hash(file))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM segments_fts WHERE segment_id IN (SELECT id FROM segments WHERE document_id = ?)",
        )
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM segments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO segments (id, document_id, collection_id, file_source, segment_index, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(document_id)
            .bind(&collection.id)
            .bind(&file.filename)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO segments_fts (segment_id, collection_id, file_source, text) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&collection.id)
            .bind(&file.filename)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }

        // dropping `tx` on any error above rolls back the document row too
        tx.commit().await?;
        Ok(())
    }

    async fn all_segments(&self, collection: &Collection) -> Result<Vec<Segment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, file_source, segment_index, text
            FROM segments
            WHERE collection_id = ?
            ORDER BY file_source ASC, segment_index ASC
            "#,
        )
        .bind(&collection.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                Segment::WholeFile(WholeFileSegment {
                    segment_id: row.get("id"),
                    file_source: row.get("file_source"),
                    segment_index: row.get("segment_index"),
                    text_search: row.get("text"),
                    metadata: segment_metadata(row),
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
        let Some(expr) = fts_match_expr(topic) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT s.id, s.document_id, s.file_source, s.segment_index, s.text,
                   segments_fts.rank AS rank
            FROM segments_fts
            JOIN segments s ON s.id = segments_fts.segment_id
            WHERE segments_fts MATCH ? AND segments_fts.collection_id = ?
            ORDER BY segments_fts.rank
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(&collection.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Segment::TopicMatch(TopicSegment {
                    segment_id: row.get("id"),
                    file_source: row.get("file_source"),
                    segment_index: row.get("segment_index"),
                    text: row.get("text"),
                    score: -rank,
                    metadata: segment_metadata(row),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_expr_quotes_terms() {
        assert_eq!(
            fts_match_expr("Carnot AND \"cycle\"").as_deref(),
            Some("\"carnot\" OR \"and\" OR \"cycle\"")
        );
        assert_eq!(fts_match_expr("  *** "), None);
    }
}
