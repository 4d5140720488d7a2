//! Query dispatch: choose the query path for a request and narrow the
//! results to the requested file.

use crate::error::SummarizeError;
use crate::segment::{filter_by_file, normalize_all, NormalizedSegment};
use crate::store::CollectionStore;

/// One summarize request as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub collection: String,
    pub file: String,
    pub topic: String,
}

impl SummaryRequest {
    /// Build a request; the topic is trimmed so a blank topic means "none".
    pub fn new(
        collection: impl Into<String>,
        file: impl Into<String>,
        topic: impl AsRef<str>,
    ) -> Self {
        Self {
            collection: collection.into(),
            file: file.into(),
            topic: topic.as_ref().trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), SummarizeError> {
        if self.collection.trim().is_empty() {
            return Err(SummarizeError::InvalidRequest(
                "collection must not be empty".to_string(),
            ));
        }
        if self.file.trim().is_empty() {
            return Err(SummarizeError::InvalidRequest(
                "file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn query_path(&self) -> QueryPath<'_> {
        match self.topic.trim() {
            "" => QueryPath::WholeFile,
            topic => QueryPath::Topic(topic),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPath<'a> {
    /// Scan every segment of the collection.
    WholeFile,
    /// Text query for the topic.
    Topic(&'a str),
}

/// Fetch the segments of `request.file`, normalized.
///
/// An unknown collection is an error; a file with no (matching) segments is
/// an empty vector.
pub async fn dispatch_query(
    store: &dyn CollectionStore,
    account: &str,
    request: &SummaryRequest,
    topic_limit: i64,
) -> Result<Vec<NormalizedSegment>, SummarizeError> {
    request.validate()?;

    let collection = store
        .load_collection(&request.collection, account)
        .await
        .map_err(SummarizeError::Store)?
        .ok_or_else(|| SummarizeError::CollectionNotFound {
            name: request.collection.clone(),
            account: account.to_string(),
        })?;
    tracing::debug!(collection = %collection.name, id = %collection.id, "collection loaded");

    let segments = match request.query_path() {
        QueryPath::WholeFile => {
            tracing::info!(file = %request.file, "no topic provided, scanning whole collection");
            store.all_segments(&collection).await
        }
        QueryPath::Topic(topic) => {
            tracing::info!(file = %request.file, topic, "topic provided, running text query");
            store.query_by_topic(&collection, topic, topic_limit).await
        }
    }
    .map_err(SummarizeError::Store)?;

    let fetched = segments.len();
    let kept = filter_by_file(segments, &request.file);
    tracing::info!(fetched, kept = kept.len(), "segments filtered to file");

    Ok(normalize_all(kept))
}
