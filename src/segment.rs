//! Segment records returned by the collection store, and their
//! normalization.
//!
//! The store answers two kinds of query and each produces its own record
//! shape: a whole-collection scan yields [`WholeFileSegment`]s whose payload
//! sits in `text_search`, a topic query yields [`TopicSegment`]s whose
//! payload sits in `text`. [`Segment`] tags the two, and
//! [`Segment::normalize`] collapses either into the one
//! [`NormalizedSegment`] shape the summarizer consumes.
//!
//! The serde forms keep the field names, so a raw record can be read back
//! into the right variant by which payload key it carries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A segment as produced by the whole-collection scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WholeFileSegment {
    pub segment_id: String,
    pub file_source: String,
    pub segment_index: i64,
    pub text_search: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A segment as produced by a topic query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSegment {
    pub segment_id: String,
    pub file_source: String,
    pub segment_index: i64,
    pub text: String,
    /// Relevance from the text query; higher is better.
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    WholeFile(WholeFileSegment),
    TopicMatch(TopicSegment),
}

impl Segment {
    /// Payload text, whichever field carries it.
    pub fn text(&self) -> &str {
        match self {
            Segment::WholeFile(s) => &s.text_search,
            Segment::TopicMatch(s) => &s.text,
        }
    }

    pub fn file_source(&self) -> &str {
        match self {
            Segment::WholeFile(s) => &s.file_source,
            Segment::TopicMatch(s) => &s.file_source,
        }
    }

    pub fn segment_index(&self) -> i64 {
        match self {
            Segment::WholeFile(s) => s.segment_index,
            Segment::TopicMatch(s) => s.segment_index,
        }
    }

    pub fn normalize(self) -> NormalizedSegment {
        match self {
            Segment::WholeFile(s) => NormalizedSegment {
                segment_id: s.segment_id,
                file_source: s.file_source,
                segment_index: s.segment_index,
                text: s.text_search,
                metadata: s.metadata,
            },
            Segment::TopicMatch(s) => {
                let mut metadata = s.metadata;
                if let Some(score) = serde_json::Number::from_f64(s.score) {
                    metadata.insert("score".to_string(), Value::Number(score));
                }
                NormalizedSegment {
                    segment_id: s.segment_id,
                    file_source: s.file_source,
                    segment_index: s.segment_index,
                    text: s.text,
                    metadata,
                }
            }
        }
    }
}

/// The single record shape handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSegment {
    pub segment_id: String,
    pub file_source: String,
    pub segment_index: i64,
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub fn normalize_all(segments: Vec<Segment>) -> Vec<NormalizedSegment> {
    segments.into_iter().map(Segment::normalize).collect()
}

/// Keep only segments whose `file_source` equals `filename` exactly,
/// preserving order.
pub fn filter_by_file(segments: Vec<Segment>, filename: &str) -> Vec<Segment> {
    segments
        .into_iter()
        .filter(|s| s.file_source() == filename)
        .collect()
}
