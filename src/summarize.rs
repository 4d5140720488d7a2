//! The summarize pipeline.
//!
//! ```text
//! request ─▶ cache? ─hit──────────────────────────────────────▶ summary
//!              │miss
//!              ▼
//!        dispatch_query ─▶ package_context ─▶ engine.generate ─▶ dedup_points
//!        (store + filter)   (aggregate text)   (one per context)   │
//!                                                                  ▼
//!                                                            cache.insert
//! ```
//!
//! [`Summarizer`] owns the collaborators and the cache; it is built once per
//! process and shared by the CLI command and the HTTP server.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::{SummaryCache, SummaryKey};
use crate::config::Config;
use crate::db;
use crate::dispatch::{dispatch_query, SummaryRequest};
use crate::error::SummarizeError;
use crate::generation::{create_engine, package_context, GenerationEngine, ResponseUnit};
use crate::points::{dedup_points, Summary};
use crate::sqlite_store::SqliteStore;
use crate::store::CollectionStore;

/// Pipeline settings taken from configuration.
#[derive(Debug, Clone)]
pub struct SummarizeSettings {
    pub account: String,
    pub topic_limit: i64,
    pub instruction: String,
    pub max_context_chars: usize,
    pub sentinel: String,
}

impl SummarizeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            account: config.account.name.clone(),
            topic_limit: config.retrieval.topic_limit,
            instruction: config.summarizer.instruction.clone(),
            max_context_chars: config.summarizer.max_context_chars,
            sentinel: config.summarizer.not_found_sentinel.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub points: Arc<Summary>,
    pub cached: bool,
}

pub struct Summarizer {
    store: Arc<dyn CollectionStore>,
    engine: Arc<dyn GenerationEngine>,
    cache: SummaryCache,
    settings: SummarizeSettings,
}

impl Summarizer {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        engine: Arc<dyn GenerationEngine>,
        cache: SummaryCache,
        settings: SummarizeSettings,
    ) -> Self {
        Self {
            store,
            engine,
            cache,
            settings,
        }
    }

    /// Build the SQLite-backed summarizer described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn CollectionStore> = Arc::new(SqliteStore::new(pool));
        let engine: Arc<dyn GenerationEngine> = Arc::from(create_engine(&config.summarizer)?);
        Ok(Self::new(
            store,
            engine,
            SummaryCache::new(config.cache.eviction_policy()),
            SummarizeSettings::from_config(config),
        ))
    }

    pub fn store(&self) -> &dyn CollectionStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub fn account(&self) -> &str {
        &self.settings.account
    }

    /// Summarize, answering from the cache when the same triple was seen.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutcome, SummarizeError> {
        let key = SummaryKey::from(request);
        if let Some(points) = self.cache.get(&key) {
            tracing::info!(collection = %key.collection, file = %key.file, topic = %key.topic, "summary cache hit");
            return Ok(SummaryOutcome {
                points,
                cached: true,
            });
        }

        let points = Arc::new(self.compute(request).await?);
        self.cache.insert(key, points.clone());
        Ok(SummaryOutcome {
            points,
            cached: false,
        })
    }

    /// Run the full pipeline without touching the cache.
    pub async fn compute(&self, request: &SummaryRequest) -> Result<Summary, SummarizeError> {
        let segments = dispatch_query(
            self.store.as_ref(),
            &self.settings.account,
            request,
            self.settings.topic_limit,
        )
        .await?;

        let contexts = package_context(&segments, self.settings.max_context_chars);
        if contexts.is_empty() {
            tracing::info!(file = %request.file, "no segments to summarize");
            return Ok(Summary::default());
        }

        tracing::info!(
            model = self.engine.model_name(),
            contexts = contexts.len(),
            segments = segments.len(),
            "summarizing"
        );
        let mut units: Vec<ResponseUnit> = Vec::with_capacity(contexts.len());
        for context in &contexts {
            let unit = self
                .engine
                .generate(&self.settings.instruction, context)
                .await
                .map_err(SummarizeError::Generation)?;
            tracing::debug!(raw = %unit.raw, candidates = unit.points.len(), "model response");
            units.push(unit);
        }

        let summary = dedup_points(&units, &self.settings.sentinel);
        tracing::info!(points = summary.len(), "summary ready");
        Ok(summary)
    }
}

/// CLI entry point: summarize one file and print the points.
pub async fn run_summarize(
    config: &Config,
    collection: &str,
    file: &str,
    topic: Option<&str>,
    json: bool,
) -> Result<()> {
    let summarizer = Summarizer::from_config(config).await?;
    let request = SummaryRequest::new(collection, file, topic.unwrap_or(""));
    let outcome = summarizer.summarize(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(outcome.points.as_ref())?);
        return Ok(());
    }

    if outcome.points.is_empty() {
        println!("No key points found.");
        return Ok(());
    }

    println!("Summary of {} / {}", collection, file);
    for point in outcome.points.points() {
        println!("{}", point);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use crate::chunk::segment_text;
    use crate::generation::SourceContext;
    use crate::models::SourceFile;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with canned point lists, one per call, and records contexts.
    struct ScriptedEngine {
        replies: Vec<Vec<&'static str>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ScriptedEngine {
        fn new(replies: Vec<Vec<&'static str>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl GenerationEngine for ScriptedEngine {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, instruction: &str, context: &SourceContext) -> Result<ResponseUnit> {
            assert_eq!(instruction, "key points");
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(context.text.clone());
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            let reply = self.replies.get(n).cloned().unwrap_or_default();
            Ok(ResponseUnit::from_points(
                reply.into_iter().map(String::from).collect(),
            ))
        }
    }

    fn settings(max_context_chars: usize) -> SummarizeSettings {
        SummarizeSettings {
            account: "lecture_tool".into(),
            topic_limit: 50,
            instruction: "key points".into(),
            max_context_chars,
            sentinel: "Not Found".into(),
        }
    }

    async fn lecture_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let col = store.create_collection("thermo", "lecture_tool").await.unwrap();
        let body = "Energy is conserved.\n\nEntropy of an isolated system never decreases.\n\nHeat engines have a Carnot limit.";
        let file = SourceFile {
            filename: "lecture1.pdf".into(),
            content_type: "application/pdf".into(),
            body: body.into(),
            modified_at: 0,
        };
        let status = store.lookup_file(&col, &file).await.unwrap();
        let chunks = segment_text(&status.document_id, body, 12);
        store
            .store_file(&col, &file, &status.document_id, &chunks)
            .await
            .unwrap();
        store
    }

    fn summarizer(store: Arc<InMemoryStore>, engine: Arc<ScriptedEngine>, ctx: usize) -> Summarizer {
        Summarizer::new(
            store,
            engine,
            SummaryCache::new(EvictionPolicy::Never),
            settings(ctx),
        )
    }

    #[tokio::test]
    async fn pipeline_dedups_across_units() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            vec!["Energy is conserved", "Not Found"],
            vec!["- Energy is conserved", "Entropy never decreases"],
            vec!["Carnot limit bounds efficiency", ""],
        ]));
        // 60 chars per context forces one request per segment
        let s = summarizer(lecture_store().await, engine.clone(), 60);
        let out = s
            .summarize(&SummaryRequest::new("thermo", "lecture1.pdf", ""))
            .await
            .unwrap();

        assert!(!out.cached);
        assert_eq!(
            out.points.points(),
            [
                "- Energy is conserved",
                "- Entropy never decreases",
                "- Carnot limit bounds efficiency"
            ]
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn identical_request_is_memoized() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec!["one point"]]));
        let s = summarizer(lecture_store().await, engine.clone(), 6000);
        let req = SummaryRequest::new("thermo", "lecture1.pdf", "");

        let first = s.summarize(&req).await.unwrap();
        let second = s.summarize(&req).await.unwrap();

        assert!(second.cached);
        assert_eq!(
            serde_json::to_vec(first.points.as_ref()).unwrap(),
            serde_json::to_vec(second.points.as_ref()).unwrap()
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        s.summarize(&SummaryRequest::new("thermo", "lecture1.pdf", "entropy"))
            .await
            .unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn topic_narrows_context() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec!["x"]]));
        let s = summarizer(lecture_store().await, engine.clone(), 6000);
        s.summarize(&SummaryRequest::new("thermo", "lecture1.pdf", "carnot"))
            .await
            .unwrap();
        let seen = engine.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["Heat engines have a Carnot limit.".to_string()]);
    }

    #[tokio::test]
    async fn empty_file_skips_engine() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let s = summarizer(lecture_store().await, engine.clone(), 6000);
        let out = s
            .summarize(&SummaryRequest::new("thermo", "lecture1.pdf", "quantum"))
            .await
            .unwrap();
        assert!(out.points.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn engine_failure_is_surfaced_and_not_cached() {
        let mut engine = ScriptedEngine::new(vec![]);
        engine.fail = true;
        let engine = Arc::new(engine);
        let s = summarizer(lecture_store().await, engine.clone(), 6000);
        let req = SummaryRequest::new("thermo", "lecture1.pdf", "");

        let err = s.summarize(&req).await.unwrap_err();
        assert!(matches!(err, SummarizeError::Generation(_)));
        assert!(err.to_string().contains("model unavailable"));
        assert!(s.cache().is_empty());

        s.summarize(&req).await.unwrap_err();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_collection_is_surfaced() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let s = summarizer(lecture_store().await, engine, 6000);
        let err = s
            .summarize(&SummaryRequest::new("optics", "lecture1.pdf", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::CollectionNotFound { .. }));
    }
}
