//! Generation engine abstraction and HTTP-backed implementations.
//!
//! Defines the [`GenerationEngine`] trait and concrete engines:
//! - **[`OllamaEngine`]**: `POST {endpoint}/api/generate`, non-streaming.
//! - **[`OpenAiEngine`]**: `POST {endpoint}/v1/chat/completions` with
//!   `OPENAI_API_KEY`.
//! - **[`DisabledEngine`]**: always errors; used when no model is configured.
//!
//! Every request is deterministic: temperature from [`ModelSettings`]
//! (validated to `0.0` when `deterministic` is set), a fixed seed, and
//! greedy decoding where the backend exposes it.
//!
//! # Packaging
//!
//! [`package_context`] folds normalized segments into as few
//! [`SourceContext`]s as fit the configured size; one request is issued per
//! context and each reply becomes one [`ResponseUnit`].
//!
//! # Failure
//!
//! There is no retry. A transport error, a non-2xx status, or a reply that
//! cannot be decoded is returned to the caller unchanged.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::segment::NormalizedSegment;

const DETERMINISTIC_SEED: u64 = 0;

/// Model identity and sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub deterministic: bool,
}

/// Validate model settings before any engine is built.
pub fn load_model(settings: &ModelSettings) -> Result<ModelSettings> {
    if settings.model.trim().is_empty() {
        bail!("summarizer.model must not be empty");
    }
    if !(0.0..=2.0).contains(&settings.temperature) {
        bail!("summarizer.temperature must be in [0.0, 2.0]");
    }
    if settings.deterministic && settings.temperature != 0.0 {
        bail!("summarizer.temperature must be 0.0 when deterministic = true");
    }
    Ok(settings.clone())
}

/// Aggregated source text for one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub text: String,
    pub segment_count: usize,
}

/// Fold segment texts, in order, into contexts of at most `max_chars`
/// characters. A segment larger than `max_chars` gets a context of its own.
pub fn package_context(segments: &[NormalizedSegment], max_chars: usize) -> Vec<SourceContext> {
    let mut contexts = Vec::new();
    let mut current = SourceContext {
        text: String::new(),
        segment_count: 0,
    };
    let mut current_chars = 0usize;

    for seg in segments {
        let text = seg.text.trim();
        if text.is_empty() {
            continue;
        }
        let len = text.chars().count();
        if current.segment_count > 0 && current_chars + 2 + len > max_chars {
            contexts.push(std::mem::replace(
                &mut current,
                SourceContext {
                    text: String::new(),
                    segment_count: 0,
                },
            ));
            current_chars = 0;
        }
        if current.segment_count > 0 {
            current.text.push_str("\n\n");
            current_chars += 2;
        }
        current.text.push_str(text);
        current.segment_count += 1;
        current_chars += len;
    }

    if current.segment_count > 0 {
        contexts.push(current);
    }
    contexts
}

/// One model reply, split into candidate points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseUnit {
    pub points: Vec<String>,
    pub raw: String,
}

impl ResponseUnit {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            points: parse_points(&raw),
            raw,
        }
    }

    pub fn from_points(points: Vec<String>) -> Self {
        Self {
            raw: points.join("\n"),
            points,
        }
    }
}

#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Model identifier, e.g. `"llama3.1"`.
    fn model_name(&self) -> &str;

    /// Run `instruction` over one source context.
    async fn generate(&self, instruction: &str, context: &SourceContext) -> Result<ResponseUnit>;
}

/// Build the engine named by `summarizer.provider`.
pub fn create_engine(config: &SummarizerConfig) -> Result<Box<dyn GenerationEngine>> {
    let settings = load_model(&config.model_settings())?;
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEngine)),
        "ollama" => Ok(Box::new(OllamaEngine::new(config, settings)?)),
        "openai" => Ok(Box::new(OpenAiEngine::new(config, settings)?)),
        other => bail!("Unknown summarizer provider: {}", other),
    }
}

/// System prompt shared by the HTTP engines.
pub fn system_prompt(instruction: &str, sentinel: &str) -> String {
    format!(
        "You extract the {instruction} of lecture material. Reply only with a JSON array \
         of short strings, one string per point, using only facts stated in the source. \
         If the source holds nothing relevant, reply with [\"{sentinel}\"]."
    )
}

pub fn user_prompt(instruction: &str, context: &SourceContext) -> String {
    format!("Source:\n{}\n\nList the {}.", context.text, instruction)
}

// ============ Disabled ============

pub struct DisabledEngine;

#[async_trait]
impl GenerationEngine for DisabledEngine {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _instruction: &str, _context: &SourceContext) -> Result<ResponseUnit> {
        bail!("summarizer provider is disabled")
    }
}

// ============ Ollama ============

pub struct OllamaEngine {
    client: reqwest::Client,
    endpoint: String,
    settings: ModelSettings,
    sentinel: String,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaEngine {
    pub fn new(config: &SummarizerConfig, settings: ModelSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint(),
            settings,
            sentinel: config.not_found_sentinel.clone(),
        })
    }
}

#[async_trait]
impl GenerationEngine for OllamaEngine {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, instruction: &str, context: &SourceContext) -> Result<ResponseUnit> {
        let mut options = json!({
            "temperature": self.settings.temperature,
            "seed": DETERMINISTIC_SEED,
        });
        if self.settings.deterministic {
            options["top_k"] = json!(1);
        }
        let body = json!({
            "model": self.settings.model,
            "system": system_prompt(instruction, &self.sentinel),
            "prompt": user_prompt(instruction, context),
            "stream": false,
            "options": options,
        });

        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama returned {}: {}", status, text);
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .context("Ollama response deserialization failed")?;
        Ok(ResponseUnit::from_raw(parsed.response))
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    settings: ModelSettings,
    sentinel: String,
}

impl OpenAiEngine {
    pub fn new(config: &SummarizerConfig, settings: ModelSettings) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, settings, api_key)
    }

    pub fn with_api_key(
        config: &SummarizerConfig,
        settings: ModelSettings,
        api_key: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint(),
            api_key,
            settings,
            sentinel: config.not_found_sentinel.clone(),
        })
    }
}

#[async_trait]
impl GenerationEngine for OpenAiEngine {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, instruction: &str, context: &SourceContext) -> Result<ResponseUnit> {
        let body = json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "seed": DETERMINISTIC_SEED,
            "messages": [
                {"role": "system", "content": system_prompt(instruction, &self.sentinel)},
                {"role": "user", "content": user_prompt(instruction, context)},
            ],
        });

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("chat completion request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat completion returned {}: {}", status, text);
        }

        let json: Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid chat completion response: missing message content"))?;
        Ok(ResponseUnit::from_raw(content))
    }
}

// ============ Reply parsing ============

/// Split a model reply into candidate points.
///
/// Accepts a JSON array, a Python-style list literal, a JSON object holding
/// a `"key points"` / `"key_points"` / `"points"` array, or plain lines with
/// list markers. An empty list parses to no candidates.
pub fn parse_points(raw: &str) -> Vec<String> {
    let body = strip_code_fence(raw.trim());

    if body.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<Value>>(body) {
            return items.into_iter().map(value_to_point).collect();
        }
        if let Some(items) = parse_list_literal(body) {
            return items;
        }
    }

    if body.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            for key in ["key points", "key_points", "points"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return items.iter().cloned().map(value_to_point).collect();
                }
            }
        }
    }

    body.lines()
        .map(strip_list_marker)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn value_to_point(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

/// Parse `['a', "b", 'it\'s']`. Returns `None` on anything else.
fn parse_list_literal(s: &str) -> Option<Vec<String>> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return None;
        }
        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return None,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    fn seg(text: &str) -> NormalizedSegment {
        NormalizedSegment {
            segment_id: "s".into(),
            file_source: "f".into(),
            segment_index: 0,
            text: text.into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn load_model_rules() {
        let ok = ModelSettings {
            model: "m".into(),
            temperature: 0.0,
            deterministic: true,
        };
        assert!(load_model(&ok).is_ok());
        assert!(load_model(&ModelSettings {
            temperature: 0.3,
            ..ok.clone()
        })
        .is_err());
        assert!(load_model(&ModelSettings {
            temperature: 0.3,
            deterministic: false,
            ..ok.clone()
        })
        .is_ok());
        assert!(load_model(&ModelSettings {
            model: " ".into(),
            ..ok
        })
        .is_err());
    }

    #[test]
    fn package_aggregates_in_order() {
        let segs = vec![seg("alpha"), seg("beta"), seg("gamma")];
        let ctx = package_context(&segs, 100);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0].text, "alpha\n\nbeta\n\ngamma");
        assert_eq!(ctx[0].segment_count, 3);
    }

    #[test]
    fn package_splits_at_limit_without_cutting_segments() {
        let segs = vec![seg("aaaa"), seg("bbbb"), seg("cccccccccccc"), seg("dd")];
        let ctx = package_context(&segs, 10);
        let texts: Vec<&str> = ctx.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\n\nbbbb", "cccccccccccc", "dd"]);
    }

    #[test]
    fn package_of_nothing_is_empty() {
        assert!(package_context(&[], 10).is_empty());
        assert!(package_context(&[seg("  ")], 10).is_empty());
    }

    #[test]
    fn parses_json_array() {
        assert_eq!(parse_points(r#"["a", "b"]"#), vec!["a", "b"]);
        assert!(parse_points("[]").is_empty());
    }

    #[test]
    fn parses_list_literal() {
        assert_eq!(
            parse_points(r#"['Entropy rises', "it's irreversible", 'x\'y']"#),
            vec!["Entropy rises", "it's irreversible", "x'y"]
        );
    }

    #[test]
    fn parses_fenced_json_object() {
        let raw = "```json\n{\"key points\": [\"one\", \"two\"]}\n```";
        assert_eq!(parse_points(raw), vec!["one", "two"]);
    }

    #[test]
    fn falls_back_to_lines() {
        let raw = "Here you go:\n- first\n* second\n2. third\n\n";
        assert_eq!(
            parse_points(raw),
            vec!["Here you go:", "first", "second", "third"]
        );
    }

    #[test]
    fn malformed_bracket_text_is_kept_as_lines() {
        assert_eq!(parse_points("[see below]"), vec!["[see below]"]);
    }

    type Captured = Arc<Mutex<Option<Value>>>;

    async fn mock_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn summarizer(endpoint: &str) -> SummarizerConfig {
        SummarizerConfig {
            endpoint: Some(endpoint.to_string()),
            ..SummarizerConfig::default()
        }
    }

    #[tokio::test]
    async fn ollama_request_is_deterministic_and_parsed() {
        let captured: Captured = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route(
                "/api/generate",
                post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                    *c.lock().unwrap() = Some(body);
                    Json(json!({"response": "[\"Heat flows hot to cold\", \"Not Found\"]"}))
                }),
            )
            .with_state(captured.clone());
        let endpoint = mock_server(app).await;

        let cfg = summarizer(&endpoint);
        let engine = OllamaEngine::new(&cfg, load_model(&cfg.model_settings()).unwrap()).unwrap();
        let ctx = SourceContext {
            text: "Heat flows from hot to cold.".into(),
            segment_count: 1,
        };
        let unit = engine.generate("key points", &ctx).await.unwrap();
        assert_eq!(unit.points, vec!["Heat flows hot to cold", "Not Found"]);

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["top_k"], 1);
        assert_eq!(body["model"], "llama3.1");
        assert!(body["prompt"].as_str().unwrap().contains("Heat flows from hot to cold."));
    }

    #[tokio::test]
    async fn ollama_error_status_surfaces() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (axum::http::StatusCode::NOT_FOUND, "model not found") }),
        );
        let endpoint = mock_server(app).await;
        let cfg = summarizer(&endpoint);
        let engine = OllamaEngine::new(&cfg, cfg.model_settings()).unwrap();
        let ctx = SourceContext {
            text: "x".into(),
            segment_count: 1,
        };
        let err = engine.generate("key points", &ctx).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn openai_reads_message_content() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["temperature"], 0.0);
                Json(json!({"choices": [{"message": {"content": "- one\n- two"}}]}))
            }),
        );
        let endpoint = mock_server(app).await;
        let cfg = SummarizerConfig {
            provider: "openai".into(),
            ..summarizer(&endpoint)
        };
        let engine =
            OpenAiEngine::with_api_key(&cfg, cfg.model_settings(), "test-key".into()).unwrap();
        let ctx = SourceContext {
            text: "x".into(),
            segment_count: 1,
        };
        let unit = engine.generate("key points", &ctx).await.unwrap();
        assert_eq!(unit.points, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn disabled_engine_errors() {
        let ctx = SourceContext {
            text: "x".into(),
            segment_count: 1,
        };
        assert!(DisabledEngine.generate("key points", &ctx).await.is_err());
    }
}
