//! # Lecture Summarizer
//!
//! Bullet-point summaries of lecture files. Files are ingested into named
//! collections, segmented, and indexed in SQLite (FTS5). A summarize request
//! names a collection, a file, and optionally a topic; the matching segments
//! of that file are handed to a language model with the instruction
//! `"key points"`, and the returned points are deduplicated.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  ingest  │──▶│ chunk/extract│──▶│  SQLite   │
//! │ (walkdir)│   │              │   │  + FTS5   │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │ CollectionStore
//!                                         ▼
//!   request ─▶ cache ─▶ dispatch ─▶ segment ─▶ generation ─▶ points
//!                                         │
//!                      ┌──────────────────┤
//!                      ▼                  ▼
//!                 ┌─────────┐        ┌─────────┐
//!                 │   CLI   │        │  HTTP   │
//!                 │ (lsum)  │        │ (axum)  │
//!                 └─────────┘        └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from txt/md/pdf/docx/pptx |
//! | [`chunk`] | Paragraph-boundary segmentation |
//! | [`ingest`] | File discovery and ingestion |
//! | [`store`] | Collection store trait and in-memory backend |
//! | [`sqlite_store`] | SQLite collection store |
//! | [`segment`] | Query result variants and normalization |
//! | [`dispatch`] | Query path selection and file filter |
//! | [`generation`] | Language model engines |
//! | [`points`] | Point deduplication |
//! | [`cache`] | Summary memoization |
//! | [`summarize`] | The summarize pipeline |
//! | [`library`] | Collection management commands |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod library;
pub mod migrate;
pub mod models;
pub mod points;
pub mod segment;
pub mod server;
pub mod sqlite_store;
pub mod store;
pub mod summarize;
