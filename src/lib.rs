//! # voxrag
//!
//! Document ingestion and retrieval engine for a voice assistant.
//!
//! Uploaded files are extracted to text, chunked, embedded and indexed in a
//! vector store (a remote Chroma collection with a transparent in-memory
//! fallback). Queries are answered either by a single hybrid search
//! (vector + keyword + phrase) or by a multi-pass agentic planner that
//! expands the query, cascades searches, reranks and formats a cited
//! answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌────────────────┐
//! │ Extract  │──▶│  Chunk +  │──▶│ Metadata │   │ Vector store   │
//! │ 10+ fmts │   │  Embed    │──▶│ (SQLite) │   │ remote ⇢ local │
//! └──────────┘   └───────────┘   └──────────┘   └───────┬────────┘
//!                                                       │
//!                        ┌──────────────────────────────┤
//!                        ▼                              ▼
//!                 ┌─────────────┐               ┌──────────────┐
//!                 │ search      │               │ agentic      │
//!                 │ (hybrid)    │               │ plan+cite    │
//!                 └─────────────┘               └──────────────┘
//! ```
//!
//! Pure logic (chunking, scoring, planning, citations, store strategies)
//! lives in the `voxrag-core` crate; this crate adds I/O: configuration,
//! persistence, HTTP providers and the [`engine::RagEngine`] service.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`engine`] | The `RagEngine` service and its response envelopes |
//! | [`extract`] | Multi-format text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`vision`] | Image description / OCR provider |
//! | [`remote`] | Remote vector collection client |
//! | [`metadata`] | Document metadata store |
//! | [`storage`] | Per-document file storage |
//! | [`error`] | Engine error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod logging;
pub mod metadata;
pub mod migrate;
pub mod remote;
pub mod storage;
pub mod vision;

pub use engine::{EngineDeps, RagEngine};
