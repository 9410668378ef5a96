//! # voxrag core
//!
//! Runtime-agnostic retrieval logic for voxrag: data models, the
//! sentence-aware chunker, embedding types, hybrid scoring, the
//! [`VectorStore`](store::VectorStore) abstraction with its local and
//! fallback strategies, the agentic query planner and the citation
//! formatter.
//!
//! This crate performs no network or filesystem I/O. Embedding services and
//! remote vector backends are reached through the [`embedding::Embedder`]
//! and [`store::VectorStore`] traits, which the `voxrag` app crate
//! implements.

pub mod chunk;
pub mod citation;
pub mod embedding;
pub mod models;
pub mod planner;
pub mod scoring;
pub mod store;
