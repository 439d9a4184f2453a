//! docindex: a document index kept consistent across a SQLite catalog, a
//! Qdrant vector store and a SQLite document store, with scoped hybrid
//! retrieval on top.

pub mod batch;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod embed;
pub mod error;
pub mod loader;
#[cfg(feature = "local-models")]
mod local_models;
pub mod progress;
pub mod rank;
pub mod rerank;
pub mod retrieval;
pub mod scoring;
pub mod store;

pub use error::{Error, Result};
