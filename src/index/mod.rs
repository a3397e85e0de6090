//! Search index backend abstraction and implementations.
//!
//! The [`SearchIndex`] trait defines every operation the synchronizer and
//! query pipeline need from the external engine, enabling pluggable
//! backends:
//! - **[`typesense::TypesenseClient`]** — the production HTTP client.
//! - **[`memory::MemoryIndex`]** — in-memory backend for tests, with
//!   switchable availability to simulate outages.
//!
//! All index writes are idempotent upserts keyed by stable document id, so
//! live per-item writes and a concurrently running resync never need
//! locking against each other.

pub mod memory;
pub mod typesense;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{Document, SearchHit};
use crate::schema::{CollectionSchema, RemoteCollection};

/// A structured query lowered into the engine's expression grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    /// Full-text query; `*` matches everything.
    pub query_text: String,
    /// ` && `-joined filter clauses; empty means unfiltered.
    pub filter_expression: String,
    /// `field:order`, or empty to use the collection's default sort field.
    pub sort_expression: String,
    pub page: u32,
    pub per_page: u32,
}

/// One page of raw hits from a backend.
#[derive(Debug, Clone)]
pub struct IndexPage {
    pub hits: Vec<SearchHit>,
    pub found: u64,
    pub page: u32,
}

/// Operations against the external search engine.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`health`](SearchIndex::health) | Backend reachability probe |
/// | [`retrieve_collection`](SearchIndex::retrieve_collection) | Fetch the live collection description |
/// | [`create_collection`](SearchIndex::create_collection) | Create from the canonical schema |
/// | [`delete_collection`](SearchIndex::delete_collection) | Drop the collection (absent tolerated) |
/// | [`upsert`](SearchIndex::upsert) | Insert or replace one document by id |
/// | [`delete`](SearchIndex::delete) | Remove one document (absent tolerated) |
/// | [`delete_by_filter`](SearchIndex::delete_by_filter) | Bulk remove by filter expression |
/// | [`import`](SearchIndex::import) | Bulk upsert with lenient coercion |
/// | [`search`](SearchIndex::search) | Filtered, sorted, paginated search |
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn health(&self) -> Result<(), EngineError>;

    async fn retrieve_collection(&self) -> Result<Option<RemoteCollection>, EngineError>;

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), EngineError>;

    /// Deleting a collection that does not exist is not an error.
    async fn delete_collection(&self) -> Result<(), EngineError>;

    async fn upsert(&self, doc: &Document) -> Result<(), EngineError>;

    /// Deleting an absent document is not an error.
    async fn delete(&self, id: &str) -> Result<(), EngineError>;

    async fn delete_by_filter(&self, filter: &str) -> Result<(), EngineError>;

    /// Returns the number of documents accepted by the engine.
    async fn import(&self, docs: &[Document]) -> Result<usize, EngineError>;

    async fn search(
        &self,
        query: &TranslatedQuery,
        query_by: &str,
        highlight_fields: &str,
    ) -> Result<IndexPage, EngineError>;
}
