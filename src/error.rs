//! Error taxonomy for the indexing and query paths.
//!
//! Indexing failures are logged and never propagated to the content
//! mutation that triggered them; query-path failures are caught at the
//! search boundary and either routed to the fallback or collapsed into
//! one generic unavailable message.

use thiserror::Error;

/// Failures talking to the external search engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine credentials are missing from the configuration. Indexing and
    /// index-backed search are silently disabled; only the fallback runs.
    #[error("search engine is not configured")]
    NotConfigured,

    /// Network failure, timeout, or non-success response from the engine.
    #[error("search engine unavailable: {0}")]
    Unavailable(String),

    /// The remote collection does not match the canonical schema and could
    /// not be migrated.
    #[error("collection schema error: {0}")]
    Schema(String),

    /// The addressed document does not exist. Deletes swallow this.
    #[error("document not found")]
    NotFound,
}

/// A structured query that fails validation at the translation boundary.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid query: {0}")]
pub struct QueryError(pub String);
