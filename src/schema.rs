//! Canonical collection schema and remote reconciliation.
//!
//! The schema is the one source of truth for what a [`Document`] must
//! contain. [`SchemaManager::ensure`] reconciles it against the live
//! collection exactly once per process (until a configuration change calls
//! [`SchemaManager::reset`]); a mismatch forces a migration — delete and
//! recreate — before any further writes.
//!
//! [`Document`]: crate::models::Document

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::index::SearchIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub facet: bool,
}

impl FieldSpec {
    fn new(name: &str, kind: &str, facet: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            facet,
        }
    }
}

/// Versioned field list plus the default sort field, in the engine's
/// collection-create wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub default_sorting_field: String,
}

/// What the engine reports for the live collection; only the parts the
/// reconciliation compares.
#[derive(Debug, Clone)]
pub struct RemoteCollection {
    pub name: String,
    pub fields: Vec<String>,
    pub default_sorting_field: String,
}

/// The canonical document schema. The document id is implicit in the
/// engine; every other [`Document`](crate::models::Document) field is
/// listed here.
pub fn canonical_schema(collection: &str) -> CollectionSchema {
    CollectionSchema {
        name: collection.to_string(),
        fields: vec![
            FieldSpec::new("title", "string", false),
            FieldSpec::new("content", "string", false),
            FieldSpec::new("excerpt", "string", false),
            FieldSpec::new("permalink", "string", false),
            FieldSpec::new("image", "string", false),
            FieldSpec::new("types", "string", true),
            FieldSpec::new("categories", "string[]", true),
            FieldSpec::new("tags", "string[]", true),
            FieldSpec::new("product_category", "string[]", true),
            FieldSpec::new("brand", "string[]", true),
            FieldSpec::new("sku", "string", false),
            FieldSpec::new("price", "float", false),
            FieldSpec::new("popularity", "float", false),
            FieldSpec::new("timestamp", "int64", false),
            FieldSpec::new("author", "string", false),
        ],
        default_sorting_field: "popularity".to_string(),
    }
}

/// True when every canonical field name is present remotely and the
/// default sort field matches. Extra remote fields are tolerated.
pub fn schema_matches(remote: &RemoteCollection, schema: &CollectionSchema) -> bool {
    schema
        .fields
        .iter()
        .all(|f| remote.fields.iter().any(|r| r == &f.name))
        && remote.default_sorting_field == schema.default_sorting_field
}

/// Reconciles the canonical schema against the live collection, memoized
/// per process. Backend errors leave the manager "not ready"; callers
/// treat that as non-fatal and fail soft.
pub struct SchemaManager {
    index: Arc<dyn SearchIndex>,
    schema: CollectionSchema,
    ready: AtomicBool,
}

impl SchemaManager {
    pub fn new(index: Arc<dyn SearchIndex>, collection: &str) -> Self {
        Self {
            index,
            schema: canonical_schema(collection),
            ready: AtomicBool::new(false),
        }
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Forget the memoized readiness; the next `ensure` re-checks the
    /// remote. Called on configuration changes.
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Idempotent: cheap once the collection has been verified. On
    /// mismatch the remote collection is deleted (absence tolerated) and
    /// recreated from the canonical schema.
    pub async fn ensure(&self) -> Result<(), EngineError> {
        if self.is_ready() {
            return Ok(());
        }

        match self.index.retrieve_collection().await {
            Ok(Some(remote)) => {
                if schema_matches(&remote, &self.schema) {
                    self.ready.store(true, Ordering::Release);
                    return Ok(());
                }
                info!(
                    collection = %self.schema.name,
                    "live collection schema out of date, migrating"
                );
                self.index.delete_collection().await.map_err(|e| {
                    warn!("failed to delete outdated collection: {}", e);
                    e
                })?;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("unable to inspect collection: {}", e);
                return Err(e);
            }
        }

        self.index.create_collection(&self.schema).await.map_err(|e| {
            warn!("failed to create collection: {}", e);
            e
        })?;

        self.ready.store(true, Ordering::Release);
        Ok(())
    }
}
