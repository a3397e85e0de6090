//! Core data models.
//!
//! These types represent the catalog entities, canonical index documents,
//! and structured queries that flow through the synchronizer and the
//! multi-modal query pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Publication status of a catalog entity. Only `Published` entities are
/// ever indexed; everything else is treated uniformly as "not visible".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    Published,
    Draft,
    Pending,
    Private,
    Trashed,
}

impl EntityStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "publish" | "published" => EntityStatus::Published,
            "pending" => EntityStatus::Pending,
            "private" => EntityStatus::Private,
            "trash" | "trashed" => EntityStatus::Trashed,
            _ => EntityStatus::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Published => "publish",
            EntityStatus::Draft => "draft",
            EntityStatus::Pending => "pending",
            EntityStatus::Private => "private",
            EntityStatus::Trashed => "trash",
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, EntityStatus::Published)
    }
}

/// A taxonomy term attached to an entity. Hierarchical taxonomies bucket
/// into categories, flat ones into tags; the commerce taxonomy pair gets
/// its own buckets (see `document::build_document`).
#[derive(Debug, Clone)]
pub struct TaxonomyTerm {
    pub taxonomy: String,
    pub slug: String,
    pub hierarchical: bool,
}

/// Commerce attributes present only for sellable entities.
#[derive(Debug, Clone)]
pub struct CommerceInfo {
    pub sku: String,
    pub price: f64,
    pub image: Option<String>,
    pub sales: i64,
    pub reviews: i64,
    pub avg_rating: f64,
}

/// A catalog item as read from the content repository. Owned and mutated
/// elsewhere; this crate only reads it.
#[derive(Debug, Clone)]
pub struct ContentEntity {
    pub id: i64,
    pub kind: String,
    pub status: EntityStatus,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub permalink: Option<String>,
    pub thumbnail: Option<String>,
    pub author: String,
    pub comment_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub terms: Vec<TaxonomyTerm>,
    pub commerce: Option<CommerceInfo>,
}

/// Canonical denormalized record stored in the search index.
///
/// Field names double as the filter grammar's field names (`types`,
/// `timestamp`, the facet buckets), so a translated filter always
/// addresses a real indexed field. At most one document exists per id;
/// absence means "not currently indexed".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// Stable string form of the entity id.
    pub id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub permalink: String,
    pub image: String,
    /// Entity kind (e.g. `post`, `product`).
    pub types: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub product_category: Vec<String>,
    pub brand: Vec<String>,
    pub sku: String,
    pub price: f64,
    pub popularity: f64,
    /// Publication time, epoch seconds.
    pub timestamp: i64,
    pub author: String,
}

/// Sort direction; descending unless the query says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortInstruction {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Inclusive numeric range; both bounds may coexist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

/// Filter block of a structured query. The taxonomy map is keyed by facet
/// bucket (`categories`, `tags`, `product_category`, `brand`); a BTreeMap
/// keeps translated clause order deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilters {
    pub types: Vec<String>,
    pub taxonomy: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<RangeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<RangeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RangeFilter>,
    pub sku: Vec<String>,
}

/// Normalized query form produced uniformly from typed text, transcribed
/// voice, or analyzed images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredQuery {
    pub query: String,
    pub synonyms: Vec<String>,
    pub filters: QueryFilters,
    pub sort: Vec<SortInstruction>,
    pub limit: u32,
    pub page: u32,
}

impl Default for StructuredQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            synonyms: Vec::new(),
            filters: QueryFilters::default(),
            sort: Vec::new(),
            limit: 24,
            page: 1,
        }
    }
}

impl StructuredQuery {
    /// Plain-text query with default paging, as produced by the text
    /// modality.
    pub fn from_text(query: &str) -> Self {
        Self {
            query: query.trim().to_string(),
            ..Self::default()
        }
    }
}

/// A highlighted fragment of a matching document field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Highlight {
    pub field: String,
    pub snippet: String,
}

/// One ranked hit: the stored document plus its highlights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub document: Document,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

/// A page of hits. `fallback` is only serialized when the results came
/// from the degraded repository search, so callers can warn end users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub found: u64,
    pub page: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Labels extracted from an analyzed image by the AI collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLabels {
    pub description: String,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_roundtrip() {
        assert!(EntityStatus::parse("publish").is_published());
        assert!(!EntityStatus::parse("draft").is_published());
        assert_eq!(EntityStatus::parse("trash"), EntityStatus::Trashed);
        // Unknown statuses are treated as unpublished
        assert_eq!(EntityStatus::parse("future"), EntityStatus::Draft);
    }

    #[test]
    fn test_structured_query_defaults_from_partial_json() {
        let q: StructuredQuery = serde_json::from_str(r#"{"query": "lamp"}"#).unwrap();
        assert_eq!(q.query, "lamp");
        assert_eq!(q.limit, 24);
        assert_eq!(q.page, 1);
        assert!(q.filters.types.is_empty());
    }

    #[test]
    fn test_fallback_flag_only_serialized_when_degraded() {
        let ok = SearchResults {
            hits: vec![],
            found: 0,
            page: 1,
            fallback: false,
        };
        let degraded = SearchResults {
            fallback: true,
            ..ok.clone()
        };
        assert!(!serde_json::to_string(&ok).unwrap().contains("fallback"));
        assert!(serde_json::to_string(&degraded)
            .unwrap()
            .contains(r#""fallback":true"#));
    }
}
