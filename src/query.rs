//! Structured-query validation and translation into the engine's
//! filter/sort expression grammar.
//!
//! List fields render as `field:=["v1","v2"]`, numeric ranges as
//! independent `field:>=x` / `field:<=x` clauses, all joined with ` && `.
//! A query without an explicit type filter is scoped to the configured
//! indexable types so it can never surface documents of excluded types.

use crate::error::QueryError;
use crate::index::TranslatedQuery;
use crate::models::{RangeFilter, SortOrder, StructuredQuery};

/// Engine-enforced ceiling on page size.
const MAX_PER_PAGE: u32 = 250;
const MAX_QUERY_LEN: usize = 512;

/// Reject malformed queries at the translation boundary.
pub fn validate(query: &StructuredQuery) -> Result<(), QueryError> {
    if query.limit == 0 || query.limit > MAX_PER_PAGE {
        return Err(QueryError(format!(
            "limit must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }
    if query.page == 0 {
        return Err(QueryError("page must be >= 1".to_string()));
    }
    if query.query.len() > MAX_QUERY_LEN {
        return Err(QueryError(format!(
            "query text must be at most {} bytes",
            MAX_QUERY_LEN
        )));
    }
    for range in [
        &query.filters.price,
        &query.filters.popularity,
        &query.filters.timestamp,
    ]
    .into_iter()
    .flatten()
    {
        if let (Some(gte), Some(lte)) = (range.gte, range.lte) {
            if gte > lte {
                return Err(QueryError("range lower bound exceeds upper bound".to_string()));
            }
        }
    }
    Ok(())
}

/// Escape a filter value for embedding inside a quoted list.
pub(crate) fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a `field:=["a","b"]` clause; `None` when the list is empty.
pub(crate) fn list_clause(field: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", escape_value(v)))
        .collect();
    Some(format!("{}:=[{}]", field, quoted.join(",")))
}

fn range_clauses(field: &str, range: &RangeFilter, parts: &mut Vec<String>) {
    if let Some(gte) = range.gte {
        parts.push(format!("{}:>={}", field, gte));
    }
    if let Some(lte) = range.lte {
        parts.push(format!("{}:<={}", field, lte));
    }
}

/// Keep only `[A-Za-z0-9_]`, the charset the engine accepts in field
/// positions.
fn sanitize_field(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn build_filter(query: &StructuredQuery, default_types: &[String]) -> String {
    let mut parts = Vec::new();

    // An unscoped query must never leak non-indexable documents
    let types = if query.filters.types.is_empty() {
        default_types
    } else {
        &query.filters.types
    };
    if let Some(clause) = list_clause("types", types) {
        parts.push(clause);
    }

    for (bucket, values) in &query.filters.taxonomy {
        let field = sanitize_field(bucket);
        if field.is_empty() {
            continue;
        }
        if let Some(clause) = list_clause(&field, values) {
            parts.push(clause);
        }
    }

    if let Some(range) = &query.filters.price {
        range_clauses("price", range, &mut parts);
    }
    if let Some(range) = &query.filters.popularity {
        range_clauses("popularity", range, &mut parts);
    }
    if let Some(range) = &query.filters.timestamp {
        range_clauses("timestamp", range, &mut parts);
    }

    if let Some(clause) = list_clause("sku", &query.filters.sku) {
        parts.push(clause);
    }

    parts.join(" && ")
}

/// Only the first sort instruction is honored; order defaults to
/// descending.
fn build_sort(query: &StructuredQuery) -> String {
    let Some(first) = query.sort.first() else {
        return String::new();
    };
    let field = sanitize_field(&first.field);
    if field.is_empty() {
        return String::new();
    }
    let order = match first.order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    };
    format!("{}:{}", field, order)
}

/// Lower a validated structured query into the engine grammar.
pub fn translate(query: &StructuredQuery, default_types: &[String]) -> TranslatedQuery {
    let trimmed = query.query.trim();
    TranslatedQuery {
        query_text: if trimmed.is_empty() {
            "*".to_string()
        } else {
            trimmed.to_string()
        },
        filter_expression: build_filter(query, default_types),
        sort_expression: build_sort(query),
        page: query.page.max(1),
        per_page: query.limit.max(1),
    }
}
