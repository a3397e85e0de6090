//! Degraded search executed directly against the content repository.
//!
//! Used when the external index is unreachable. Facet filters are
//! approximated by folding their values into the text terms, and
//! popularity is approximated from engagement counters rather than the
//! full weighted formula. Results are always tagged `fallback: true` so
//! callers can warn end users.

use anyhow::Result;

use crate::document::build_document;
use crate::models::{Document, Highlight, SearchHit, SearchResults, SortOrder, StructuredQuery};
use crate::repository::ContentRepository;

/// Outcome of a fallback attempt. A repository with no query capability
/// yields `Unavailable` rather than an error.
pub enum FallbackOutcome {
    Results(SearchResults),
    Unavailable,
}

fn fold_terms(query: &StructuredQuery) -> Vec<String> {
    let mut terms: Vec<String> = query
        .query
        .split_whitespace()
        .filter(|w| *w != "*")
        .map(str::to_string)
        .collect();
    terms.extend(query.synonyms.iter().cloned());
    // Facet filters cannot be applied natively; approximate them as text
    for values in query.filters.taxonomy.values() {
        terms.extend(values.iter().cloned());
    }
    terms.extend(query.filters.sku.iter().cloned());

    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| !t.trim().is_empty() && seen.insert(t.to_lowercase()));
    terms
}

fn snippet_for(doc: &Document, terms: &[String]) -> Vec<Highlight> {
    let excerpt_lower = doc.excerpt.to_lowercase();
    if terms
        .iter()
        .any(|t| excerpt_lower.contains(&t.to_lowercase()))
    {
        return vec![Highlight {
            field: "excerpt".to_string(),
            snippet: doc.excerpt.clone(),
        }];
    }

    let content_lower = doc.content.to_lowercase();
    for term in terms {
        if let Some(pos) = content_lower.find(&term.to_lowercase()) {
            let start = (0..=pos.saturating_sub(60))
                .rev()
                .find(|i| doc.content.is_char_boundary(*i));
            let end = ((pos + term.len() + 60).min(doc.content.len())..=doc.content.len())
                .find(|i| doc.content.is_char_boundary(*i));
            if let (Some(start), Some(end)) = (start, end) {
                return vec![Highlight {
                    field: "content".to_string(),
                    snippet: doc.content[start..end].to_string(),
                }];
            }
        }
    }
    Vec::new()
}

fn apply_sort(hits: &mut [SearchHit], query: &StructuredQuery) {
    let Some(instruction) = query.sort.first() else {
        return;
    };
    if !matches!(
        instruction.field.as_str(),
        "price" | "popularity" | "timestamp"
    ) {
        return;
    }
    let key = |doc: &Document| -> f64 {
        match instruction.field.as_str() {
            "price" => doc.price,
            "popularity" => doc.popularity,
            _ => doc.timestamp as f64,
        }
    };
    hits.sort_by(|a, b| {
        let ka = key(&a.document);
        let kb = key(&b.document);
        let ordering = match instruction.order {
            SortOrder::Asc => ka.partial_cmp(&kb),
            SortOrder::Desc => kb.partial_cmp(&ka),
        };
        ordering
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
}

/// Run an equivalent query against the repository's native text match.
pub async fn basic_search(
    repo: &dyn ContentRepository,
    query: &StructuredQuery,
    default_types: &[String],
) -> Result<FallbackOutcome> {
    if !repo.supports_search() {
        return Ok(FallbackOutcome::Unavailable);
    }

    let kinds = if query.filters.types.is_empty() {
        default_types.to_vec()
    } else {
        query.filters.types.clone()
    };
    let terms = fold_terms(query);

    let entities = repo
        .text_search(&terms, &kinds, query.page.max(1), query.limit.max(1))
        .await?;

    let mut hits: Vec<SearchHit> = entities
        .iter()
        .filter_map(|entity| build_document(entity).map(|doc| (doc, entity)))
        .map(|(mut doc, entity)| {
            // Engagement-only popularity; the weighted formula needs the index
            doc.popularity = entity.comment_count.max(0) as f64;
            let highlights = snippet_for(&doc, &terms);
            SearchHit {
                document: doc,
                highlights,
            }
        })
        .collect();

    apply_sort(&mut hits, query);

    let found = hits.len() as u64;
    Ok(FallbackOutcome::Results(SearchResults {
        hits,
        found,
        page: query.page.max(1),
        fallback: true,
    }))
}
