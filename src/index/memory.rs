//! In-memory [`SearchIndex`] implementation for tests.
//!
//! Documents live in a `HashMap` behind `std::sync::RwLock`. Filter
//! expressions are evaluated against the same grammar the translator
//! emits, text matching is case-insensitive substring search, and
//! availability can be switched off to simulate a backend outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{Document, Highlight, SearchHit};
use crate::schema::{CollectionSchema, RemoteCollection};

use super::{IndexPage, SearchIndex, TranslatedQuery};

pub struct MemoryIndex {
    docs: RwLock<HashMap<String, Document>>,
    collection: RwLock<Option<CollectionSchema>>,
    available: AtomicBool,
    delete_calls: AtomicUsize,
    import_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            collection: RwLock::new(None),
            available: AtomicBool::new(true),
            delete_calls: AtomicUsize::new(0),
            import_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn document_count(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.read().unwrap().get(id).cloned()
    }

    /// How many single-document deletes have been issued.
    pub fn delete_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// How many bulk import calls have been issued.
    pub fn import_count(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), EngineError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Unavailable("connection refused".to_string()))
        }
    }

    fn check_collection(&self) -> Result<(), EngineError> {
        if self.collection.read().unwrap().is_some() {
            Ok(())
        } else {
            Err(EngineError::Unavailable("no such collection".to_string()))
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Filter evaluation ============

fn string_values(doc: &Document, field: &str) -> Option<Vec<String>> {
    match field {
        "id" => Some(vec![doc.id.clone()]),
        "types" => Some(vec![doc.types.clone()]),
        "sku" => Some(vec![doc.sku.clone()]),
        "categories" => Some(doc.categories.clone()),
        "tags" => Some(doc.tags.clone()),
        "product_category" => Some(doc.product_category.clone()),
        "brand" => Some(doc.brand.clone()),
        "author" => Some(vec![doc.author.clone()]),
        _ => None,
    }
}

fn number_value(doc: &Document, field: &str) -> Option<f64> {
    match field {
        "price" => Some(doc.price),
        "popularity" => Some(doc.popularity),
        "timestamp" => Some(doc.timestamp as f64),
        _ => None,
    }
}

/// Parse `["a","b"]` honoring escapes inside quoted values.
fn parse_list(raw: &str) -> Vec<String> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in inner.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            if in_quotes {
                values.push(std::mem::take(&mut current));
            }
            in_quotes = !in_quotes;
        } else if in_quotes {
            current.push(c);
        }
    }
    values
}

fn clause_matches(doc: &Document, clause: &str) -> bool {
    let Some((field, op)) = clause.split_once(':') else {
        return false;
    };
    let field = field.trim();
    let op = op.trim();

    if let Some(rest) = op.strip_prefix("=") {
        let wanted = parse_list(rest);
        return string_values(doc, field)
            .map(|have| wanted.iter().any(|w| have.contains(w)))
            .unwrap_or(false);
    }
    if let Some(rest) = op.strip_prefix(">=") {
        return match (number_value(doc, field), rest.trim().parse::<f64>()) {
            (Some(have), Ok(bound)) => have >= bound,
            _ => false,
        };
    }
    if let Some(rest) = op.strip_prefix("<=") {
        return match (number_value(doc, field), rest.trim().parse::<f64>()) {
            (Some(have), Ok(bound)) => have <= bound,
            _ => false,
        };
    }
    false
}

fn filter_matches(doc: &Document, filter: &str) -> bool {
    if filter.trim().is_empty() {
        return true;
    }
    filter.split(" && ").all(|clause| clause_matches(doc, clause))
}

// ============ Text matching ============

fn text_matches(doc: &Document, needle: &str) -> bool {
    if needle.is_empty() || needle == "*" {
        return true;
    }
    let needle = needle.to_lowercase();
    let haystacks = [
        doc.title.to_lowercase(),
        doc.content.to_lowercase(),
        doc.excerpt.to_lowercase(),
        doc.sku.to_lowercase(),
        doc.categories.join(" ").to_lowercase(),
        doc.tags.join(" ").to_lowercase(),
        doc.product_category.join(" ").to_lowercase(),
        doc.brand.join(" ").to_lowercase(),
    ];
    if haystacks.iter().any(|h| h.contains(&needle)) {
        return true;
    }
    // Otherwise require every query word to appear somewhere
    needle
        .split_whitespace()
        .all(|word| haystacks.iter().any(|h| h.contains(word)))
}

fn make_highlights(doc: &Document, needle: &str) -> Vec<Highlight> {
    if needle.is_empty() || needle == "*" {
        return Vec::new();
    }
    let lower = needle.to_lowercase();
    if doc.excerpt.to_lowercase().contains(&lower) {
        return vec![Highlight {
            field: "excerpt".to_string(),
            snippet: doc.excerpt.clone(),
        }];
    }
    if let Some(pos) = doc.content.to_lowercase().find(&lower) {
        let start = pos.saturating_sub(60);
        let end = (pos + lower.len() + 60).min(doc.content.len());
        // Snap to char boundaries
        let start = (0..=start).rev().find(|i| doc.content.is_char_boundary(*i));
        let end = (end..=doc.content.len()).find(|i| doc.content.is_char_boundary(*i));
        if let (Some(start), Some(end)) = (start, end) {
            return vec![Highlight {
                field: "content".to_string(),
                snippet: doc.content[start..end].to_string(),
            }];
        }
    }
    Vec::new()
}

fn sort_key(doc: &Document, field: &str) -> f64 {
    number_value(doc, field).unwrap_or(0.0)
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn health(&self) -> Result<(), EngineError> {
        self.check_available()
    }

    async fn retrieve_collection(&self) -> Result<Option<RemoteCollection>, EngineError> {
        self.check_available()?;
        Ok(self.collection.read().unwrap().as_ref().map(|schema| {
            RemoteCollection {
                name: schema.name.clone(),
                fields: schema.fields.iter().map(|f| f.name.clone()).collect(),
                default_sorting_field: schema.default_sorting_field.clone(),
            }
        }))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), EngineError> {
        self.check_available()?;
        *self.collection.write().unwrap() = Some(schema.clone());
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), EngineError> {
        self.check_available()?;
        *self.collection.write().unwrap() = None;
        self.docs.write().unwrap().clear();
        Ok(())
    }

    async fn upsert(&self, doc: &Document) -> Result<(), EngineError> {
        self.check_available()?;
        self.check_collection()?;
        self.docs
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), EngineError> {
        self.check_available()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.docs.write().unwrap().remove(id);
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &str) -> Result<(), EngineError> {
        self.check_available()?;
        self.docs
            .write()
            .unwrap()
            .retain(|_, doc| !filter_matches(doc, filter));
        Ok(())
    }

    async fn import(&self, docs: &[Document]) -> Result<usize, EngineError> {
        self.check_available()?;
        self.check_collection()?;
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.docs.write().unwrap();
        for doc in docs {
            stored.insert(doc.id.clone(), doc.clone());
        }
        Ok(docs.len())
    }

    async fn search(
        &self,
        query: &TranslatedQuery,
        _query_by: &str,
        _highlight_fields: &str,
    ) -> Result<IndexPage, EngineError> {
        self.check_available()?;
        self.check_collection()?;

        let docs = self.docs.read().unwrap();
        let mut matches: Vec<&Document> = docs
            .values()
            .filter(|doc| filter_matches(doc, &query.filter_expression))
            .filter(|doc| text_matches(doc, &query.query_text))
            .collect();

        let (sort_field, ascending) = match query.sort_expression.split_once(':') {
            Some((field, "asc")) => (field.to_string(), true),
            Some((field, _)) => (field.to_string(), false),
            None => ("popularity".to_string(), false),
        };
        matches.sort_by(|a, b| {
            let ka = sort_key(a, &sort_field);
            let kb = sort_key(b, &sort_field);
            let ordering = if ascending {
                ka.partial_cmp(&kb)
            } else {
                kb.partial_cmp(&ka)
            };
            ordering
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let found = matches.len() as u64;
        let page = query.page.max(1);
        let per_page = query.per_page.max(1) as usize;
        let offset = (page as usize - 1) * per_page;

        let hits = matches
            .into_iter()
            .skip(offset)
            .take(per_page)
            .map(|doc| SearchHit {
                document: doc.clone(),
                highlights: make_highlights(doc, &query.query_text),
            })
            .collect();

        Ok(IndexPage { hits, found, page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::canonical_schema;

    fn doc(id: &str, types: &str, title: &str, popularity: f64) -> Document {
        Document {
            id: id.to_string(),
            types: types.to_string(),
            title: title.to_string(),
            content: format!("{} body text", title),
            popularity,
            ..Document::default()
        }
    }

    async fn seeded() -> MemoryIndex {
        let index = MemoryIndex::new();
        index
            .create_collection(&canonical_schema("site_content"))
            .await
            .unwrap();
        index.upsert(&doc("1", "post", "Alpha note", 1.0)).await.unwrap();
        index.upsert(&doc("2", "product", "Red Lamp", 9.0)).await.unwrap();
        index.upsert(&doc("3", "product", "Blue Lamp", 5.0)).await.unwrap();
        index
    }

    #[test]
    fn test_parse_list_with_escapes() {
        assert_eq!(parse_list(r#"["a","b"]"#), vec!["a", "b"]);
        assert_eq!(parse_list(r#"["he said \"hi\""]"#), vec![r#"he said "hi""#]);
        assert_eq!(parse_list("[]"), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_filter_by_types_and_range() {
        let index = seeded().await;
        let query = TranslatedQuery {
            query_text: "*".to_string(),
            filter_expression: r#"types:=["product"] && popularity:>=6"#.to_string(),
            sort_expression: String::new(),
            page: 1,
            per_page: 10,
        };
        let page = index.search(&query, "", "").await.unwrap();
        assert_eq!(page.found, 1);
        assert_eq!(page.hits[0].document.id, "2");
    }

    #[tokio::test]
    async fn test_sort_defaults_to_popularity_desc() {
        let index = seeded().await;
        let query = TranslatedQuery {
            query_text: "lamp".to_string(),
            filter_expression: String::new(),
            sort_expression: String::new(),
            page: 1,
            per_page: 10,
        };
        let page = index.search(&query, "", "").await.unwrap();
        let ids: Vec<&str> = page.hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_delete_by_filter_removes_only_matching_type() {
        let index = seeded().await;
        index
            .delete_by_filter(r#"types:=["product"]"#)
            .await
            .unwrap();
        assert_eq!(index.document_count(), 1);
        assert!(index.get("1").is_some());
    }

    #[tokio::test]
    async fn test_unavailable_index_errors_everywhere() {
        let index = seeded().await;
        index.set_available(false);
        assert!(index.health().await.is_err());
        let query = TranslatedQuery {
            query_text: "*".to_string(),
            filter_expression: String::new(),
            sort_expression: String::new(),
            page: 1,
            per_page: 10,
        };
        assert!(index.search(&query, "", "").await.is_err());
        assert!(index.upsert(&doc("9", "post", "x", 0.0)).await.is_err());
    }
}
