//! Ranked query execution with graceful degradation.
//!
//! [`SearchExecutor`] runs translated queries against the index across a
//! fixed full-text field set. [`SearchService`] wraps it with the query
//! contract the callers rely on: validation errors are rejected, index
//! outages route to the repository fallback, and only when both paths are
//! gone does the caller see one generic unavailable error. Internal
//! failure detail is logged, never exposed.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::Config;
use crate::db;
use crate::error::{EngineError, QueryError};
use crate::fallback::{basic_search, FallbackOutcome};
use crate::index::typesense::TypesenseClient;
use crate::index::SearchIndex;
use crate::models::{SearchResults, StructuredQuery};
use crate::query;
use crate::repository::{ContentRepository, SqliteCatalog};
use crate::schema::SchemaManager;
use crate::sync::SharedTypes;

/// Full-text fields every search covers.
pub const QUERY_BY: &str = "title,content,excerpt,tags,categories,product_category,brand,sku";
/// Fields the engine highlights in hits.
pub const HIGHLIGHT_FIELDS: &str = "excerpt,content";

pub struct SearchExecutor {
    index: Arc<dyn SearchIndex>,
    schema: Arc<SchemaManager>,
}

impl SearchExecutor {
    pub fn new(index: Arc<dyn SearchIndex>, schema: Arc<SchemaManager>) -> Self {
        Self { index, schema }
    }

    /// Execute against the index. Requires schema readiness; any backend
    /// failure surfaces as an "index unavailable" condition for the
    /// caller to route to the fallback.
    pub async fn execute(
        &self,
        query: &StructuredQuery,
        default_types: &[String],
    ) -> Result<SearchResults, EngineError> {
        self.schema.ensure().await?;
        let translated = query::translate(query, default_types);
        let page = self
            .index
            .search(&translated, QUERY_BY, HIGHLIGHT_FIELDS)
            .await?;
        Ok(SearchResults {
            hits: page.hits,
            found: page.found,
            page: page.page,
            fallback: false,
        })
    }
}

/// What the query surface reports to callers. The unavailable message is
/// the only failure detail end users ever see.
#[derive(Debug, Error)]
pub enum SearchServiceError {
    #[error("{0}")]
    Invalid(#[from] QueryError),
    #[error("Search service unavailable. Please try again later.")]
    Unavailable,
}

pub struct SearchService {
    executor: Option<SearchExecutor>,
    repo: Arc<dyn ContentRepository>,
    types: SharedTypes,
}

impl SearchService {
    /// `executor` is `None` when the engine is not configured; the service
    /// then serves every query from the fallback.
    pub fn new(
        executor: Option<SearchExecutor>,
        repo: Arc<dyn ContentRepository>,
        types: SharedTypes,
    ) -> Self {
        Self {
            executor,
            repo,
            types,
        }
    }

    fn default_types(&self) -> Vec<String> {
        self.types.read().unwrap().clone()
    }

    pub async fn search(
        &self,
        query: &StructuredQuery,
    ) -> Result<SearchResults, SearchServiceError> {
        query::validate(query)?;
        let default_types = self.default_types();

        if let Some(executor) = &self.executor {
            match executor.execute(query, &default_types).await {
                Ok(results) => return Ok(results),
                Err(e) => warn!("index search failed, trying fallback: {}", e),
            }
        }

        match basic_search(self.repo.as_ref(), query, &default_types).await {
            Ok(FallbackOutcome::Results(results)) => Ok(results),
            Ok(FallbackOutcome::Unavailable) => Err(SearchServiceError::Unavailable),
            Err(e) => {
                error!("fallback search failed: {}", e);
                Err(SearchServiceError::Unavailable)
            }
        }
    }
}

/// Build the query-path service from configuration. A missing engine
/// configuration silently disables the index half of the service.
pub async fn service_from_config(config: &Config) -> Result<SearchService> {
    let pool = db::connect(&config.repository.path).await?;
    let repo: Arc<dyn ContentRepository> = Arc::new(SqliteCatalog::new(pool));
    let types: SharedTypes = Arc::new(std::sync::RwLock::new(config.indexing.types.clone()));

    let executor = match TypesenseClient::new(&config.engine) {
        Ok(client) => {
            let index: Arc<dyn SearchIndex> = Arc::new(client);
            let schema = Arc::new(SchemaManager::new(
                index.clone(),
                &config.engine.collection,
            ));
            Some(SearchExecutor::new(index, schema))
        }
        Err(EngineError::NotConfigured) => {
            warn!("search engine not configured; serving fallback results only");
            None
        }
        Err(e) => {
            warn!("search engine client unavailable: {}", e);
            None
        }
    };

    Ok(SearchService::new(executor, repo, types))
}

/// CLI entry point: run one structured query and print the ranked hits.
pub async fn run_search(config: &Config, query: &StructuredQuery) -> Result<()> {
    let service = service_from_config(config).await?;

    let results = match service.search(query).await {
        Ok(results) => results,
        Err(SearchServiceError::Invalid(e)) => anyhow::bail!("{}", e),
        Err(e) => anyhow::bail!("{}", e),
    };

    if results.fallback {
        println!("(degraded: search index unavailable, showing catalog matches)");
    }
    if results.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.hits.iter().enumerate() {
        let doc = &hit.document;
        let date = chrono::DateTime::from_timestamp(doc.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            doc.popularity,
            doc.types,
            doc.title
        );
        println!("    published: {}", date);
        println!("    url: {}", doc.permalink);
        if !doc.excerpt.is_empty() {
            println!("    excerpt: \"{}\"", doc.excerpt.replace('\n', " "));
        }
        println!("    id: {}", doc.id);
        println!();
    }
    println!("found: {} (page {})", results.found, results.page);

    Ok(())
}
