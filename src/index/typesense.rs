//! HTTP client for the Typesense-compatible search engine.
//!
//! The client is an explicitly constructed handle: the underlying HTTP
//! connection pool is built once at construction and reused for every
//! call. Transport failures, timeouts, and non-success responses all
//! surface as [`EngineError::Unavailable`] so the caller can decide
//! whether to fall back.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{Document, Highlight, SearchHit};
use crate::schema::{CollectionSchema, RemoteCollection};

use super::{IndexPage, SearchIndex, TranslatedQuery};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

pub struct TypesenseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    collection: String,
}

impl TypesenseClient {
    /// Fails with [`EngineError::NotConfigured`] when host or API key are
    /// missing; callers disable indexing and index-backed search instead
    /// of treating that as fatal.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        if !config.is_configured() {
            return Err(EngineError::NotConfigured);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn documents_url(&self) -> String {
        format!("{}/documents", self.collection_url())
    }
}

fn transport_err(e: reqwest::Error) -> EngineError {
    EngineError::Unavailable(e.to_string())
}

async fn unexpected_status(response: reqwest::Response) -> EngineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    EngineError::Unavailable(format!("HTTP {}: {}", status, body))
}

// ============ Wire shapes ============

#[derive(Deserialize)]
struct RemoteFieldWire {
    name: String,
}

#[derive(Deserialize)]
struct RemoteCollectionWire {
    name: String,
    #[serde(default)]
    fields: Vec<RemoteFieldWire>,
    #[serde(default)]
    default_sorting_field: String,
}

#[derive(Deserialize)]
struct HealthWire {
    #[serde(default)]
    ok: bool,
}

#[derive(Deserialize)]
struct HighlightWire {
    #[serde(default)]
    field: String,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct HitWire {
    document: Document,
    #[serde(default)]
    highlights: Vec<HighlightWire>,
}

#[derive(Deserialize)]
struct SearchWire {
    #[serde(default)]
    found: u64,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    hits: Vec<HitWire>,
}

#[derive(Deserialize)]
struct ImportLineWire {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl SearchIndex for TypesenseClient {
    async fn health(&self) -> Result<(), EngineError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(unexpected_status(response).await);
        }

        let health: HealthWire = response.json().await.map_err(transport_err)?;
        if health.ok {
            Ok(())
        } else {
            Err(EngineError::Unavailable(
                "health endpoint did not return ok=true".to_string(),
            ))
        }
    }

    async fn retrieve_collection(&self) -> Result<Option<RemoteCollection>, EngineError> {
        let response = self
            .http
            .get(self.collection_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status.is_success() {
            let wire: RemoteCollectionWire = response.json().await.map_err(transport_err)?;
            Ok(Some(RemoteCollection {
                name: wire.name,
                fields: wire.fields.into_iter().map(|f| f.name).collect(),
                default_sorting_field: wire.default_sorting_field,
            }))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(unexpected_status(response).await)
        }
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), EngineError> {
        let response = self
            .http
            .post(format!("{}/collections", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(schema)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        // A rejected schema is a schema problem, not an outage
        if status.is_client_error() {
            Err(EngineError::Schema(format!("HTTP {}: {}", status, body)))
        } else {
            Err(EngineError::Unavailable(format!(
                "HTTP {}: {}",
                status, body
            )))
        }
    }

    async fn delete_collection(&self) -> Result<(), EngineError> {
        let response = self
            .http
            .delete(self.collection_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(unexpected_status(response).await)
        }
    }

    async fn upsert(&self, doc: &Document) -> Result<(), EngineError> {
        let response = self
            .http
            .post(self.documents_url())
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("action", "upsert")])
            .json(doc)
            .send()
            .await
            .map_err(transport_err)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_status(response).await)
        }
    }

    async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.documents_url(), id))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        // Deleting an absent document is fine
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(unexpected_status(response).await)
        }
    }

    async fn delete_by_filter(&self, filter: &str) -> Result<(), EngineError> {
        let response = self
            .http
            .delete(self.documents_url())
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("filter_by", filter)])
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(unexpected_status(response).await)
        }
    }

    async fn import(&self, docs: &[Document]) -> Result<usize, EngineError> {
        if docs.is_empty() {
            return Ok(0);
        }

        let payload = docs
            .iter()
            .map(|d| serde_json::to_string(d).map_err(|e| EngineError::Unavailable(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        let response = self
            .http
            .post(format!("{}/import", self.documents_url()))
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "text/plain; charset=utf-8")
            .query(&[("action", "upsert"), ("dirty_values", "coerce_or_drop")])
            .body(payload)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(unexpected_status(response).await);
        }

        // One JSON result per input line; count what the engine accepted
        let body = response.text().await.map_err(transport_err)?;
        let mut accepted = 0;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ImportLineWire>(line) {
                Ok(result) if result.success => accepted += 1,
                Ok(result) => {
                    warn!(
                        "import rejected a document: {}",
                        result.error.unwrap_or_default()
                    );
                }
                Err(e) => warn!("unparseable import result line: {}", e),
            }
        }
        Ok(accepted)
    }

    async fn search(
        &self,
        query: &TranslatedQuery,
        query_by: &str,
        highlight_fields: &str,
    ) -> Result<IndexPage, EngineError> {
        let per_page = query.per_page.to_string();
        let page = query.page.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query.query_text.as_str()),
            ("query_by", query_by),
            ("per_page", per_page.as_str()),
            ("page", page.as_str()),
            ("highlight_fields", highlight_fields),
        ];
        if !query.filter_expression.is_empty() {
            params.push(("filter_by", query.filter_expression.as_str()));
        }
        if !query.sort_expression.is_empty() {
            params.push(("sort_by", query.sort_expression.as_str()));
        }

        let response = self
            .http
            .get(format!("{}/search", self.documents_url()))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(unexpected_status(response).await);
        }

        let wire: SearchWire = response.json().await.map_err(transport_err)?;
        Ok(IndexPage {
            found: wire.found,
            page: wire.page.max(1),
            hits: wire
                .hits
                .into_iter()
                .map(|h| SearchHit {
                    document: h.document,
                    highlights: h
                        .highlights
                        .into_iter()
                        .map(|hl| Highlight {
                            field: hl.field,
                            snippet: hl.snippet.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_engine_rejected() {
        let config = EngineConfig::default();
        assert!(matches!(
            TypesenseClient::new(&config),
            Err(EngineError::NotConfigured)
        ));
    }

    #[test]
    fn test_configured_client_builds_urls() {
        let config = EngineConfig {
            host: "search.local".into(),
            api_key: "key".into(),
            ..EngineConfig::default()
        };
        let client = TypesenseClient::new(&config).unwrap();
        assert_eq!(
            client.collection_url(),
            "http://search.local:8108/collections/site_content"
        );
        assert_eq!(
            client.documents_url(),
            "http://search.local:8108/collections/site_content/documents"
        );
    }
}
