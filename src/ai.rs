//! AI collaborator: audio transcription, query extraction, and image
//! analysis.
//!
//! The collaborator is opaque and unreliable by contract: every operation
//! returns empty on failure and never raises across this boundary.
//! [`voice_query`] and [`image_query`] wrap the raw operations with the
//! digest-keyed [`QueryCache`] so duplicate uploads within the TTL cost a
//! single AI call.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::cache::{digest_hex, QueryCache, IMAGE_TTL, VOICE_TTL};
use crate::config::AiConfig;
use crate::models::{ImageLabels, QueryFilters, StructuredQuery};

const OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Why a modality flow produced no query. The messages are user-facing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModalityError {
    #[error("Could not transcribe audio.")]
    Transcription,
    #[error("Could not extract query.")]
    Extraction,
    #[error("Could not analyze image.")]
    Analysis,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Transcript text, or empty on any failure.
    async fn transcribe(&self, audio: &[u8], mime: &str) -> String;

    /// Structured query extracted from free text, or `None` on failure.
    async fn extract_query(&self, text: &str) -> Option<StructuredQuery>;

    /// Description and keywords for an image, or `None` on failure.
    async fn analyze_image(&self, image: &[u8], mime: &str) -> Option<ImageLabels>;
}

// ============ OpenAI client ============

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    chat_model: String,
    transcription_model: String,
}

impl OpenAiClient {
    /// Reads `OPENAI_API_KEY` from the environment. A missing key does not
    /// fail construction; every call then returns empty, which disables
    /// the voice and image modalities without breaking text search.
    pub fn new(config: &AiConfig) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("OPENAI_API_KEY not set; voice and image search are disabled");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            chat_model: config.chat_model.clone(),
            transcription_model: config.transcription_model.clone(),
        }
    }

    async fn chat_json(&self, body: serde_json::Value) -> Option<String> {
        let api_key = self.api_key.as_ref()?;
        let response = self
            .http
            .post(format!("{}/chat/completions", OPENAI_BASE))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| warn!("chat completion request failed: {}", e))
            .ok()?;

        if !response.status().is_success() {
            warn!("chat completion returned HTTP {}", response.status());
            return None;
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| warn!("unparseable chat completion response: {}", e))
            .ok()?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.to_string())
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn transcribe(&self, audio: &[u8], mime: &str) -> String {
        let Some(api_key) = self.api_key.as_ref() else {
            return String::new();
        };

        let file_part = reqwest::multipart::Part::bytes(audio.to_vec()).file_name("audio");
        let file_part = match file_part.mime_str(mime) {
            Ok(part) => part,
            Err(_) => reqwest::multipart::Part::bytes(audio.to_vec()).file_name("audio"),
        };
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", file_part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", OPENAI_BASE))
            .header("Authorization", format!("Bearer {}", api_key))
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("transcription returned HTTP {}", r.status());
                return String::new();
            }
            Err(e) => {
                warn!("transcription request failed: {}", e);
                return String::new();
            }
        };

        response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|j| j.get("text").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default()
    }

    async fn extract_query(&self, text: &str) -> Option<StructuredQuery> {
        let system = "You turn raw queries into a JSON for search. Output ONLY valid JSON \
                      matching this schema: {query: string, synonyms: string[], filters: \
                      {types?: string[], taxonomy?: object, price?: {gte?: number, lte?: number}}, \
                      sort?: {field:string,order:'asc'|'desc'}[], limit?: number, page?: number}";
        let body = json!({
            "model": self.chat_model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": format!("Text: {}", text)},
            ],
            "temperature": 0.2,
        });

        let content = self.chat_json(body).await?;
        serde_json::from_str(&content)
            .map_err(|e| warn!("extracted query did not match the schema: {}", e))
            .ok()
    }

    async fn analyze_image(&self, image: &[u8], mime: &str) -> Option<ImageLabels> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{};base64,{}", mime, encoded);
        let system = "Describe the image briefly and list 8-15 concise shopping/search \
                      keywords and categories. Respond as JSON with {description:string, \
                      keywords:string[], categories:string[]}";
        let body = json!({
            "model": self.chat_model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": [
                    {"type": "text", "text": "Analyze this image."},
                    {"type": "image_url", "image_url": {"url": data_url}},
                ]},
            ],
        });

        let content = self.chat_json(body).await?;
        serde_json::from_str(&content)
            .map_err(|e| warn!("image labels did not match the schema: {}", e))
            .ok()
    }
}

// ============ Modality flows ============

fn unique_keywords(keywords: &[String], cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .take(cap)
        .cloned()
        .collect()
}

/// Turn image labels into the uniform query shape: description plus the
/// first ten distinct keywords as query text, the keywords as synonyms,
/// scoped to products and posts.
pub fn labels_to_query(labels: &ImageLabels) -> StructuredQuery {
    let keywords = unique_keywords(&labels.keywords, 10);
    let query = format!("{} {}", labels.description.trim(), keywords.join(" "))
        .trim()
        .to_string();
    StructuredQuery {
        query,
        synonyms: keywords,
        filters: QueryFilters {
            types: vec!["product".to_string(), "post".to_string()],
            ..QueryFilters::default()
        },
        sort: Vec::new(),
        limit: 24,
        page: 1,
    }
}

/// Voice modality: digest → cache → transcribe → extract → cache (1 day).
pub async fn voice_query(
    ai: &dyn AiProvider,
    cache: &QueryCache,
    audio: &[u8],
    mime: &str,
) -> Result<StructuredQuery, ModalityError> {
    let key = format!("voice:{}", digest_hex(audio));
    if let Some(cached) = cache.get(&key) {
        return Ok(cached);
    }

    let transcript = ai.transcribe(audio, mime).await;
    if transcript.trim().is_empty() {
        return Err(ModalityError::Transcription);
    }

    let query = ai
        .extract_query(&transcript)
        .await
        .ok_or(ModalityError::Extraction)?;
    cache.put(&key, query.clone(), VOICE_TTL);
    Ok(query)
}

/// Image modality: digest → cache → analyze → normalize → cache (7 days).
pub async fn image_query(
    ai: &dyn AiProvider,
    cache: &QueryCache,
    image: &[u8],
    mime: &str,
) -> Result<StructuredQuery, ModalityError> {
    let key = format!("image:{}", digest_hex(image));
    if let Some(cached) = cache.get(&key) {
        return Ok(cached);
    }

    let labels = ai
        .analyze_image(image, mime)
        .await
        .ok_or(ModalityError::Analysis)?;
    let query = labels_to_query(&labels);
    cache.put(&key, query.clone(), IMAGE_TTL);
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts calls and answers deterministically.
    struct StubAi {
        transcriptions: AtomicUsize,
        extractions: AtomicUsize,
        analyses: AtomicUsize,
        fail_transcription: bool,
    }

    impl StubAi {
        fn new() -> Self {
            Self {
                transcriptions: AtomicUsize::new(0),
                extractions: AtomicUsize::new(0),
                analyses: AtomicUsize::new(0),
                fail_transcription: false,
            }
        }
    }

    #[async_trait]
    impl AiProvider for StubAi {
        async fn transcribe(&self, _audio: &[u8], _mime: &str) -> String {
            self.transcriptions.fetch_add(1, Ordering::SeqCst);
            if self.fail_transcription {
                String::new()
            } else {
                "red lamp under fifty".to_string()
            }
        }

        async fn extract_query(&self, text: &str) -> Option<StructuredQuery> {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            Some(StructuredQuery::from_text(text))
        }

        async fn analyze_image(&self, _image: &[u8], _mime: &str) -> Option<ImageLabels> {
            self.analyses.fetch_add(1, Ordering::SeqCst);
            Some(ImageLabels {
                description: "a red desk lamp".to_string(),
                keywords: vec!["lamp".to_string(), "red".to_string()],
                categories: vec!["lighting".to_string()],
            })
        }
    }

    fn cache() -> QueryCache {
        QueryCache::new(Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn test_duplicate_voice_uploads_hit_ai_once() {
        let ai = StubAi::new();
        let cache = cache();

        let first = voice_query(&ai, &cache, b"audio-bytes", "audio/webm")
            .await
            .unwrap();
        let second = voice_query(&ai, &cache, b"audio-bytes", "audio/webm")
            .await
            .unwrap();

        assert_eq!(first.query, second.query);
        assert_eq!(ai.transcriptions.load(Ordering::SeqCst), 1);
        assert_eq!(ai.extractions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_uploads_are_distinct_cache_keys() {
        let ai = StubAi::new();
        let cache = cache();

        voice_query(&ai, &cache, b"first", "audio/webm").await.unwrap();
        voice_query(&ai, &cache, b"second", "audio/webm").await.unwrap();
        assert_eq!(ai.transcriptions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_transcription_is_reported_not_cached() {
        let mut ai = StubAi::new();
        ai.fail_transcription = true;
        let cache = cache();

        let err = voice_query(&ai, &cache, b"audio", "audio/webm")
            .await
            .unwrap_err();
        assert_eq!(err, ModalityError::Transcription);

        // A later successful attempt is not shadowed by a cached failure
        ai.fail_transcription = false;
        voice_query(&ai, &cache, b"audio", "audio/webm").await.unwrap();
        assert_eq!(ai.transcriptions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_image_uploads_hit_ai_once() {
        let ai = StubAi::new();
        let cache = cache();

        image_query(&ai, &cache, b"image-bytes", "image/png").await.unwrap();
        let second = image_query(&ai, &cache, b"image-bytes", "image/png")
            .await
            .unwrap();

        assert_eq!(ai.analyses.load(Ordering::SeqCst), 1);
        assert_eq!(second.filters.types, vec!["product", "post"]);
    }

    #[test]
    fn test_labels_to_query_mapping() {
        let labels = ImageLabels {
            description: "a red desk lamp".to_string(),
            keywords: (0..15).map(|i| format!("kw{}", i)).collect(),
            categories: vec!["lighting".to_string()],
        };
        let query = labels_to_query(&labels);
        assert!(query.query.starts_with("a red desk lamp kw0"));
        // Keywords are capped at ten
        assert_eq!(query.synonyms.len(), 10);
        assert_eq!(query.limit, 24);
        assert_eq!(query.page, 1);
        assert_eq!(query.filters.types, vec!["product", "post"]);
    }

    #[test]
    fn test_unique_keywords_dedupe_case_insensitively() {
        let keywords = vec![
            "Lamp".to_string(),
            "lamp".to_string(),
            " ".to_string(),
            "shade".to_string(),
        ];
        assert_eq!(unique_keywords(&keywords, 10), vec!["Lamp", "shade"]);
    }
}
