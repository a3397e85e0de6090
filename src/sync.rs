//! Lifecycle-driven index synchronization.
//!
//! The [`Synchronizer`] consumes content lifecycle events through the
//! [`ContentObserver`] seam and keeps the index consistent one entity at a
//! time; configuration changes trigger bulk cleanups plus a single
//! debounced full resync. All index writes are idempotent upserts keyed by
//! the entity id, so live events and a concurrently running resync never
//! conflict.
//!
//! Indexing is fire-and-forget with respect to the mutation that triggered
//! it: failures are logged and left for the next resync pass to correct,
//! never surfaced to the event source.

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::build_document;
use crate::index::SearchIndex;
use crate::models::{Document, EntityStatus};
use crate::query::list_clause;
use crate::repository::ContentRepository;
use crate::scheduler::ResyncScheduler;
use crate::schema::SchemaManager;

/// Indexable entity kinds, shared between the synchronizer (which mutates
/// them on configuration changes) and the query path (which scopes
/// unfiltered queries to them).
pub type SharedTypes = Arc<RwLock<Vec<String>>>;

/// Wire form of a content lifecycle event, as posted to `/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    Created { id: i64 },
    Updated { id: i64 },
    Deleted { id: i64 },
    Trashed { id: i64 },
    Untrashed { id: i64 },
    StatusChanged { id: i64, status: String },
}

/// Observer interface for content lifecycle notifications; the explicit
/// replacement for hook-style callback dispatch.
#[async_trait]
pub trait ContentObserver: Send + Sync {
    async fn on_created(&self, id: i64);
    async fn on_updated(&self, id: i64);
    async fn on_deleted(&self, id: i64);
    async fn on_trashed(&self, id: i64);
    async fn on_untrashed(&self, id: i64);
    async fn on_status_changed(&self, id: i64, status: EntityStatus);
}

pub struct Synchronizer {
    index: Arc<dyn SearchIndex>,
    repo: Arc<dyn ContentRepository>,
    schema: Arc<SchemaManager>,
    scheduler: Arc<ResyncScheduler>,
    types: SharedTypes,
    page_size: u32,
}

impl Synchronizer {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        repo: Arc<dyn ContentRepository>,
        schema: Arc<SchemaManager>,
        scheduler: Arc<ResyncScheduler>,
        types: SharedTypes,
        page_size: u32,
    ) -> Self {
        Self {
            index,
            repo,
            schema,
            scheduler,
            types,
            page_size,
        }
    }

    pub fn scheduler(&self) -> &Arc<ResyncScheduler> {
        &self.scheduler
    }

    fn indexable_types(&self) -> Vec<String> {
        self.types.read().unwrap().clone()
    }

    fn is_indexable(&self, kind: &str) -> bool {
        self.types.read().unwrap().iter().any(|t| t == kind)
    }

    /// Dispatch one wire event to the observer methods.
    pub async fn handle(&self, event: ContentEvent) {
        match event {
            ContentEvent::Created { id } => self.on_created(id).await,
            ContentEvent::Updated { id } => self.on_updated(id).await,
            ContentEvent::Deleted { id } => self.on_deleted(id).await,
            ContentEvent::Trashed { id } => self.on_trashed(id).await,
            ContentEvent::Untrashed { id } => self.on_untrashed(id).await,
            ContentEvent::StatusChanged { id, status } => {
                self.on_status_changed(id, EntityStatus::parse(&status)).await
            }
        }
    }

    /// Re-evaluate one entity: upsert when it is published, indexable and
    /// buildable; otherwise make sure it is absent from the index.
    async fn reindex(&self, id: i64) {
        let entity = match self.repo.fetch(id).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                self.remove(id).await;
                return;
            }
            Err(e) => {
                warn!(id, "could not fetch entity, skipping reindex: {}", e);
                return;
            }
        };

        if !entity.status.is_published() || !self.is_indexable(&entity.kind) {
            self.remove(id).await;
            return;
        }

        match build_document(&entity) {
            Some(doc) => self.upsert(doc).await,
            // Unlinkable entities are not indexed
            None => self.remove(id).await,
        }
    }

    async fn upsert(&self, doc: Document) {
        if let Err(e) = self.schema.ensure().await {
            warn!(id = %doc.id, "schema not ready, skipping upsert: {}", e);
            return;
        }
        if let Err(e) = self.index.upsert(&doc).await {
            warn!(id = %doc.id, "index upsert failed: {}", e);
        }
    }

    async fn remove(&self, id: i64) {
        if let Err(e) = self.index.delete(&id.to_string()).await {
            warn!(id, "index delete failed: {}", e);
        }
    }

    /// Swap the indexable kinds. Each removed kind is cleaned out of the
    /// index with one bulk filtered delete, then a coalesced resync is
    /// scheduled to cover everything else.
    pub async fn update_indexable_types(&self, new_types: Vec<String>) {
        let removed: Vec<String> = {
            let current = self.types.read().unwrap();
            current
                .iter()
                .filter(|t| !new_types.contains(t))
                .cloned()
                .collect()
        };

        for kind in removed {
            if let Some(filter) = list_clause("types", std::slice::from_ref(&kind)) {
                info!(kind = %kind, "type no longer indexable, purging documents");
                if let Err(e) = self.index.delete_by_filter(&filter).await {
                    warn!(kind = %kind, "bulk delete failed: {}", e);
                }
            }
        }

        *self.types.write().unwrap() = new_types;
        self.note_config_change();
    }

    /// Any configuration change invalidates the schema memoization and
    /// asks for one debounced full resync.
    pub fn note_config_change(&self) {
        self.schema.reset();
        self.scheduler.schedule();
    }

    /// Full resync: paginate indexable published entities in ID order and
    /// upsert every built document. Idempotent and resumable; a failed
    /// pass is corrected by the next one.
    pub async fn run_resync(&self) -> Result<u64> {
        self.schema
            .ensure()
            .await
            .context("search engine collection is not ready")?;

        let kinds = self.indexable_types();
        let mut indexed = 0u64;
        let mut page = 1u32;
        loop {
            let entities = self
                .repo
                .list_published(&kinds, page, self.page_size)
                .await?;
            let short_page = (entities.len() as u32) < self.page_size;

            for entity in &entities {
                if let Some(doc) = build_document(entity) {
                    let id = doc.id.clone();
                    match self.index.upsert(&doc).await {
                        Ok(()) => indexed += 1,
                        Err(e) => warn!(id = %id, "resync upsert failed: {}", e),
                    }
                }
            }

            if short_page {
                break;
            }
            page += 1;
        }

        info!(indexed, "resync pass complete");
        Ok(indexed)
    }

    /// Administrative backfill: like a resync but batched through the bulk
    /// import endpoint, reporting progress after each flush.
    pub async fn run_backfill(&self, per_page: u32, batch_size: u32) -> Result<u64> {
        self.schema
            .ensure()
            .await
            .context("search engine collection is not ready")?;

        let kinds = self.indexable_types();
        let per_page = per_page.max(1);
        let batch_size = batch_size.max(1) as usize;

        let mut total = 0u64;
        let mut batch: Vec<Document> = Vec::with_capacity(batch_size);
        let mut page = 1u32;
        loop {
            let entities = self.repo.list_published(&kinds, page, per_page).await?;
            let short_page = (entities.len() as u32) < per_page;

            for entity in &entities {
                if let Some(doc) = build_document(entity) {
                    batch.push(doc);
                }
                if batch.len() >= batch_size {
                    let accepted = self.index.import(&batch).await?;
                    total += accepted as u64;
                    batch.clear();
                    info!(total, "indexed {} documents so far", total);
                }
            }

            if short_page {
                break;
            }
            page += 1;
        }

        if !batch.is_empty() {
            let accepted = self.index.import(&batch).await?;
            total += accepted as u64;
        }

        Ok(total)
    }

    /// Poll loop for the serve command: runs scheduled resyncs as their
    /// debounce deadline elapses.
    pub async fn drive(self: Arc<Self>) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            if self.scheduler.pop_due() {
                info!("running scheduled resync");
                if let Err(e) = self.run_resync().await {
                    warn!("scheduled resync failed: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl ContentObserver for Synchronizer {
    async fn on_created(&self, id: i64) {
        self.reindex(id).await;
    }

    async fn on_updated(&self, id: i64) {
        self.reindex(id).await;
    }

    async fn on_deleted(&self, id: i64) {
        self.remove(id).await;
    }

    async fn on_trashed(&self, id: i64) {
        self.remove(id).await;
    }

    async fn on_untrashed(&self, id: i64) {
        self.reindex(id).await;
    }

    async fn on_status_changed(&self, id: i64, status: EntityStatus) {
        if status.is_published() {
            self.reindex(id).await;
        } else {
            self.remove(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::index::memory::MemoryIndex;
    use crate::index::TranslatedQuery;
    use crate::models::{CommerceInfo, ContentEntity};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mutable catalog stub so tests can flip entity state between events.
    struct StubCatalog {
        entities: Mutex<HashMap<i64, ContentEntity>>,
        list_calls: AtomicUsize,
    }

    impl StubCatalog {
        fn new() -> Self {
            Self {
                entities: Mutex::new(HashMap::new()),
                list_calls: AtomicUsize::new(0),
            }
        }

        fn put(&self, entity: ContentEntity) {
            self.entities.lock().unwrap().insert(entity.id, entity);
        }

        fn set_status(&self, id: i64, status: EntityStatus) {
            if let Some(e) = self.entities.lock().unwrap().get_mut(&id) {
                e.status = status;
            }
        }
    }

    #[async_trait]
    impl ContentRepository for StubCatalog {
        async fn list_published(
            &self,
            kinds: &[String],
            page: u32,
            per_page: u32,
        ) -> Result<Vec<ContentEntity>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut entities: Vec<ContentEntity> = self
                .entities
                .lock()
                .unwrap()
                .values()
                .filter(|e| e.status.is_published() && kinds.contains(&e.kind))
                .cloned()
                .collect();
            entities.sort_by_key(|e| e.id);
            let offset = (page.max(1) as usize - 1) * per_page as usize;
            Ok(entities
                .into_iter()
                .skip(offset)
                .take(per_page as usize)
                .collect())
        }

        async fn fetch(&self, id: i64) -> Result<Option<ContentEntity>> {
            Ok(self.entities.lock().unwrap().get(&id).cloned())
        }

        async fn text_search(
            &self,
            _terms: &[String],
            _kinds: &[String],
            _page: u32,
            _per_page: u32,
        ) -> Result<Vec<ContentEntity>> {
            Ok(Vec::new())
        }
    }

    fn entity(id: i64, kind: &str, status: EntityStatus, title: &str) -> ContentEntity {
        ContentEntity {
            id,
            kind: kind.to_string(),
            status,
            title: title.to_string(),
            body: format!("<p>{}</p>", title),
            excerpt: None,
            permalink: Some(format!("https://shop.example/?p={}", id)),
            thumbnail: None,
            author: "author".to_string(),
            comment_count: 0,
            created_at: 1_700_000_000 + id,
            updated_at: 1_700_000_000 + id,
            terms: Vec::new(),
            commerce: None,
        }
    }

    struct Fixture {
        index: Arc<MemoryIndex>,
        repo: Arc<StubCatalog>,
        sync: Synchronizer,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let index = Arc::new(MemoryIndex::new());
        let repo = Arc::new(StubCatalog::new());
        let clock = Arc::new(ManualClock::new());
        let schema = Arc::new(SchemaManager::new(index.clone(), "site_content"));
        let scheduler = Arc::new(ResyncScheduler::new(Duration::from_secs(5), clock.clone()));
        let types = Arc::new(RwLock::new(vec![
            "post".to_string(),
            "product".to_string(),
        ]));
        let sync = Synchronizer::new(
            index.clone(),
            repo.clone(),
            schema,
            scheduler,
            types,
            100,
        );
        Fixture {
            index,
            repo,
            sync,
            clock,
        }
    }

    async fn search_title(index: &MemoryIndex, needle: &str) -> Vec<String> {
        let query = TranslatedQuery {
            query_text: needle.to_string(),
            filter_expression: String::new(),
            sort_expression: String::new(),
            page: 1,
            per_page: 50,
        };
        index
            .search(&query, "", "")
            .await
            .map(|page| page.hits.iter().map(|h| h.document.id.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_upserting_same_entity_twice_keeps_one_document() {
        let f = fixture();
        f.repo
            .put(entity(7, "post", EntityStatus::Published, "Alpha"));

        f.sync.on_created(7).await;
        f.sync.on_updated(7).await;

        assert_eq!(f.index.document_count(), 1);
        assert!(f.index.get("7").is_some());
    }

    #[tokio::test]
    async fn test_draft_then_published_then_draft_scenario() {
        let f = fixture();
        f.repo
            .put(entity(42, "product", EntityStatus::Draft, "Red Lamp"));

        // Draft entities are never indexed
        f.sync.on_created(42).await;
        assert!(f.index.get("42").is_none());

        // Publish: the title becomes searchable
        f.repo.set_status(42, EntityStatus::Published);
        f.sync
            .on_status_changed(42, EntityStatus::Published)
            .await;
        assert_eq!(search_title(&f.index, "Red Lamp").await, vec!["42"]);

        // Back to draft: gone from results
        f.repo.set_status(42, EntityStatus::Draft);
        f.sync.on_status_changed(42, EntityStatus::Draft).await;
        assert!(search_title(&f.index, "Red Lamp").await.is_empty());
    }

    #[tokio::test]
    async fn test_unpublish_invokes_delete_exactly_once() {
        let f = fixture();
        f.repo
            .put(entity(9, "post", EntityStatus::Published, "Beta"));
        f.sync.on_created(9).await;
        assert_eq!(f.index.delete_count(), 0);

        f.repo.set_status(9, EntityStatus::Draft);
        f.sync.on_status_changed(9, EntityStatus::Draft).await;
        assert_eq!(f.index.delete_count(), 1);
        assert!(f.index.get("9").is_none());
    }

    #[tokio::test]
    async fn test_non_indexable_kind_is_removed_not_upserted() {
        let f = fixture();
        f.repo
            .put(entity(5, "attachment", EntityStatus::Published, "Photo"));
        f.sync.on_created(5).await;
        assert_eq!(f.index.document_count(), 0);
    }

    #[tokio::test]
    async fn test_trash_and_delete_remove_document() {
        let f = fixture();
        f.repo
            .put(entity(3, "post", EntityStatus::Published, "Gamma"));
        f.sync.on_created(3).await;
        assert!(f.index.get("3").is_some());

        f.sync.on_trashed(3).await;
        assert!(f.index.get("3").is_none());

        // Untrash re-runs the create/update logic
        f.sync.on_untrashed(3).await;
        assert!(f.index.get("3").is_some());

        f.sync.on_deleted(3).await;
        assert!(f.index.get("3").is_none());
    }

    #[tokio::test]
    async fn test_removing_type_bulk_deletes_and_schedules_resync() {
        let f = fixture();
        f.repo
            .put(entity(1, "post", EntityStatus::Published, "Alpha"));
        f.repo
            .put(entity(2, "product", EntityStatus::Published, "Lamp"));
        f.sync.on_created(1).await;
        f.sync.on_created(2).await;
        assert_eq!(f.index.document_count(), 2);

        f.sync
            .update_indexable_types(vec!["post".to_string()])
            .await;

        // One bulk delete cleaned the products out; posts survive
        assert!(f.index.get("2").is_none());
        assert!(f.index.get("1").is_some());
        assert_eq!(f.index.delete_count(), 0);
        assert!(f.sync.scheduler().is_pending());

        f.clock.advance(Duration::from_secs(6));
        assert!(f.sync.scheduler().pop_due());
    }

    #[tokio::test]
    async fn test_resync_paginates_until_short_page() {
        let f = fixture();
        for id in 1..=250 {
            f.repo
                .put(entity(id, "post", EntityStatus::Published, "Doc"));
        }

        let indexed = f.sync.run_resync().await.unwrap();
        assert_eq!(indexed, 250);
        assert_eq!(f.index.document_count(), 250);
        // Pages of 100: two full pages plus the terminating short page
        assert_eq!(f.repo.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backfill_flushes_full_batches_and_remainder() {
        let f = fixture();
        for id in 1..=100 {
            f.repo
                .put(entity(id, "product", EntityStatus::Published, "Lamp"));
        }

        let total = f.sync.run_backfill(100, 40).await.unwrap();
        assert_eq!(total, 100);
        assert_eq!(f.index.document_count(), 100);
        // Two full batches of 40 and one final flush of 20
        assert_eq!(f.index.import_count(), 3);
    }

    #[tokio::test]
    async fn test_index_outage_never_fails_the_event_and_resync_recovers() {
        let f = fixture();
        f.repo
            .put(entity(11, "post", EntityStatus::Published, "Delta"));

        f.index.set_available(false);
        // Fire-and-forget: the event completes despite the outage
        f.sync.on_created(11).await;
        assert_eq!(f.index.document_count(), 0);

        f.index.set_available(true);
        f.sync.run_resync().await.unwrap();
        assert!(f.index.get("11").is_some());
    }

    #[tokio::test]
    async fn test_entity_without_permalink_is_not_indexed() {
        let f = fixture();
        let mut e = entity(13, "post", EntityStatus::Published, "Unlinkable");
        e.permalink = None;
        f.repo.put(e);

        f.sync.on_created(13).await;
        assert!(f.index.get("13").is_none());
    }

    #[tokio::test]
    async fn test_commerce_popularity_flows_into_index() {
        let f = fixture();
        let mut e = entity(21, "product", EntityStatus::Published, "Lamp");
        e.commerce = Some(CommerceInfo {
            sku: "L-21".to_string(),
            price: 10.0,
            image: None,
            sales: 10,
            reviews: 5,
            avg_rating: 4.0,
        });
        f.repo.put(e);

        f.sync.on_created(21).await;
        assert_eq!(f.index.get("21").unwrap().popularity, 15.8);
    }
}
