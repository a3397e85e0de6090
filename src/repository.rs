//! Read-only access to the content catalog.
//!
//! The catalog is owned and mutated by the content repository; this crate
//! only enumerates and fetches entities through the [`ContentRepository`]
//! seam. [`SqliteCatalog`] is the bundled adapter for catalogs reachable
//! as a SQLite database, and also provides the native text match the
//! fallback search runs on.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{CommerceInfo, ContentEntity, EntityStatus, TaxonomyTerm};

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Published entities of the given kinds, ID-ordered, 1-based pages.
    async fn list_published(
        &self,
        kinds: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ContentEntity>>;

    async fn fetch(&self, id: i64) -> Result<Option<ContentEntity>>;

    /// Whether the repository can run a native text match at all. When
    /// false, the fallback search reports itself unavailable instead of
    /// erroring.
    fn supports_search(&self) -> bool {
        true
    }

    /// Native text match over title/body/excerpt; any term may match.
    /// Ordered by engagement (descending), then id.
    async fn text_search(
        &self,
        terms: &[String],
        kinds: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ContentEntity>>;
}

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn hydrate(&self, row: &sqlx::sqlite::SqliteRow) -> Result<ContentEntity> {
        let id: i64 = row.get("id");

        let term_rows = sqlx::query(
            "SELECT taxonomy, slug, hierarchical FROM entity_terms WHERE entity_id = ? ORDER BY taxonomy, slug",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let terms = term_rows
            .iter()
            .map(|t| TaxonomyTerm {
                taxonomy: t.get("taxonomy"),
                slug: t.get("slug"),
                hierarchical: t.get::<i64, _>("hierarchical") != 0,
            })
            .collect();

        let commerce_row = sqlx::query(
            "SELECT sku, price, image, sales, reviews, avg_rating FROM commerce WHERE entity_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let commerce = commerce_row.map(|c| CommerceInfo {
            sku: c.get("sku"),
            price: c.get("price"),
            image: c.get("image"),
            sales: c.get("sales"),
            reviews: c.get("reviews"),
            avg_rating: c.get("avg_rating"),
        });

        let status: String = row.get("status");
        Ok(ContentEntity {
            id,
            kind: row.get("kind"),
            status: EntityStatus::parse(&status),
            title: row.get("title"),
            body: row.get("body"),
            excerpt: row.get("excerpt"),
            permalink: row.get("permalink"),
            thumbnail: row.get("thumbnail"),
            author: row.get("author"),
            comment_count: row.get("comment_count"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            terms,
            commerce,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Escape LIKE wildcards so query terms match literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl ContentRepository for SqliteCatalog {
    async fn list_published(
        &self,
        kinds: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ContentEntity>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM entities WHERE status = 'publish' AND kind IN ({}) \
             ORDER BY id ASC LIMIT ? OFFSET ?",
            placeholders(kinds.len())
        );
        let mut query = sqlx::query(&sql);
        for kind in kinds {
            query = query.bind(kind);
        }
        let offset = (page.max(1) as i64 - 1) * per_page as i64;
        let rows = query
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(self.hydrate(row).await?);
        }
        Ok(entities)
    }

    async fn fetch(&self, id: i64) -> Result<Option<ContentEntity>> {
        let row = sqlx::query("SELECT * FROM entities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn text_search(
        &self,
        terms: &[String],
        kinds: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ContentEntity>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let terms: Vec<&String> = terms.iter().filter(|t| !t.trim().is_empty()).collect();

        let mut sql = format!(
            "SELECT * FROM entities WHERE status = 'publish' AND kind IN ({})",
            placeholders(kinds.len())
        );
        if !terms.is_empty() {
            let term_clause = vec![
                "(title LIKE ? ESCAPE '\\' OR body LIKE ? ESCAPE '\\' \
                 OR COALESCE(excerpt, '') LIKE ? ESCAPE '\\')";
                terms.len()
            ]
            .join(" OR ");
            sql.push_str(&format!(" AND ({})", term_clause));
        }
        sql.push_str(" ORDER BY comment_count DESC, id ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        for kind in kinds {
            query = query.bind(kind);
        }
        for term in &terms {
            let pattern = like_pattern(term);
            query = query.bind(pattern.clone()).bind(pattern.clone()).bind(pattern);
        }
        let offset = (page.max(1) as i64 - 1) * per_page as i64;
        let rows = query
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(self.hydrate(row).await?);
        }
        Ok(entities)
    }
}
