use anyhow::Result;
use sqlx::SqlitePool;

/// Create the catalog schema used by the bundled SQLite adapter. The
/// catalog itself is owned and mutated by the content repository; this
/// exists so `usearch init` and the tests can stand one up. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            excerpt TEXT,
            permalink TEXT,
            thumbnail TEXT,
            author TEXT NOT NULL DEFAULT '',
            comment_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_terms (
            entity_id INTEGER NOT NULL,
            taxonomy TEXT NOT NULL,
            slug TEXT NOT NULL,
            hierarchical INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (entity_id, taxonomy, slug),
            FOREIGN KEY (entity_id) REFERENCES entities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commerce (
            entity_id INTEGER PRIMARY KEY,
            sku TEXT NOT NULL DEFAULT '',
            price REAL NOT NULL DEFAULT 0,
            image TEXT,
            sales INTEGER NOT NULL DEFAULT 0,
            reviews INTEGER NOT NULL DEFAULT 0,
            avg_rating REAL NOT NULL DEFAULT 0,
            FOREIGN KEY (entity_id) REFERENCES entities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_kind_status ON entities(kind, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entity_terms_entity ON entity_terms(entity_id)")
        .execute(pool)
        .await?;

    Ok(())
}
