use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Commitment headers
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commitments (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            short_name TEXT NOT NULL,
            category TEXT NOT NULL,
            text TEXT NOT NULL,
            target_date TEXT,
            target_value TEXT,
            responsible_agency TEXT,
            status TEXT NOT NULL DEFAULT 'tracking',
            source_document_id TEXT,
            source_term INTEGER,
            source_session_period INTEGER,
            source_ey_number TEXT,
            source_url TEXT,
            created_at INTEGER NOT NULL,
            last_updated INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only tracking log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracking_records (
            commitment_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            date TEXT NOT NULL,
            record_type TEXT NOT NULL,
            summary TEXT NOT NULL,
            source_ref TEXT,
            new_status TEXT,
            PRIMARY KEY (commitment_id, seq),
            FOREIGN KEY (commitment_id) REFERENCES commitments(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commitments_status ON commitments(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commitments_category ON commitments(category)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_commitments_source_doc ON commitments(source_document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commitments_title ON commitments(title)")
        .execute(pool)
        .await?;

    Ok(())
}
