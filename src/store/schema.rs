//! Additive schema creation. Every statement is `CREATE TABLE IF NOT EXISTS`; future
//! columns are added with `ALTER TABLE ... ADD COLUMN`, never a destructive migration.

use sqlx::SqlitePool;

pub async fn create_if_missing(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            org_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            ledger INTEGER,
            tx_hash TEXT NOT NULL,
            observed_at INTEGER NOT NULL,
            verified INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_events_dedup ON events (tx_hash, kind, org_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_events_org_listing ON events (org_id, ledger DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_unverified ON events (verified, id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orgs (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            admin TEXT NOT NULL,
            open_membership INTEGER NOT NULL,
            members_can_propose INTEGER NOT NULL,
            metadata_ref TEXT,
            member_count INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
