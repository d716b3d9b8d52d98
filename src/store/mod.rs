//! Embedded relational storage: events, orgs, metadata.
//!
//! Backed by SQLite through `sqlx`. Writes go through a pool capped at a single
//! connection so the single-writer requirement is structural rather than
//! advisory. Reads go through a second, separate multi-connection pool against
//! the same database so `list_events`/`get_org`/etc. run concurrently with each
//! other and are never queued behind a write.

mod models;
mod schema;

pub use models::{EventRow, OrgRow};

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace, warn};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;

const READER_POOL_CONNECTIONS: u32 = 4;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

type Result<T> = std::result::Result<T, StoreError>;

pub struct AddEventOutcome {
    pub inserted: bool,
    pub id: Option<i64>,
}

pub struct Store {
    write_pool: SqlitePool,
    read_pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `path`, runs the additive
    /// schema creation statements against the write pool, and opens a second,
    /// multi-connection read pool against the same file.
    pub async fn open(path: &str) -> Result<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let write_pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
        schema::create_if_missing(&write_pool).await?;
        let read_pool = SqlitePoolOptions::new()
            .max_connections(READER_POOL_CONNECTIONS)
            .connect(&url)
            .await?;
        debug!("store opened at {path}");
        Ok(Self { write_pool, read_pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        // A named, shared-cache in-memory database so the write pool and the
        // read pool see the same data; a bare "sqlite::memory:" would give each
        // connection its own private database.
        let url = format!("sqlite:file:relayer_test_{id}?mode=memory&cache=shared");
        let write_pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
        schema::create_if_missing(&write_pool).await?;
        let read_pool = SqlitePoolOptions::new()
            .max_connections(READER_POOL_CONNECTIONS)
            .connect(&url)
            .await?;
        Ok(Self { write_pool, read_pool })
    }

    /// Inserts an event row; returns `duplicate` iff `(tx_hash, kind, org_id)` already exists.
    pub async fn add_event(
        &self,
        kind: &str,
        org_id: u64,
        payload: &serde_json::Value,
        ledger: Option<u64>,
        tx_hash: &str,
        verified: bool,
    ) -> Result<AddEventOutcome> {
        let mut tx = self.write_pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM events WHERE tx_hash = ? AND kind = ? AND org_id = ?")
            .bind(tx_hash)
            .bind(kind)
            .bind(org_id as i64)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = existing {
            trace!("add_event: duplicate for tx_hash={tx_hash} kind={kind} org_id={org_id}");
            return Ok(AddEventOutcome {
                inserted: false,
                id: Some(row.get::<i64, _>("id")),
            });
        }

        let payload_text = serde_json::to_string(payload).map_err(|e| StoreError::Conflict(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO events (org_id, kind, payload, ledger, tx_hash, observed_at, verified) \
             VALUES (?, ?, ?, ?, ?, strftime('%s','now'), ?)",
        )
        .bind(org_id as i64)
        .bind(kind)
        .bind(payload_text)
        .bind(ledger.map(|l| l as i64))
        .bind(tx_hash)
        .bind(verified)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AddEventOutcome {
            inserted: true,
            id: Some(result.last_insert_rowid()),
        })
    }

    /// Shorthand for `add_event(..., verified=false, ledger=None)`.
    pub async fn add_pending_event(
        &self,
        org_id: u64,
        kind: &str,
        payload: &serde_json::Value,
        tx_hash: &str,
    ) -> Result<AddEventOutcome> {
        self.add_event(kind, org_id, payload, None, tx_hash, false).await
    }

    /// Sets `verified=true` and fills `ledger` for every row matching `tx_hash`.
    pub async fn mark_verified(&self, tx_hash: &str, ledger: u64) -> Result<u64> {
        let result = sqlx::query("UPDATE events SET verified = 1, ledger = ? WHERE tx_hash = ?")
            .bind(ledger as i64)
            .bind(tx_hash)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes every `verified=false` row matching `tx_hash`.
    pub async fn delete_pending(&self, tx_hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE tx_hash = ? AND verified = 0")
            .bind(tx_hash)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Lists events for an org, newest-first by `(ledger desc, id desc)`, capped at 100.
    pub async fn list_events(
        &self,
        org_id: u64,
        kinds: Option<&[String]>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<EventRow>, u64)> {
        let capped_limit = limit.min(100);

        let rows = if let Some(kinds) = kinds {
            if kinds.is_empty() {
                Vec::new()
            } else {
                let placeholders = kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let query = format!(
                    "SELECT id, org_id, kind, payload, ledger, tx_hash, observed_at, verified \
                     FROM events WHERE org_id = ? AND kind IN ({placeholders}) \
                     ORDER BY ledger DESC, id DESC LIMIT ? OFFSET ?"
                );
                let mut builder = sqlx::query(&query).bind(org_id as i64);
                for kind in kinds {
                    builder = builder.bind(kind);
                }
                builder
                    .bind(capped_limit as i64)
                    .bind(offset as i64)
                    .fetch_all(&self.read_pool)
                    .await?
                    .into_iter()
                    .map(models::event_from_row)
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        } else {
            sqlx::query(
                "SELECT id, org_id, kind, payload, ledger, tx_hash, observed_at, verified \
                 FROM events WHERE org_id = ? ORDER BY ledger DESC, id DESC LIMIT ? OFFSET ?",
            )
            .bind(org_id as i64)
            .bind(capped_limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.read_pool)
            .await?
            .into_iter()
            .map(models::event_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let total: i64 = sqlx::query("SELECT COUNT(*) as c FROM events WHERE org_id = ?")
            .bind(org_id as i64)
            .fetch_one(&self.read_pool)
            .await?
            .get("c");

        Ok((rows, total as u64))
    }

    /// Fetches up to `limit` unverified rows, oldest-first, for the Indexer's verify loop.
    pub async fn list_unverified(&self, limit: u32) -> Result<Vec<EventRow>> {
        sqlx::query(
            "SELECT id, org_id, kind, payload, ledger, tx_hash, observed_at, verified \
             FROM events WHERE verified = 0 ORDER BY id ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.read_pool)
        .await?
        .into_iter()
        .map(models::event_from_row)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::from)
    }

    pub async fn upsert_org(&self, row: &OrgRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO orgs (id, name, admin, open_membership, members_can_propose, metadata_ref, member_count, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, strftime('%s','now')) \
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, admin=excluded.admin, \
             open_membership=excluded.open_membership, members_can_propose=excluded.members_can_propose, \
             metadata_ref=excluded.metadata_ref, member_count=excluded.member_count, updated_at=excluded.updated_at",
        )
        .bind(row.id as i64)
        .bind(&row.name)
        .bind(&row.admin)
        .bind(row.open_membership)
        .bind(row.members_can_propose)
        .bind(&row.metadata_ref)
        .bind(row.member_count as i64)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    /// Upserts every row in a single transaction.
    pub async fn upsert_orgs(&self, rows: &[OrgRow]) -> Result<()> {
        let mut tx = self.write_pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO orgs (id, name, admin, open_membership, members_can_propose, metadata_ref, member_count, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, strftime('%s','now')) \
                 ON CONFLICT(id) DO UPDATE SET name=excluded.name, admin=excluded.admin, \
                 open_membership=excluded.open_membership, members_can_propose=excluded.members_can_propose, \
                 metadata_ref=excluded.metadata_ref, member_count=excluded.member_count, updated_at=excluded.updated_at",
            )
            .bind(row.id as i64)
            .bind(&row.name)
            .bind(&row.admin)
            .bind(row.open_membership)
            .bind(row.members_can_propose)
            .bind(&row.metadata_ref)
            .bind(row.member_count as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_org(&self, id: u64) -> Result<Option<OrgRow>> {
        let row = sqlx::query(
            "SELECT id, name, admin, open_membership, members_can_propose, metadata_ref, member_count, updated_at \
             FROM orgs WHERE id = ?",
        )
        .bind(id as i64)
        .fetch_optional(&self.read_pool)
        .await?;
        row.map(models::org_from_row).transpose().map_err(StoreError::from)
    }

    pub async fn list_orgs(&self) -> Result<Vec<OrgRow>> {
        sqlx::query(
            "SELECT id, name, admin, open_membership, members_can_propose, metadata_ref, member_count, updated_at \
             FROM orgs ORDER BY id ASC",
        )
        .fetch_all(&self.read_pool)
        .await?
        .into_iter()
        .map(models::org_from_row)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::from)
    }

    pub async fn total_events_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as c FROM events")
            .fetch_one(&self.read_pool)
            .await?
            .get("c");
        Ok(count as u64)
    }

    pub async fn orgs_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as c FROM orgs")
            .fetch_one(&self.read_pool)
            .await?
            .get("c");
        Ok(count as u64)
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.read_pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO metadata (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    /// Convenience wrapper around the `last_ledger` watermark, refusing to move it backward.
    pub async fn advance_watermark(&self, new_value: u64) -> Result<()> {
        let current = self
            .get_meta("last_ledger")
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if new_value < current {
            warn!("ignoring attempt to move watermark backward: {current} -> {new_value}");
            return Ok(());
        }
        self.set_meta("last_ledger", &new_value.to_string()).await
    }

    /// The unix timestamp of the most recent completed org registry sync, as
    /// recorded by the Syncer under the `last_org_sync` metadata key. `None`
    /// if no org sync has completed yet.
    pub async fn orgs_snapshot_time(&self) -> Result<Option<i64>> {
        Ok(self.get_meta("last_org_sync").await?.and_then(|v| v.parse::<i64>().ok()))
    }
}
