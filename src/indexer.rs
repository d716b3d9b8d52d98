//! Event polling loop, parsing, dedup and the notify/verify state machine.
//!
//! ```text
//! client notify ───► pending ──► (poll_tx success) ──► canonical (verified=true)
//!                       │
//!                       └────── (poll_tx failed) ───► deleted
//! chain poll ──► canonical (verified=true, inserted directly)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, trace, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::interval;

use crate::chain_client::{ChainClient, ChainClientError, RawEvent, TxStatus};
use crate::store::{Store, StoreError};
use crate::syncer::Syncer;

const VERIFY_BATCH_SIZE: u32 = 10;
const MEMBERSHIP_MUTATING_KINDS: [&str; 4] =
    ["member-add", "member-revoke", "member-join", "member-leave"];

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("tx_hash must be 64 hex characters")]
    InvalidTxHash,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Translates a raw event's first topic into one of the closed set of canonical kinds.
/// Unrecognized topics pass through unchanged; the Store does not reject unknown kinds,
/// it simply treats them as an opaque key/value payload at the application layer.
fn translate_kind(raw_topic: &str) -> String {
    let table: HashMap<&str, &str> = HashMap::from([
        ("org_created", "organization-create"),
        ("member_added", "member-add"),
        ("member_revoked", "member-revoke"),
        ("proposal_created", "proposal-create"),
        ("proposal_closed", "proposal-close"),
        ("vote_cast", "vote-cast"),
        ("comment_posted", "comment-anonymous-create"),
    ]);
    table.get(raw_topic).map(|s| s.to_string()).unwrap_or_else(|| raw_topic.to_string())
}

struct ParsedEvent {
    kind: String,
    org_id: u64,
    payload: Value,
}

/// Parses a raw event's topics/value. The first topic names the kind; the second,
/// if present and numeric, is the org id. Parse failures return `None` and are
/// logged by the caller; they never block the watermark.
fn parse_event(raw: &RawEvent) -> Option<ParsedEvent> {
    let kind_topic = raw.topics.first()?;
    let kind = translate_kind(kind_topic);

    let org_id = raw
        .topics
        .get(1)
        .and_then(|topic| topic.parse::<u64>().ok())
        .unwrap_or(0);

    Some(ParsedEvent {
        kind,
        org_id,
        payload: raw.value.clone(),
    })
}

pub struct IndexerStatus {
    pub running: bool,
    pub watermark: u64,
    pub total_events: u64,
    pub org_count: u64,
}

pub struct Indexer {
    store: Arc<Store>,
    chain: Arc<ChainClient>,
    contract_ids: Vec<String>,
    poll_interval: Duration,
}

impl Indexer {
    pub fn new(store: Arc<Store>, chain: Arc<ChainClient>, contract_ids: Vec<String>, poll_interval: Duration) -> Self {
        Self {
            store,
            chain,
            contract_ids,
            poll_interval,
        }
    }

    /// Client-facing notify: inserts a pending event. `tx_hash` must be 64 hex chars.
    pub async fn notify_event(
        &self,
        org_id: u64,
        kind: &str,
        payload: Value,
        tx_hash: &str,
    ) -> Result<(), IndexerError> {
        if tx_hash.len() != 64 || !tx_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IndexerError::InvalidTxHash);
        }
        self.store.add_pending_event(org_id, kind, &payload, tx_hash).await?;
        Ok(())
    }

    /// Operator tooling: inserts a verified event with a synthetic tx hash.
    pub async fn add_manual_event(&self, org_id: u64, kind: &str, payload: Value) -> Result<(), IndexerError> {
        let tx_hash = format!("synthetic:manual:{org_id}:{kind}:{}", chrono::Utc::now().timestamp_millis());
        self.store.add_event(kind, org_id, &payload, Some(0), &tx_hash, true).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<IndexerStatus, StoreError> {
        let watermark = self
            .store
            .get_meta("last_ledger")
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let total_events = self.store.total_events_count().await?;
        let org_count = self.store.orgs_count().await?;
        Ok(IndexerStatus {
            running: true,
            watermark,
            total_events,
            org_count,
        })
    }

    /// Runs the poll loop and the verify loop on the same tick until `shutdown` fires.
    /// `syncer` is used to trigger membership refreshes for membership-mutating kinds.
    pub async fn run(self: Arc<Self>, syncer: Arc<Syncer>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("indexer loop shutting down");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.poll_tick().await;
                    self.verify_tick(&syncer).await;
                }
            }
        }
    }

    /// Runs one poll pass: fetch new chain events past the watermark and insert
    /// them. Public so operators (and tests) can trigger a single pass directly.
    pub async fn poll_tick(&self) {
        let watermark = match self.store.get_meta("last_ledger").await {
            Ok(value) => value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0),
            Err(err) => {
                error!("indexer: failed to read watermark: {err}");
                return;
            }
        };

        let latest = match self.chain.latest_ledger().await {
            Ok(seq) => seq,
            Err(err) => {
                warn!("indexer: latest_ledger failed, will retry next tick: {err}");
                return;
            }
        };

        if latest <= watermark {
            return;
        }

        let events = match self
            .chain
            .get_events(&self.contract_ids, watermark, latest, 100)
            .await
        {
            Ok(events) => events,
            Err(ChainClientError::Rejected(msg)) if msg.to_lowercase().contains("not found") => {
                warn!("indexer: contract not found, suppressing: {msg}");
                Vec::new()
            }
            Err(err) => {
                warn!("indexer: get_events failed, watermark held at {watermark}: {err}");
                return;
            }
        };

        for raw in &events {
            let Some(parsed) = parse_event(raw) else {
                warn!("indexer: failed to parse event from contract {}", raw.contract_id);
                continue;
            };
            if raw.tx_hash.is_empty() {
                warn!("indexer: event from contract {} carries no tx_hash, skipping", raw.contract_id);
                continue;
            }
            if let Err(err) = self
                .store
                .add_event(&parsed.kind, parsed.org_id, &parsed.payload, Some(raw.ledger), &raw.tx_hash, true)
                .await
            {
                warn!("indexer: failed to insert event, skipping: {err}");
            }
        }

        if let Err(err) = self.store.advance_watermark(latest).await {
            error!("indexer: failed to advance watermark: {err}");
        }
    }

    /// Runs one verify pass over currently-unverified rows. Public so operators
    /// (and tests) can trigger a single pass without waiting on the poll interval.
    pub async fn verify_tick(&self, syncer: &Arc<Syncer>) {
        let pending = match self.store.list_unverified(VERIFY_BATCH_SIZE).await {
            Ok(rows) => rows,
            Err(err) => {
                error!("indexer: failed to list unverified rows: {err}");
                return;
            }
        };

        for row in pending {
            match self.chain.poll_tx(&row.tx_hash).await {
                Ok(TxStatus::Success { ledger }) => {
                    if let Err(err) = self.store.mark_verified(&row.tx_hash, ledger).await {
                        error!("indexer: failed to mark verified: {err}");
                        continue;
                    }
                    if MEMBERSHIP_MUTATING_KINDS.contains(&row.kind.as_str()) {
                        syncer.refresh_member(row.org_id).await;
                    }
                }
                Ok(TxStatus::Failed { reason }) => {
                    trace!("indexer: tx {} failed on chain: {reason}", row.tx_hash);
                    if let Err(err) = self.store.delete_pending(&row.tx_hash).await {
                        error!("indexer: failed to delete failed pending row: {err}");
                    }
                }
                Ok(TxStatus::NotFound) => {
                    // leave it; retried next tick
                }
                Err(err) => {
                    warn!("indexer: poll_tx failed for {}: {err}", row.tx_hash);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_kind_maps_known_topics() {
        assert_eq!(translate_kind("vote_cast"), "vote-cast");
        assert_eq!(translate_kind("member_added"), "member-add");
    }

    #[test]
    fn translate_kind_passes_through_unknown_topics() {
        assert_eq!(translate_kind("something_custom"), "something_custom");
    }

    #[test]
    fn parse_event_extracts_org_id_from_second_topic() {
        let raw = RawEvent {
            contract_id: "C1".into(),
            ledger: 10,
            tx_hash: "ab".repeat(32),
            topics: vec!["vote_cast".into(), "42".into()],
            value: Value::Null,
        };
        let parsed = parse_event(&raw).unwrap();
        assert_eq!(parsed.kind, "vote-cast");
        assert_eq!(parsed.org_id, 42);
    }

    #[test]
    fn parse_event_defaults_org_id_when_second_topic_missing_or_non_numeric() {
        let raw = RawEvent {
            contract_id: "C1".into(),
            ledger: 10,
            tx_hash: "cd".repeat(32),
            topics: vec!["vote_cast".into()],
            value: Value::Null,
        };
        assert_eq!(parse_event(&raw).unwrap().org_id, 0);
    }
}
