//! Org and membership reconciliation loops, plus on-demand triggers from the Indexer.
//!
//! Uses only read-only view calls; never sends transactions. Transient failures
//! during a sweep are logged and the sweep continues to the next org.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::interval;

use crate::cache::{MembershipCache, OrgCache};
use crate::chain_client::ChainClient;
use crate::store::{OrgRow, Store};

const MEMBERSHIP_PAGE_SIZE: u32 = 50;

#[derive(Deserialize)]
struct OrgView {
    name: String,
    admin: String,
    open_membership: bool,
    members_can_propose: bool,
    metadata_ref: Option<String>,
    member_count: u64,
}

#[derive(Deserialize)]
struct MembersPage {
    members: Vec<String>,
}

pub struct Syncer {
    store: Arc<Store>,
    chain: Arc<ChainClient>,
    org_cache: Arc<OrgCache>,
    membership_cache: Arc<MembershipCache>,
    registry_contract_id: Option<String>,
    membership_contract_id: Option<String>,
    org_sync_interval: Duration,
    membership_sync_interval: Duration,
}

impl Syncer {
    pub fn new(
        store: Arc<Store>,
        chain: Arc<ChainClient>,
        org_cache: Arc<OrgCache>,
        membership_cache: Arc<MembershipCache>,
        registry_contract_id: Option<String>,
        membership_contract_id: Option<String>,
        org_sync_interval: Duration,
        membership_sync_interval: Duration,
    ) -> Self {
        Self {
            store,
            chain,
            org_cache,
            membership_cache,
            registry_contract_id,
            membership_contract_id,
            org_sync_interval,
            membership_sync_interval,
        }
    }

    pub async fn run_org_sync(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.org_sync_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("org sync loop shutting down");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.sync_orgs().await;
                }
            }
        }
    }

    pub async fn run_membership_sync(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.membership_sync_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("membership sync loop shutting down");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.sync_all_memberships().await;
                }
            }
        }
    }

    /// Calls the registry contract's `count` and `get(i)` views, upserts rows in a
    /// single transaction, and synthesizes any missing organization-create events.
    async fn sync_orgs(&self) {
        let Some(registry_contract_id) = self.registry_contract_id.as_ref() else {
            return;
        };

        let count = match self.chain.call_view(registry_contract_id, "count", &json!({})).await {
            Ok(value) => value.as_u64().unwrap_or(0),
            Err(err) => {
                warn!("syncer: registry count failed: {err}");
                return;
            }
        };

        let mut rows = Vec::with_capacity(count as usize);
        for id in 1..=count {
            match self.chain.call_view(registry_contract_id, "get", &json!({ "id": id })).await {
                Ok(value) => match serde_json::from_value::<OrgView>(value) {
                    Ok(view) => rows.push(OrgRow {
                        id,
                        name: view.name,
                        admin: view.admin,
                        open_membership: view.open_membership,
                        members_can_propose: view.members_can_propose,
                        metadata_ref: view.metadata_ref,
                        member_count: view.member_count,
                    }),
                    Err(err) => warn!("syncer: failed to decode org {id}: {err}"),
                },
                Err(err) => {
                    warn!("syncer: failed to fetch org {id}, continuing sweep: {err}");
                }
            }
        }

        if let Err(err) = self.store.upsert_orgs(&rows).await {
            warn!("syncer: upsert_orgs failed: {err}");
            return;
        }

        if let Err(err) = self.store.set_meta("last_org_sync", &chrono::Utc::now().timestamp().to_string()).await {
            warn!("syncer: failed to record last_org_sync: {err}");
        }

        self.synthesize_missing_org_events(&rows).await;
        self.org_cache.replace_all(rows);
    }

    /// Backfills an organization-create event for any org row that has no
    /// corresponding event yet; dedup on `(tx_hash, kind, org_id)` prevents doubles.
    async fn synthesize_missing_org_events(&self, rows: &[OrgRow]) {
        for row in rows {
            let tx_hash = format!("synthetic:org:{}", row.id);
            let payload = json!({ "synthetic": true, "name": row.name, "admin": row.admin });
            match self
                .store
                .add_event("organization-create", row.id, &payload, Some(0), &tx_hash, true)
                .await
            {
                Ok(outcome) if outcome.inserted => {
                    debug!("syncer: synthesized organization-create event for org {}", row.id);
                }
                Ok(_) => {}
                Err(err) => warn!("syncer: failed to synthesize org event for {}: {err}", row.id),
            }
        }
    }

    /// For each cached org, pages through `get_members(org_id, offset, limit=50)`
    /// until a short page, then swaps the assembled set into the MembershipCache.
    async fn sync_all_memberships(&self) {
        let orgs: Vec<u64> = self.org_cache.snapshot().keys().copied().collect();
        for org_id in orgs {
            self.refresh_member(org_id).await;
        }
    }

    /// Re-fetches a single org's membership set and swaps it into the cache.
    /// Idempotent: safe to call concurrently with the periodic sweep.
    pub async fn refresh_member(&self, org_id: u64) {
        let Some(membership_contract_id) = self.membership_contract_id.as_ref() else {
            return;
        };

        let mut members = HashSet::new();
        let mut offset = 0u32;
        loop {
            let page = match self
                .chain
                .call_view(
                    membership_contract_id,
                    "get_members",
                    &json!({ "org_id": org_id, "offset": offset, "limit": MEMBERSHIP_PAGE_SIZE }),
                )
                .await
            {
                Ok(value) => match serde_json::from_value::<MembersPage>(value) {
                    Ok(page) => page,
                    Err(err) => {
                        warn!("syncer: failed to decode membership page for org {org_id}: {err}");
                        return;
                    }
                },
                Err(err) => {
                    warn!("syncer: membership fetch failed for org {org_id}, leaving cache unchanged: {err}");
                    return;
                }
            };

            let page_len = page.members.len();
            members.extend(page.members);

            if page_len < MEMBERSHIP_PAGE_SIZE as usize {
                break;
            }
            offset += MEMBERSHIP_PAGE_SIZE;
        }

        let admin = self.org_cache.get(org_id).map(|org| org.admin);
        self.membership_cache.replace_org_members(org_id, members, admin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_view_decodes_from_json() {
        let value = json!({
            "name": "org-1",
            "admin": "addr",
            "open_membership": true,
            "members_can_propose": false,
            "metadata_ref": null,
            "member_count": 3
        });
        let view: OrgView = serde_json::from_value(value).unwrap();
        assert_eq!(view.name, "org-1");
        assert_eq!(view.member_count, 3);
    }
}
