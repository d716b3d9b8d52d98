//! In-memory, process-local caches updated by the Syncer. Never authoritative;
//! rebuilt from events/syncer sweeps. Readers always see a complete, consistent
//! snapshot because updates replace the whole pointer rather than mutating in place.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::store::OrgRow;

#[derive(Default, Clone)]
pub struct MembershipSnapshot {
    pub members: HashMap<u64, Arc<HashSet<String>>>,
    pub admins: HashMap<u64, String>,
}

/// `org_id -> set<address>` and `org_id -> admin_address`. Rebuilt on startup; copy-on-write.
pub struct MembershipCache {
    inner: RwLock<Arc<MembershipSnapshot>>,
}

impl Default for MembershipCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(MembershipSnapshot::default())),
        }
    }

    /// Returns a consistent, read-only snapshot. Cheap: an `Arc` clone, not a copy.
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        self.inner.read().expect("membership cache lock poisoned").clone()
    }

    /// Replaces the member set for a single org. Idempotent; may run concurrently
    /// with the periodic membership sweep without interfering with it.
    pub fn replace_org_members(&self, org_id: u64, members: HashSet<String>, admin: Option<String>) {
        let mut guard = self.inner.write().expect("membership cache lock poisoned");
        let mut next = (**guard).clone();
        next.members.insert(org_id, Arc::new(members));
        if let Some(admin) = admin {
            next.admins.insert(org_id, admin);
        }
        *guard = Arc::new(next);
    }

    pub fn members_of(&self, org_id: u64) -> Option<Arc<HashSet<String>>> {
        self.snapshot().members.get(&org_id).cloned()
    }
}

/// Fast in-memory mirror of the relationally-stored `orgs` table, refreshed by the
/// Syncer after every `upsert_orgs`. The Store remains the source of truth; this
/// cache exists purely to avoid a round trip on hot read paths.
pub struct OrgCache {
    inner: RwLock<Arc<HashMap<u64, OrgRow>>>,
}

impl Default for OrgCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OrgCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<u64, OrgRow>> {
        self.inner.read().expect("org cache lock poisoned").clone()
    }

    /// Atomically swaps in a full replacement set, matching the Syncer's org-sync
    /// sweep which always assembles a complete `1..=N` view.
    pub fn replace_all(&self, rows: Vec<OrgRow>) {
        let map = rows.into_iter().map(|row| (row.id, row)).collect();
        let mut guard = self.inner.write().expect("org cache lock poisoned");
        *guard = Arc::new(map);
    }

    pub fn get(&self, id: u64) -> Option<OrgRow> {
        self.snapshot().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_replace_is_visible_to_new_snapshots_only_after_swap() {
        let cache = MembershipCache::new();
        let before = cache.snapshot();
        assert!(before.members.is_empty());

        let mut set = HashSet::new();
        set.insert("addrA".to_string());
        cache.replace_org_members(1, set, Some("admin1".to_string()));

        // the snapshot taken before the swap is untouched (consistent view)
        assert!(before.members.is_empty());

        let after = cache.snapshot();
        assert_eq!(after.members.get(&1).unwrap().len(), 1);
        assert_eq!(after.admins.get(&1).unwrap(), "admin1");
    }

    #[test]
    fn org_cache_replace_all_is_a_full_swap() {
        let cache = OrgCache::new();
        cache.replace_all(vec![OrgRow {
            id: 1,
            name: "a".into(),
            admin: "admin".into(),
            open_membership: true,
            members_can_propose: true,
            metadata_ref: None,
            member_count: 0,
        }]);
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());

        cache.replace_all(vec![]);
        assert!(cache.get(1).is_none());
    }
}
