//! Shared context and lifecycle management: wires the Store, ChainClient, caches
//! and the Indexer/Syncer/Submitter together, then owns their spawned loops.
//!
//! Mirrors the start/stop shape of a long-running network handler: `start`
//! spawns one task per loop and records its `JoinHandle`; `stop` flips a
//! shared cancellation signal and waits for every loop to return.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{MembershipCache, OrgCache};
use crate::chain_client::ChainClient;
use crate::config::Config;
use crate::error::RelayerError;
use crate::indexer::Indexer;
use crate::store::Store;
use crate::submitter::Submitter;
use crate::syncer::Syncer;

/// Shared, process-lifetime handles every component is built from.
pub struct Context {
    pub store: Arc<Store>,
    pub chain: Arc<ChainClient>,
    pub org_cache: Arc<OrgCache>,
    pub membership_cache: Arc<MembershipCache>,
    pub indexer: Arc<Indexer>,
    pub syncer: Arc<Syncer>,
    pub submitter: Arc<Submitter>,
}

pub struct Orchestrator {
    context: Context,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Builds every component from a validated `Config`. Does not spawn loops or
    /// touch the network; call `start` for that.
    pub async fn build(config: &Config) -> Result<Self, RelayerError> {
        let db_path = format!("{}/relayer.sqlite3", config.data_dir.trim_end_matches('/'));
        let store = Arc::new(Store::open(&db_path).await?);
        let chain = Arc::new(ChainClient::new(config.rpc_url.clone(), config.rpc_timeout)?);

        let org_cache = Arc::new(OrgCache::new());
        let membership_cache = Arc::new(MembershipCache::new());

        let keypair = parse_secret_key(&config.relayer_secret_key)?;

        let mut contract_ids = vec![
            config.voting_contract_id.clone(),
            config.tree_contract_id.clone(),
            config.comments_contract_id.clone(),
        ];
        if let Some(registry) = &config.registry_contract_id {
            contract_ids.push(registry.clone());
        }
        if let Some(membership) = &config.membership_contract_id {
            contract_ids.push(membership.clone());
        }

        let indexer = Arc::new(Indexer::new(
            store.clone(),
            chain.clone(),
            contract_ids,
            config.indexer_poll_interval,
        ));

        let syncer = Arc::new(Syncer::new(
            store.clone(),
            chain.clone(),
            org_cache.clone(),
            membership_cache.clone(),
            config.registry_contract_id.clone(),
            config.membership_contract_id.clone(),
            config.org_sync_interval,
            config.membership_sync_interval,
        ));

        let submitter = Arc::new(Submitter::new(
            chain.clone(),
            indexer.clone(),
            keypair,
            config.network_passphrase.clone(),
            config.voting_contract_id.clone(),
            config.comments_contract_id.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            context: Context {
                store,
                chain,
                org_cache,
                membership_cache,
                indexer,
                syncer,
                submitter,
            },
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Spawns the indexer loop and both syncer loops. Idempotent only in the sense
    /// that calling it twice spawns a second set of loops; callers should call it once.
    pub fn start(&mut self) {
        info!("orchestrator: starting indexer and syncer loops");

        let indexer = self.context.indexer.clone();
        let syncer = self.context.syncer.clone();
        let shutdown = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(async move {
            indexer.run(syncer, shutdown).await;
        }));

        let org_syncer = self.context.syncer.clone();
        let shutdown = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(async move {
            org_syncer.run_org_sync(shutdown).await;
        }));

        let membership_syncer = self.context.syncer.clone();
        let shutdown = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(async move {
            membership_syncer.run_membership_sync(shutdown).await;
        }));
    }

    /// Signals every loop to stop and waits for them to return.
    pub async fn stop(&mut self) {
        info!("orchestrator: stopping loops");
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                warn!("orchestrator: loop task panicked during shutdown: {err}");
            }
        }
    }
}

fn parse_secret_key(raw: &str) -> Result<SigningKey, RelayerError> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| RelayerError::Config(format!("relayer secret key is not valid hex: {e}")))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| RelayerError::Config("relayer secret key must decode to 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_secret_key_rejects_wrong_length() {
        let err = parse_secret_key("aabb").unwrap_err();
        assert!(matches!(err, RelayerError::Config(_)));
    }

    #[test]
    fn parse_secret_key_accepts_32_byte_hex() {
        let hex_key = "11".repeat(32);
        assert!(parse_secret_key(&hex_key).is_ok());
    }
}
