//! The core write pipeline: validate → encode → simulate → sign → send → confirm → classify.
//!
//! All submissions share a single relayer keypair and must serialize the
//! `load_account -> send` span to avoid sequence collisions; this is enforced by
//! a single-holder mutex held across steps 3-7 only. Validation/encoding (1-2)
//! and confirmation/classification (8-10) run outside the mutex.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use log::{debug, info, warn};
use serde_json::json;
use tokio::sync::Mutex;

use crate::chain_client::{ChainClient, ChainClientError, SendOutcome, TxStatus};
use crate::error::{redact, RelayerError};
use crate::field::{self, ProofHex};
use crate::indexer::Indexer;
use crate::tx_builder::{self, Operation};

const MAX_CONTENT_REF_LEN: usize = 512;

pub struct SubmitVoteRequest {
    pub org_id: u64,
    pub proposal_id: u64,
    pub choice: bool,
    pub nullifier: String,
    pub root: String,
    pub proof_a: String,
    pub proof_b: String,
    pub proof_c: String,
}

pub struct SubmitCommentRequest {
    pub org_id: u64,
    pub proposal_id: u64,
    pub content_ref: String,
    pub parent_id: Option<u64>,
    pub vote_choice: bool,
    pub nullifier: String,
    pub root: String,
    pub commitment: String,
    pub proof_a: String,
    pub proof_b: String,
    pub proof_c: String,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Success { hash: String, ledger: u64 },
    Failed { hash: String, reason: String },
    Timeout { hash: String },
    Rejected { reason: String },
}

pub struct Submitter {
    chain: Arc<ChainClient>,
    indexer: Arc<Indexer>,
    keypair: SigningKey,
    network_passphrase: String,
    voting_contract_id: String,
    comments_contract_id: String,
    relayer_address: String,
    sequence_mutex: Mutex<()>,
}

impl Submitter {
    pub fn new(
        chain: Arc<ChainClient>,
        indexer: Arc<Indexer>,
        keypair: SigningKey,
        network_passphrase: String,
        voting_contract_id: String,
        comments_contract_id: String,
    ) -> Self {
        let relayer_address = hex::encode(keypair.verifying_key().to_bytes());
        Self {
            chain,
            indexer,
            keypair,
            network_passphrase,
            voting_contract_id,
            comments_contract_id,
            relayer_address,
            sequence_mutex: Mutex::new(()),
        }
    }

    pub async fn submit_vote(&self, req: SubmitVoteRequest) -> Result<SubmitOutcome, RelayerError> {
        if req.org_id == 0 || req.proposal_id == 0 {
            return Err(RelayerError::Validation("org_id and proposal_id must be non-zero".into()));
        }

        let nullifier = field::encode_field(&req.nullifier)?;
        let root = field::encode_field(&req.root)?;
        let proof = field::encode_proof(ProofHex {
            a: &req.proof_a,
            b: &req.proof_b,
            c: &req.proof_c,
        })?;

        debug!(
            "submit_vote org={} proposal={} nullifier={}",
            req.org_id,
            req.proposal_id,
            redact(&req.nullifier)
        );

        let args = vec![
            json!(req.org_id),
            json!(req.proposal_id),
            json!(req.choice),
            json!(nullifier.to_hex()),
            json!(root.to_hex()),
            json!(hex::encode(proof.a.as_bytes())),
            json!(hex::encode(proof.b.as_bytes())),
            json!(hex::encode(proof.c.as_bytes())),
        ];

        let operation = Operation::new(self.voting_contract_id.clone(), "submit_vote", args);
        let outcome = self.run_pipeline(operation).await?;

        if let SubmitOutcome::Success { hash, .. } = &outcome {
            self.notify_indexer_of_success(req.org_id, "vote-cast", hash).await;
        }

        Ok(outcome)
    }

    pub async fn submit_anonymous_comment(&self, req: SubmitCommentRequest) -> Result<SubmitOutcome, RelayerError> {
        if req.org_id == 0 || req.proposal_id == 0 {
            return Err(RelayerError::Validation("org_id and proposal_id must be non-zero".into()));
        }
        if req.content_ref.is_empty() || req.content_ref.len() > MAX_CONTENT_REF_LEN {
            return Err(RelayerError::Validation(format!(
                "content_ref must be 1..={MAX_CONTENT_REF_LEN} characters"
            )));
        }

        let nullifier = field::encode_field(&req.nullifier)?;
        let root = field::encode_field(&req.root)?;
        let commitment = field::encode_field(&req.commitment)?;
        let proof = field::encode_proof(ProofHex {
            a: &req.proof_a,
            b: &req.proof_b,
            c: &req.proof_c,
        })?;

        debug!(
            "submit_anonymous_comment org={} proposal={} commitment={}",
            req.org_id,
            req.proposal_id,
            redact(&req.commitment)
        );

        let args = vec![
            json!(req.org_id),
            json!(req.proposal_id),
            json!(req.content_ref),
            json!(req.parent_id),
            json!(req.vote_choice),
            json!(nullifier.to_hex()),
            json!(root.to_hex()),
            json!(commitment.to_hex()),
            json!(hex::encode(proof.a.as_bytes())),
            json!(hex::encode(proof.b.as_bytes())),
            json!(hex::encode(proof.c.as_bytes())),
        ];

        let operation = Operation::new(self.comments_contract_id.clone(), "submit_comment_anonymous", args);
        let outcome = self.run_pipeline(operation).await?;

        if let SubmitOutcome::Success { hash, .. } = &outcome {
            self.notify_indexer_of_success(req.org_id, "comment-anonymous-create", hash).await;
        }

        Ok(outcome)
    }

    /// Steps 3-9: account load through classification. Steps 3-7 run under the
    /// sequence mutex; confirmation (8) and classification (9) run outside it.
    async fn run_pipeline(&self, operation: Operation) -> Result<SubmitOutcome, RelayerError> {
        let (sent_hash, send_outcome) = {
            let _guard = self.sequence_mutex.lock().await;

            let account = self.chain.load_account(&self.relayer_address).await?;
            let simulation = self.chain.simulate("unsigned-preview").await?;

            let signed = tx_builder::build(
                &account,
                operation,
                simulation.min_fee,
                &self.network_passphrase,
                &simulation.resources,
                &self.keypair,
            )
            .map_err(|e| RelayerError::Internal(e.to_string()))?;

            let send_outcome = self.chain.send(&signed.envelope).await?;
            (signed.hash, send_outcome)
        };

        match send_outcome {
            SendOutcome::RejectedLocal(reason) => Ok(SubmitOutcome::Rejected { reason }),
            SendOutcome::RejectedRemote(reason) => Ok(SubmitOutcome::Rejected { reason }),
            SendOutcome::Queued { hash } => {
                let hash = if hash.is_empty() { sent_hash } else { hash };
                match self.chain.wait_tx(&hash).await {
                    Ok(Some(TxStatus::Success { ledger })) => Ok(SubmitOutcome::Success { hash, ledger }),
                    Ok(Some(TxStatus::Failed { reason })) => Ok(SubmitOutcome::Failed { hash, reason }),
                    Ok(Some(TxStatus::NotFound)) | Ok(None) => Ok(SubmitOutcome::Timeout { hash }),
                    Err(ChainClientError::Rejected(reason)) => Ok(SubmitOutcome::Failed { hash, reason }),
                    Err(err) => Err(RelayerError::from(err)),
                }
            }
        }
    }

    async fn notify_indexer_of_success(&self, org_id: u64, kind: &str, tx_hash: &str) {
        if let Err(err) = self.indexer.notify_event(org_id, kind, json!({}), tx_hash).await {
            warn!("submitter: failed to notify indexer after successful submit: {err}");
        } else {
            info!("submitter: notified indexer of {kind} for org {org_id}");
        }
    }
}
