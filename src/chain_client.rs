//! JSON-RPC wrapper around the ledger's RPC endpoint. One method per RPC call,
//! mirroring the call-wrapper idiom used elsewhere in this codebase: build a
//! typed params struct, POST it, decode `result` into a typed response.
//!
//! All calls carry a deadline. `simulate` retries internally; `send` does not
//! (the Submitter owns any higher-level retry policy).

use std::time::Duration;

use log::{trace, warn};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

const MAX_SIMULATE_ATTEMPTS: usize = 3;
const SIMULATE_BACKOFF_MS: u64 = 200;
const WAIT_TX_POLL_INTERVAL_SECS: u64 = 1;
const WAIT_TX_MAX_ATTEMPTS: usize = 30;

#[derive(Error, Debug)]
pub enum ChainClientError {
    #[error("request to chain RPC timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Rejected(String),
    #[error("failed to decode RPC response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct Account {
    pub sequence: u64,
}

pub struct SimulationResult {
    pub resources: Value,
    pub min_fee: u64,
}

#[derive(Debug)]
pub enum SendOutcome {
    Queued { hash: String },
    RejectedLocal(String),
    RejectedRemote(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Success { ledger: u64 },
    Failed { reason: String },
    NotFound,
}

pub struct RawEvent {
    pub contract_id: String,
    pub ledger: u64,
    pub tx_hash: String,
    pub topics: Vec<String>,
    pub value: Value,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: &'a P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

pub struct ChainClient {
    http: Client,
    rpc_url: String,
}

impl ChainClient {
    pub fn new(rpc_url: String, timeout: Duration) -> Result<Self, ChainClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainClientError::Transport(e.to_string()))?;
        Ok(Self { http, rpc_url })
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R, ChainClientError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("chain_client call: {method}");
        }

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainClientError::Timeout
                } else {
                    ChainClientError::Transport(e.to_string())
                }
            })?;

        let body: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ChainClientError::Decode(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ChainClientError::Rejected(error.message));
        }

        body.result.ok_or_else(|| ChainClientError::Decode("missing result field".into()))
    }

    /// One bounded call; returns whatever the node reports without retry.
    pub async fn health(&self) -> Result<(bool, String), ChainClientError> {
        #[derive(Deserialize)]
        struct HealthResult {
            status: String,
        }
        let result: HealthResult = self.call("getHealth", &json!({})).await?;
        let ok = result.status == "healthy";
        Ok((ok, result.status))
    }

    pub async fn load_account(&self, address: &str) -> Result<Account, ChainClientError> {
        #[derive(Deserialize)]
        struct AccountResult {
            sequence: String,
        }
        let result: AccountResult = self.call("getAccount", &json!({ "address": address })).await?;
        let sequence = result
            .sequence
            .parse()
            .map_err(|_| ChainClientError::Decode("invalid sequence number".into()))?;
        Ok(Account { sequence })
    }

    /// Simulates a transaction envelope with retry: up to 3 attempts, exponential
    /// backoff `200 * attempt` ms. Transient errors are retried; rejections are
    /// surfaced immediately since they will not change on retry.
    pub async fn simulate(&self, tx_envelope: &str) -> Result<SimulationResult, ChainClientError> {
        #[derive(Deserialize)]
        struct SimulateResult {
            resources: Value,
            min_resource_fee: u64,
        }

        for attempt in 0..MAX_SIMULATE_ATTEMPTS {
            let outcome: Result<SimulateResult, ChainClientError> = self
                .call("simulateTransaction", &json!({ "transaction": tx_envelope }))
                .await;

            match outcome {
                Ok(result) => {
                    return Ok(SimulationResult {
                        resources: result.resources,
                        min_fee: result.min_resource_fee,
                    })
                }
                Err(err) => {
                    let retryable = matches!(err, ChainClientError::Timeout | ChainClientError::Transport(_));
                    if !retryable || attempt + 1 == MAX_SIMULATE_ATTEMPTS {
                        return Err(err);
                    }
                    warn!("simulate attempt {attempt} failed, retrying: {err}");
                    sleep(Duration::from_millis(SIMULATE_BACKOFF_MS * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(ChainClientError::Transport("simulate retries exhausted".into()))
    }

    /// Submits an already-simulated and signed transaction. Not retried here.
    pub async fn send(&self, signed_envelope: &str) -> Result<SendOutcome, ChainClientError> {
        #[derive(Deserialize)]
        struct SendResult {
            status: String,
            hash: Option<String>,
            error: Option<String>,
        }

        let result: SendResult = self
            .call("sendTransaction", &json!({ "transaction": signed_envelope }))
            .await?;

        match result.status.as_str() {
            "PENDING" | "DUPLICATE" => Ok(SendOutcome::Queued {
                hash: result.hash.unwrap_or_default(),
            }),
            "ERROR" => Ok(SendOutcome::RejectedRemote(result.error.unwrap_or_default())),
            _ => Ok(SendOutcome::RejectedLocal(result.error.unwrap_or(result.status))),
        }
    }

    /// Single read of transaction status.
    pub async fn poll_tx(&self, hash: &str) -> Result<TxStatus, ChainClientError> {
        #[derive(Deserialize)]
        struct GetTxResult {
            status: String,
            ledger: Option<u64>,
            reason: Option<String>,
        }

        let result: GetTxResult = self.call("getTransaction", &json!({ "hash": hash })).await?;
        Ok(match result.status.as_str() {
            "SUCCESS" => TxStatus::Success {
                ledger: result.ledger.unwrap_or_default(),
            },
            "FAILED" => TxStatus::Failed {
                reason: result.reason.unwrap_or_else(|| "unknown".to_string()),
            },
            _ => TxStatus::NotFound,
        })
    }

    /// Polls once per second for up to 30 attempts; returns `None` on exhaustion
    /// (the caller maps that to `Timeout`).
    pub async fn wait_tx(&self, hash: &str) -> Result<Option<TxStatus>, ChainClientError> {
        for _ in 0..WAIT_TX_MAX_ATTEMPTS {
            match self.poll_tx(hash).await? {
                TxStatus::NotFound => sleep(Duration::from_secs(WAIT_TX_POLL_INTERVAL_SECS)).await,
                final_status => return Ok(Some(final_status)),
            }
        }
        Ok(None)
    }

    pub async fn latest_ledger(&self) -> Result<u64, ChainClientError> {
        #[derive(Deserialize)]
        struct LatestLedgerResult {
            sequence: u64,
        }
        let result: LatestLedgerResult = self.call("getLatestLedger", &json!({})).await?;
        Ok(result.sequence)
    }

    /// Invokes a read-only contract view function. Used exclusively by the Syncer,
    /// which never sends transactions.
    pub async fn call_view(&self, contract_id: &str, function: &str, args: &Value) -> Result<Value, ChainClientError> {
        #[derive(Deserialize)]
        struct ViewResult {
            value: Value,
        }
        let result: ViewResult = self
            .call(
                "invokeContractView",
                &json!({ "contractId": contract_id, "function": function, "args": args }),
            )
            .await?;
        Ok(result.value)
    }

    /// Returns contract-scoped events in `(start_ledger, end_ledger]`, capped at `limit`.
    pub async fn get_events(
        &self,
        contract_ids: &[String],
        start_ledger: u64,
        end_ledger: u64,
        limit: u32,
    ) -> Result<Vec<RawEvent>, ChainClientError> {
        #[derive(Deserialize)]
        struct EventEntry {
            contract_id: String,
            ledger: u64,
            #[serde(alias = "txHash")]
            tx_hash: String,
            topics: Vec<String>,
            value: Value,
        }
        #[derive(Deserialize)]
        struct GetEventsResult {
            events: Vec<EventEntry>,
        }

        let result: GetEventsResult = self
            .call(
                "getEvents",
                &json!({
                    "contractIds": contract_ids,
                    "startLedger": start_ledger,
                    "endLedger": end_ledger,
                    "limit": limit.min(100),
                }),
            )
            .await?;

        Ok(result
            .events
            .into_iter()
            .map(|e| RawEvent {
                contract_id: e.contract_id,
                ledger: e.ledger,
                tx_hash: e.tx_hash,
                topics: e.topics,
                value: e.value,
            })
            .collect())
    }
}
