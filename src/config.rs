//! Typed configuration, validated once at startup. Loaded from `RELAYER_*`
//! environment variables; never re-read after `Config::load`.

use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_INDEXER_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_ORG_SYNC_INTERVAL_MS: u64 = 30_000;
const DEFAULT_MEMBERSHIP_SYNC_INTERVAL_MS: u64 = 600_000;

const CONTRACT_ID_LEN: usize = 56;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),
    #[error("invalid contract id for {field}: must be {CONTRACT_ID_LEN} base32 characters starting with 'C'")]
    InvalidContractId { field: &'static str },
    #[error("invalid relayer secret key: {0}")]
    InvalidSecretKey(String),
    #[error("invalid integer value for {field}: {source}")]
    InvalidInteger {
        field: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub network_passphrase: String,
    pub relayer_secret_key: String,
    pub voting_contract_id: String,
    pub tree_contract_id: String,
    pub comments_contract_id: String,
    pub registry_contract_id: Option<String>,
    pub membership_contract_id: Option<String>,
    pub rpc_timeout: Duration,
    pub indexer_poll_interval: Duration,
    pub org_sync_interval: Duration,
    pub membership_sync_interval: Duration,
    pub data_dir: String,
}

impl Config {
    /// Loads and validates configuration from `RELAYER_*` environment variables.
    /// Fatal at startup: any error here should abort the process before the
    /// Orchestrator is constructed.
    pub fn load() -> Result<Self, ConfigError> {
        let rpc_url = required("RELAYER_RPC_URL")?;
        let network_passphrase = required("RELAYER_NETWORK_PASSPHRASE")?;
        let relayer_secret_key = required("RELAYER_SECRET_KEY")?;
        let voting_contract_id = required("RELAYER_VOTING_CONTRACT_ID")?;
        let tree_contract_id = required("RELAYER_TREE_CONTRACT_ID")?;
        let comments_contract_id = required("RELAYER_COMMENTS_CONTRACT_ID")?;
        let registry_contract_id = optional("RELAYER_REGISTRY_CONTRACT_ID");
        let membership_contract_id = optional("RELAYER_MEMBERSHIP_CONTRACT_ID");

        let rpc_timeout_ms = optional_u64("RELAYER_RPC_TIMEOUT_MS", DEFAULT_RPC_TIMEOUT_MS)?;
        let indexer_poll_interval_ms = optional_u64(
            "RELAYER_INDEXER_POLL_INTERVAL_MS",
            DEFAULT_INDEXER_POLL_INTERVAL_MS,
        )?;
        let org_sync_interval_ms =
            optional_u64("RELAYER_ORG_SYNC_INTERVAL_MS", DEFAULT_ORG_SYNC_INTERVAL_MS)?;
        let membership_sync_interval_ms = optional_u64(
            "RELAYER_MEMBERSHIP_SYNC_INTERVAL_MS",
            DEFAULT_MEMBERSHIP_SYNC_INTERVAL_MS,
        )?;

        let data_dir = env::var("RELAYER_DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        validate_contract_id("voting_contract_id", &voting_contract_id)?;
        validate_contract_id("tree_contract_id", &tree_contract_id)?;
        validate_contract_id("comments_contract_id", &comments_contract_id)?;
        if let Some(ref id) = registry_contract_id {
            validate_contract_id("registry_contract_id", id)?;
        }
        if let Some(ref id) = membership_contract_id {
            validate_contract_id("membership_contract_id", id)?;
        }

        if relayer_secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidSecretKey("secret key is empty".into()));
        }

        Ok(Config {
            rpc_url,
            network_passphrase,
            relayer_secret_key,
            voting_contract_id,
            tree_contract_id,
            comments_contract_id,
            registry_contract_id,
            membership_contract_id,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            indexer_poll_interval: Duration::from_millis(indexer_poll_interval_ms),
            org_sync_interval: Duration::from_millis(org_sync_interval_ms),
            membership_sync_interval: Duration::from_millis(membership_sync_interval_ms),
            data_dir,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn optional_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidInteger { field: key, source }),
        Err(_) => Ok(default),
    }
}

fn validate_contract_id(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let is_valid = value.len() == CONTRACT_ID_LEN
        && value.starts_with('C')
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if is_valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidContractId { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_contract_id() -> String {
        format!("C{}", "A".repeat(CONTRACT_ID_LEN - 1))
    }

    #[test]
    fn rejects_short_contract_id() {
        assert!(matches!(
            validate_contract_id("voting_contract_id", "CSHORT"),
            Err(ConfigError::InvalidContractId { .. })
        ));
    }

    #[test]
    fn rejects_contract_id_not_starting_with_c() {
        let mut id = valid_contract_id();
        id.replace_range(0..1, "D");
        assert!(validate_contract_id("voting_contract_id", &id).is_err());
    }

    #[test]
    fn accepts_well_formed_contract_id() {
        assert!(validate_contract_id("voting_contract_id", &valid_contract_id()).is_ok());
    }
}
