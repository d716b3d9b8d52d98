//! Builds and signs contract-invoke transactions from canonical argument maps.
//!
//! Pure function of `(account, operation, fee, passphrase)`: no I/O, no clock
//! reads. The keypair is held by reference and never logged.

use ed25519_dalek::{Signer, SigningKey};
use serde::Serialize;
use serde_json::Value;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::chain_client::Account;

#[derive(Error, Debug)]
pub enum TxBuilderError {
    #[error("operation function name must not be empty")]
    EmptyFunctionName,
}

/// A single contract-invoke operation: function name plus typed positional args.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub contract_id: String,
    pub function_name: String,
    pub args: Vec<Value>,
}

impl Operation {
    pub fn new(contract_id: impl Into<String>, function_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            contract_id: contract_id.into(),
            function_name: function_name.into(),
            args,
        }
    }
}

#[derive(Serialize)]
struct UnsignedBody<'a> {
    source_account: &'a str,
    sequence: u64,
    fee: u64,
    network_passphrase: &'a str,
    operation: &'a Operation,
    resources: &'a Value,
}

pub struct SignedTransaction {
    /// The canonical hex-encoded envelope, ready to be sent to `ChainClient::send`.
    pub envelope: String,
    pub hash: String,
}

/// Builds a single contract-invoke transaction, applies the simulation's resource
/// assembly, and signs it with the relayer keypair. Deterministic given its inputs.
pub fn build(
    account: &Account,
    operation: Operation,
    fee: u64,
    network_passphrase: &str,
    resources: &Value,
    keypair: &SigningKey,
) -> Result<SignedTransaction, TxBuilderError> {
    if operation.function_name.is_empty() {
        return Err(TxBuilderError::EmptyFunctionName);
    }

    let source_account = hex::encode(keypair.verifying_key().to_bytes());

    let body = UnsignedBody {
        source_account: &source_account,
        sequence: account.sequence + 1,
        fee,
        network_passphrase,
        operation: &operation,
        resources,
    };

    let body_bytes = serde_json::to_vec(&body).expect("UnsignedBody serialization cannot fail");

    let mut hasher = Sha3_256::new();
    hasher.update(&body_bytes);
    let hash_bytes = hasher.finalize();
    let hash = hex::encode(hash_bytes);

    let signature = keypair.sign(&hash_bytes);

    let envelope = serde_json::json!({
        "body": body_bytes_to_value(&body_bytes),
        "signature": hex::encode(signature.to_bytes()),
    });

    Ok(SignedTransaction {
        envelope: envelope.to_string(),
        hash,
    })
}

fn body_bytes_to_value(bytes: &[u8]) -> Value {
    Value::String(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn test_keypair() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    #[test]
    fn build_is_deterministic_given_identical_inputs() {
        let keypair = test_keypair();
        let account = Account { sequence: 41 };
        let op = Operation::new("CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC", "vote", vec![]);
        let resources = serde_json::json!({});

        let tx1 = build(&account, op.clone(), 100, "test-net", &resources, &keypair).unwrap();
        let tx2 = build(&account, op, 100, "test-net", &resources, &keypair).unwrap();

        assert_eq!(tx1.hash, tx2.hash);
        assert_eq!(tx1.envelope, tx2.envelope);
    }

    #[test]
    fn rejects_empty_function_name() {
        let keypair = test_keypair();
        let account = Account { sequence: 0 };
        let op = Operation::new("C".repeat(56), "", vec![]);
        let resources = serde_json::json!({});
        assert!(build(&account, op, 100, "test-net", &resources, &keypair).is_err());
    }

    #[test]
    fn different_sequence_changes_hash() {
        let keypair = test_keypair();
        let op = Operation::new("C".repeat(56), "vote", vec![]);
        let resources = serde_json::json!({});

        let tx1 = build(&Account { sequence: 1 }, op.clone(), 100, "test-net", &resources, &keypair).unwrap();
        let tx2 = build(&Account { sequence: 2 }, op, 100, "test-net", &resources, &keypair).unwrap();

        assert_ne!(tx1.hash, tx2.hash);
    }
}
