use thiserror::Error;

/// The error discriminants exposed to callers of the core, matching the taxonomy
/// every component maps its internal failures onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    FieldRange,
    PointAtInfinity,
    Config,
    ChainTransient,
    ChainRejected,
    Timeout,
    Conflict,
    Internal,
}

#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("field value is out of range for the scalar field")]
    FieldRange,

    #[error("encoded point is the point at infinity")]
    PointAtInfinity,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chain transient error: {0}")]
    ChainTransient(String),

    #[error("chain rejected transaction: {0}")]
    ChainRejected(String),

    #[error("timed out waiting for confirmation (hash {hash})")]
    Timeout { hash: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayerError::Validation(_) => ErrorKind::Validation,
            RelayerError::FieldRange => ErrorKind::FieldRange,
            RelayerError::PointAtInfinity => ErrorKind::PointAtInfinity,
            RelayerError::Config(_) => ErrorKind::Config,
            RelayerError::ChainTransient(_) => ErrorKind::ChainTransient,
            RelayerError::ChainRejected(_) => ErrorKind::ChainRejected,
            RelayerError::Timeout { .. } => ErrorKind::Timeout,
            RelayerError::Conflict(_) => ErrorKind::Conflict,
            RelayerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<crate::field::FieldError> for RelayerError {
    fn from(err: crate::field::FieldError) -> Self {
        match err {
            crate::field::FieldError::FieldRange => RelayerError::FieldRange,
            crate::field::FieldError::PointAtInfinity => RelayerError::PointAtInfinity,
            other => RelayerError::Validation(other.to_string()),
        }
    }
}

impl From<crate::store::StoreError> for RelayerError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Conflict(msg) => RelayerError::Conflict(msg),
            crate::store::StoreError::Sqlx(e) => RelayerError::Internal(e.to_string()),
        }
    }
}

impl From<crate::chain_client::ChainClientError> for RelayerError {
    fn from(err: crate::chain_client::ChainClientError) -> Self {
        use crate::chain_client::ChainClientError as E;
        match err {
            E::Timeout | E::Transport(_) => RelayerError::ChainTransient(err.to_string()),
            E::Rejected(reason) => RelayerError::ChainRejected(reason),
            E::Decode(msg) => RelayerError::Internal(msg),
        }
    }
}

impl From<crate::config::ConfigError> for RelayerError {
    fn from(err: crate::config::ConfigError) -> Self {
        RelayerError::Config(err.to_string())
    }
}

/// Redacts a value before it is interpolated into a log line. Used at call sites for
/// `nullifier`, `commitment`, `proof`, `secret` and `token` fields; never stored.
pub fn redact(value: &str) -> String {
    if value.len() <= 8 {
        "<redacted>".to_string()
    } else {
        format!("<redacted:{}…>", &value[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping_is_exhaustive_and_stable() {
        assert_eq!(RelayerError::FieldRange.kind(), ErrorKind::FieldRange);
        assert_eq!(RelayerError::PointAtInfinity.kind(), ErrorKind::PointAtInfinity);
        assert_eq!(
            RelayerError::Timeout { hash: "abc".into() }.kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn redact_never_leaks_full_value() {
        let secret = "0123456789abcdef0123456789abcdef";
        let redacted = redact(secret);
        assert!(!redacted.contains(&secret[8..]));
    }
}
