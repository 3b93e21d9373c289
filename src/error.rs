use thiserror::Error;

/// Failure to turn a wire string into one of the ledger's binary values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("{what}: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("public key is not a point on P-256")]
    InvalidPublicKey,

    #[error("signature scalars out of range")]
    InvalidSignature,

    #[error("private key scalar out of range")]
    InvalidPrivateKey,
}

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("peer {0} is not connected")]
    PeerNotFound(String),

    #[error("request to {peer} timed out after {millis}ms")]
    Timeout { peer: String, millis: u64 },

    #[error("request to {peer} failed: {reason}")]
    RequestFailed { peer: String, reason: String },

    #[error("network event loop has stopped")]
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block index {actual} does not follow tip index {tip}")]
    IndexMismatch { tip: u64, actual: u64 },

    #[error("block does not link to the current tip")]
    PreviousHashMismatch,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Why an inbound transaction request was refused before admission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("failed due to missing fields")]
    MissingFields,

    #[error("sender address is reserved for mining rewards")]
    ReservedSender,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Why `add_transaction` refused a transfer. Only the boolean outcome is part
/// of the admission contract; the reason is for logs and RPC replies.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("value {0} is not a non-negative number")]
    InvalidValue(f64),

    #[error("missing public key or signature")]
    Unsigned,

    #[error("signature does not match the transfer")]
    BadSignature,

    #[error("you can't send money to yourself")]
    SelfTransfer,

    #[error("insufficient funds: balance {balance}, value {value}")]
    InsufficientFunds { balance: f64, value: f64 },
}

/// Outcome of a wallet or peer asking a node to take a transfer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),
}
