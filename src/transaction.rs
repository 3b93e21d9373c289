use std::time::{SystemTime, UNIX_EPOCH};

use get_size::GetSize;
use serde::{Deserialize, Serialize};

use crate::config::MINING_SENDER;
use crate::crypto::{KeyPair, PublicKey, Signature};
use crate::error::RequestError;
use crate::hash::{CanonicalEncoder, Hash};

const TRANSFER_DOMAIN: &str = "zero-ledger/transfer";

/// Lifecycle tag of a record. Records are created `Pending` and nothing
/// moves them to another state yet, even once they are inside a block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, GetSize)]
pub enum TxStatus {
    Pending,
    /// Accepted on the wire from peers; this node never assigns it.
    Confirmed,
}

impl TxStatus {
    fn tag(self) -> u8 {
        match self {
            TxStatus::Pending => 0,
            TxStatus::Confirmed => 1,
        }
    }
}

/// A value transfer between two addresses.
///
/// The hash covers only `{sender, recipient, value}`, so two transfers of the
/// same amount between the same addresses share a hash regardless of when
/// they were created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, GetSize)]
pub struct Transaction {
    sender: String,
    recipient: String,
    value: f64,
    timestamp: u64,
    hash: Hash,
    status: TxStatus,
}

impl Transaction {
    pub fn new(sender: &str, recipient: &str, value: f64) -> Transaction {
        Transaction {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            value,
            timestamp: timestamp_nanos(),
            hash: transfer_hash(sender, recipient, value),
            status: TxStatus::Pending,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Recomputes the content hash from the stored fields.
    pub fn compute_hash(&self) -> Hash {
        transfer_hash(&self.sender, &self.recipient, self.value)
    }

    /// Writes the whole record into a block's canonical stream.
    pub(crate) fn encode_into(&self, enc: &mut CanonicalEncoder) {
        enc.str(&self.sender)
            .str(&self.recipient)
            .f64(self.value)
            .u64(self.timestamp)
            .u8(self.status.tag())
            .hash(&self.hash);
    }
}

/// The bytes a wallet signs for a transfer.
pub fn transfer_payload(sender: &str, recipient: &str, value: f64) -> Vec<u8> {
    let mut enc = CanonicalEncoder::new(TRANSFER_DOMAIN);
    enc.str(sender).str(recipient).f64(value);
    enc.bytes().to_vec()
}

fn transfer_hash(sender: &str, recipient: &str, value: f64) -> Hash {
    let mut enc = CanonicalEncoder::new(TRANSFER_DOMAIN);
    enc.str(sender).str(recipient).f64(value);
    enc.digest()
}

pub(crate) fn timestamp_nanos() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}

/// Transfer as it travels between a wallet, a node and its peers: key and
/// signature still in their hex wire forms.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub sender: String,
    pub recipient: String,
    pub public_key: String,
    pub value: f64,
    pub signature: String,
}

/// A request whose key and signature decoded cleanly.
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub sender: String,
    pub recipient: String,
    pub value: f64,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl TransactionRequest {
    pub fn signed(keys: &KeyPair, sender: &str, recipient: &str, value: f64) -> TransactionRequest {
        let signature = keys.sign(&transfer_payload(sender, recipient, value));
        TransactionRequest {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            public_key: keys.public_key().to_hex(),
            value,
            signature: signature.to_hex(),
        }
    }

    pub fn decode(&self) -> Result<SignedTransfer, RequestError> {
        if self.sender.is_empty()
            || self.recipient.is_empty()
            || self.public_key.is_empty()
            || self.signature.is_empty()
            || self.value == 0.0
        {
            return Err(RequestError::MissingFields);
        }
        if self.sender == MINING_SENDER {
            return Err(RequestError::ReservedSender);
        }
        Ok(SignedTransfer {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            value: self.value,
            public_key: PublicKey::from_hex(&self.public_key)?,
            signature: Signature::from_hex(&self.signature)?,
        })
    }
}

impl From<&SignedTransfer> for TransactionRequest {
    fn from(t: &SignedTransfer) -> TransactionRequest {
        TransactionRequest {
            sender: t.sender.clone(),
            recipient: t.recipient.clone(),
            public_key: t.public_key.to_hex(),
            value: t.value,
            signature: t.signature.to_hex(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn hash_covers_transfer_fields_only() {
        let a = Transaction::new("alice", "bob", 2.5);
        let b = Transaction::new("alice", "bob", 2.5);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.compute_hash());
        assert_eq!(a.status, TxStatus::Pending);

        assert_ne!(a.hash(), Transaction::new("alice", "bob", 2.0).hash());
        assert_ne!(a.hash(), Transaction::new("bob", "alice", 2.5).hash());
    }

    #[test]
    fn serializes_hash_as_hex() {
        let tx = Transaction::new("alice", "bob", 1.0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["hash"], tx.hash().to_hex());
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn signed_request_decodes_and_verifies() {
        let keys = KeyPair::generate();
        let request = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        let transfer = request.decode().unwrap();
        let payload = transfer_payload("alice", "bob", 3.0);
        assert!(transfer.public_key.verify(&payload, &transfer.signature));
        assert_eq!(TransactionRequest::from(&transfer), request);
    }

    #[test]
    fn request_with_missing_fields_is_rejected() {
        let keys = KeyPair::generate();
        let mut request = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        request.signature.clear();
        assert_eq!(request.decode().unwrap_err(), RequestError::MissingFields);

        let mut request = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        request.value = 0.0;
        assert_eq!(request.decode().unwrap_err(), RequestError::MissingFields);
    }

    #[test]
    fn request_cannot_claim_mining_sender() {
        let keys = KeyPair::generate();
        let request = TransactionRequest::signed(&keys, MINING_SENDER, "bob", 3.0);
        assert_eq!(request.decode().unwrap_err(), RequestError::ReservedSender);
    }

    #[test]
    fn malformed_key_is_a_decode_error() {
        let keys = KeyPair::generate();
        let mut request = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        request.public_key = "zz".repeat(64);
        assert!(matches!(
            request.decode(),
            Err(RequestError::Decode(DecodeError::InvalidHex(_)))
        ));
    }
}
