use get_size::GetSize;
use log::{debug, warn};

use crate::blockchain::Blockchain;
use crate::config::MINING_SENDER;
use crate::crypto::{PublicKey, Signature};
use crate::error::AdmissionError;
use crate::transaction::{transfer_payload, Transaction};

/// Pending transactions of one node, in arrival order.
#[derive(Debug, Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> TransactionPool {
        TransactionPool::default()
    }

    /// Applies the admission rules and appends a new record on success.
    ///
    /// Reward transfers from `MINING_SENDER` skip every check. Everything
    /// else needs a valid signature over `{sender, recipient, value}`, two
    /// distinct addresses and enough confirmed balance on `chain`.
    pub fn admit(
        &mut self,
        chain: &Blockchain,
        sender: &str,
        recipient: &str,
        value: f64,
        public_key: Option<&PublicKey>,
        signature: Option<&Signature>,
    ) -> Result<(), AdmissionError> {
        if sender == MINING_SENDER {
            self.append(Transaction::new(sender, recipient, value));
            return Ok(());
        }
        if !value.is_finite() || value < 0.0 {
            return Err(AdmissionError::InvalidValue(value));
        }

        let (public_key, signature) = match (public_key, signature) {
            (Some(k), Some(s)) => (k, s),
            _ => return Err(AdmissionError::Unsigned),
        };
        let payload = transfer_payload(sender, recipient, value);
        if !public_key.verify(&payload, signature) {
            return Err(AdmissionError::BadSignature);
        }

        if sender == recipient {
            return Err(AdmissionError::SelfTransfer);
        }

        let balance = chain.balance_of(sender);
        if balance < value {
            return Err(AdmissionError::InsufficientFunds { balance, value });
        }

        self.append(Transaction::new(sender, recipient, value));
        Ok(())
    }

    /// Boolean form of `admit`; the rejection reason only reaches the log.
    pub fn add_transaction(
        &mut self,
        chain: &Blockchain,
        sender: &str,
        recipient: &str,
        value: f64,
        public_key: Option<&PublicKey>,
        signature: Option<&Signature>,
    ) -> bool {
        match self.admit(chain, sender, recipient, value, public_key, signature) {
            Ok(()) => {
                debug!("txpool: admitted {} -> {} ({})", sender, recipient, value);
                true
            }
            Err(e) => {
                warn!("txpool: rejected {} -> {}: {}", sender, recipient, e);
                false
            }
        }
    }

    fn append(&mut self, tx: Transaction) {
        debug!("txpool: appending {}", tx.hash());
        self.transactions.push(tx);
    }

    /// Owned copy of the pending records, in order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    /// Heap bytes held by the pending records.
    pub fn heap_size(&self) -> usize {
        self.transactions.iter().map(|tx| tx.get_heap_size()).sum()
    }
}
