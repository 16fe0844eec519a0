//! Facade over the blockchain node.
//!
//! The dispatch engine only needs two things from the chain: the current
//! account state (for nonce initialization and resync) and a way to submit a
//! signed transfer or batch-transfer call under a specific nonce. Connection
//! management, signing and encoding all live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ErrorClass, Result},
    types::{Address, Amount, CollectionId, Nonce, TokenId},
};

/// On-chain view of the sending account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: Nonce,
    pub balance: u128,
}

/// Terminal status the node reports for a submitted call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Included and finalized.
    Finalized,
    /// Fell out of the transaction pool before inclusion.
    Dropped,
    /// Rejected as invalid, most commonly for a stale nonce.
    Invalid,
    /// Replaced by a competing transaction with the same nonce.
    Usurped,
    /// Anything else the node cared to explain.
    Error(String),
}

impl SubmissionOutcome {
    pub fn is_final(&self) -> bool {
        matches!(self, SubmissionOutcome::Finalized)
    }

    /// Map the outcome onto a retry class. `None` means success.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            SubmissionOutcome::Finalized => None,
            SubmissionOutcome::Invalid | SubmissionOutcome::Usurped => Some(ErrorClass::Nonce),
            SubmissionOutcome::Dropped => Some(ErrorClass::Transient),
            SubmissionOutcome::Error(reason) => Some(classify_reason(reason)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SubmissionOutcome::Finalized => "finalized".to_string(),
            SubmissionOutcome::Dropped => "dropped from the transaction pool".to_string(),
            SubmissionOutcome::Invalid => "rejected as invalid".to_string(),
            SubmissionOutcome::Usurped => "usurped by a competing transaction".to_string(),
            SubmissionOutcome::Error(reason) => reason.clone(),
        }
    }
}

/// Free-text node errors carry the class in the message. The matched strings
/// are the ones the node actually emits for each condition.
fn classify_reason(reason: &str) -> ErrorClass {
    if reason.contains("1010: Invalid Transaction") || reason.contains("Priority is too low") {
        return ErrorClass::Nonce;
    }
    let lower = reason.to_ascii_lowercase();
    if lower.contains("stale") {
        return ErrorClass::Nonce;
    }
    // anchored on the node's permanent-failure phrases; anything
    // unrecognized stays retryable
    if lower.contains("insufficient balance")
        || lower.contains("funds are unavailable")
        || lower.contains("malformed")
        || lower.contains("bad signature")
    {
        return ErrorClass::Fatal;
    }
    ErrorClass::Transient
}

/// A single transfer of `amount` of one token to one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCall {
    pub recipient: Address,
    pub collection: CollectionId,
    pub token: TokenId,
    pub amount: Amount,
}

/// One batch call moving the same token to many recipients atomically,
/// consuming a single nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTransferCall {
    pub collection: CollectionId,
    pub token: TokenId,
    pub transfers: Vec<(Address, Amount)>,
}

impl BatchTransferCall {
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_account_state(&self, address: &Address) -> Result<AccountState>;

    async fn submit_transfer(
        &self,
        call: &TransferCall,
        nonce: Nonce,
    ) -> Result<SubmissionOutcome>;

    async fn submit_batch(
        &self,
        call: &BatchTransferCall,
        nonce: Nonce,
    ) -> Result<SubmissionOutcome>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use tokio::sync::Notify;

    use super::*;
    use crate::errors::CourierError;

    /// Scripted stand-in for a chain node.
    ///
    /// Submission outcomes are popped from a script queue; once the script is
    /// exhausted everything finalizes. The reported account nonce advances on
    /// each finalized submission so resync observes realistic values.
    pub(crate) struct MockChain {
        chain_nonce: AtomicU64,
        state_failures: AtomicU32,
        hang_state_queries: AtomicBool,
        script: Mutex<VecDeque<SubmissionOutcome>>,
        submissions: Mutex<Vec<(Nonce, usize)>>,
        submissions_started: AtomicUsize,
        gated: AtomicBool,
        pub gate: Notify,
    }

    impl MockChain {
        pub fn new(chain_nonce: u64) -> Arc<Self> {
            Arc::new(Self {
                chain_nonce: AtomicU64::new(chain_nonce),
                state_failures: AtomicU32::new(0),
                hang_state_queries: AtomicBool::new(false),
                script: Mutex::new(VecDeque::new()),
                submissions: Mutex::new(Vec::new()),
                submissions_started: AtomicUsize::new(0),
                gated: AtomicBool::new(false),
                gate: Notify::new(),
            })
        }

        /// Queue an outcome for the next submission attempt.
        pub fn script(&self, outcome: SubmissionOutcome) {
            self.script.lock().unwrap().push_back(outcome);
        }

        /// Make the next `n` account state queries fail with a connection error.
        pub fn fail_state_queries(&self, n: u32) {
            self.state_failures.store(n, Ordering::SeqCst);
        }

        /// Make account state queries hang forever.
        pub fn hang_state_queries(&self) {
            self.hang_state_queries.store(true, Ordering::SeqCst);
        }

        /// Make the next submission block until `gate` is notified.
        pub fn gate_next_submission(&self) {
            self.gated.store(true, Ordering::SeqCst);
        }

        pub fn reported_nonce(&self) -> u64 {
            self.chain_nonce.load(Ordering::SeqCst)
        }

        /// Every attempt as `(nonce, transfer count)`, in submission order.
        pub fn submissions(&self) -> Vec<(Nonce, usize)> {
            self.submissions.lock().unwrap().clone()
        }

        pub fn submissions_started(&self) -> usize {
            self.submissions_started.load(Ordering::SeqCst)
        }

        async fn submit(&self, nonce: Nonce, items: usize) -> Result<SubmissionOutcome> {
            self.submissions_started.fetch_add(1, Ordering::SeqCst);
            if self.gated.swap(false, Ordering::SeqCst) {
                self.gate.notified().await;
            }
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SubmissionOutcome::Finalized);
            self.submissions.lock().unwrap().push((nonce, items));
            if outcome.is_final() {
                self.chain_nonce
                    .fetch_max(nonce.into_inner() + 1, Ordering::SeqCst);
            }
            Ok(outcome)
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn get_account_state(&self, _address: &Address) -> Result<AccountState> {
            if self.hang_state_queries.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let remaining = self.state_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.state_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CourierError::Connection("node unreachable".to_string()));
            }
            Ok(AccountState {
                nonce: Nonce::new(self.chain_nonce.load(Ordering::SeqCst)),
                balance: u128::MAX,
            })
        }

        async fn submit_transfer(
            &self,
            _call: &TransferCall,
            nonce: Nonce,
        ) -> Result<SubmissionOutcome> {
            self.submit(nonce, 1).await
        }

        async fn submit_batch(
            &self,
            call: &BatchTransferCall,
            nonce: Nonce,
        ) -> Result<SubmissionOutcome> {
            self.submit(nonce, call.len()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        let cases = vec![
            (SubmissionOutcome::Finalized, None),
            (SubmissionOutcome::Invalid, Some(ErrorClass::Nonce)),
            (SubmissionOutcome::Usurped, Some(ErrorClass::Nonce)),
            (SubmissionOutcome::Dropped, Some(ErrorClass::Transient)),
        ];

        for (outcome, expected) in cases {
            assert_eq!(outcome.class(), expected, "outcome {outcome:?}");
        }
    }

    #[test]
    fn test_error_reason_classification() {
        let cases = vec![
            ("1010: Invalid Transaction", ErrorClass::Nonce),
            ("Priority is too low: (1 vs 1)", ErrorClass::Nonce),
            ("transaction is stale", ErrorClass::Nonce),
            ("Insufficient balance to keep the account alive", ErrorClass::Fatal),
            ("Funds are unavailable", ErrorClass::Fatal),
            ("malformed call data", ErrorClass::Fatal),
            ("bad signature", ErrorClass::Fatal),
            ("connection reset by peer", ErrorClass::Transient),
            ("timeout waiting for submission response", ErrorClass::Transient),
            // mentions "balance" but is a transport failure, not a verdict
            ("could not query balance: timed out", ErrorClass::Transient),
        ];

        for (reason, expected) in cases {
            let outcome = SubmissionOutcome::Error(reason.to_string());
            assert_eq!(outcome.class(), Some(expected), "reason: {reason}");
        }
    }
}
