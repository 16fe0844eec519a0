//! One submission attempt: allocate a nonce, submit, classify the result.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    chain_client::{BatchTransferCall, ChainClient, SubmissionOutcome, TransferCall},
    errors::{CourierError, ErrorClass, Result},
    nonce_manager::NonceManager,
    types::{GroupKey, Nonce, TransferRequest},
};

/// Result of a single dispatch attempt, batch or individual.
#[derive(Clone, Debug)]
pub struct DispatchOutcome {
    pub success: bool,
    pub class: Option<ErrorClass>,
    pub reason: Option<String>,
}

impl DispatchOutcome {
    pub fn delivered() -> Self {
        Self {
            success: true,
            class: None,
            reason: None,
        }
    }

    pub fn failed(class: ErrorClass, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            class: Some(class),
            reason: Some(reason.into()),
        }
    }
}

pub struct Dispatcher {
    chain: Arc<dyn ChainClient>,
    nonces: Arc<NonceManager>,
}

impl Dispatcher {
    pub fn new(chain: Arc<dyn ChainClient>, nonces: Arc<NonceManager>) -> Self {
        Self { chain, nonces }
    }

    /// Submit one transfer under a freshly allocated nonce.
    pub async fn submit_single(&self, request: &TransferRequest) -> DispatchOutcome {
        let nonce = match self.allocate().await {
            Ok(nonce) => nonce,
            Err(outcome) => return outcome,
        };
        let call = TransferCall {
            recipient: request.recipient.clone(),
            collection: request.collection,
            token: request.token,
            amount: request.amount,
        };
        info!(
            "📝 submitting transfer of {} to {} with nonce {nonce}",
            request.group_key(),
            request.recipient_tag()
        );
        let result = self.chain.submit_transfer(&call, nonce).await;
        self.conclude(result, nonce, 1).await
    }

    /// Submit a whole group slice as one batch call consuming one nonce.
    /// The attempt succeeds or fails as a unit.
    pub async fn submit_batch(
        &self,
        key: GroupKey,
        requests: &[TransferRequest],
    ) -> DispatchOutcome {
        let nonce = match self.allocate().await {
            Ok(nonce) => nonce,
            Err(outcome) => return outcome,
        };
        let call = BatchTransferCall {
            collection: key.collection,
            token: key.token,
            transfers: requests
                .iter()
                .map(|r| (r.recipient.clone(), r.amount))
                .collect(),
        };
        info!(
            "📝 submitting batch of {} transfers of {key} with nonce {nonce}",
            requests.len()
        );
        let result = self.chain.submit_batch(&call, nonce).await;
        self.conclude(result, nonce, requests.len()).await
    }

    /// Allocation failures are retryable: a lock timeout is backpressure and
    /// a connection error may clear, so both come back as transient.
    async fn allocate(&self) -> std::result::Result<Nonce, DispatchOutcome> {
        match self.nonces.allocate().await {
            Ok(nonce) => Ok(nonce),
            Err(err @ CourierError::LockTimeout) => {
                warn!("nonce allocation backpressure: {err}");
                Err(DispatchOutcome::failed(ErrorClass::Transient, err.to_string()))
            }
            Err(err) => {
                error!("nonce allocation failed: {err}");
                Err(DispatchOutcome::failed(ErrorClass::Transient, err.to_string()))
            }
        }
    }

    async fn conclude(
        &self,
        result: Result<SubmissionOutcome>,
        nonce: Nonce,
        items: usize,
    ) -> DispatchOutcome {
        let (class, description) = match result {
            Ok(outcome) => match outcome.class() {
                None => {
                    info!("✅ submission with nonce {nonce} finalized ({items} transfer(s))");
                    return DispatchOutcome::delivered();
                }
                Some(class) => (class, outcome.describe()),
            },
            Err(err) => {
                let class = if matches!(err, CourierError::Nonce(_)) {
                    ErrorClass::Nonce
                } else {
                    ErrorClass::Transient
                };
                (class, err.to_string())
            }
        };

        match class {
            ErrorClass::Nonce => {
                warn!("⚠️ chain rejected nonce {nonce}: {description}; resynchronizing");
                if let Err(err) = self.nonces.resynchronize().await {
                    // keep the original classification; the retry will hit
                    // its own allocation failure if the chain stays down
                    error!("nonce resynchronization failed: {err}");
                }
            }
            _ => {
                error!("❌ submission with nonce {nonce} failed ({class}): {description}");
            }
        }
        DispatchOutcome::failed(class, description)
    }
}
