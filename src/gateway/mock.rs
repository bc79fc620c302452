//! Scripted in-memory gateway for tests and embedding demos.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::domain::WalletAddress;

use super::{PaymentGateway, TransferError, TransferOutcome, TransferReceipt};

/// Next scripted response for [`MockGateway::transfer`] or
/// [`MockGateway::continue_transfer`].
#[derive(Debug, Clone)]
pub enum ScriptedTransfer {
    /// Settle immediately with a generated reference.
    Settle,
    /// Ask for interactive authorization.
    Pending {
        /// Authorization URL to hand back.
        authorization_url: String,
    },
    /// Reject the transfer terminally.
    Decline(String),
    /// Fail transiently (transport error, grant not finalized).
    Unavailable(String),
    /// Never respond; lets callers exercise their timeout bound.
    Hang,
}

/// A transfer the mock observed, kept for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    /// Source wallet.
    pub source: WalletAddress,
    /// Destination wallet.
    pub destination: WalletAddress,
    /// Amount moved (or attempted).
    pub amount: u64,
    /// Memo passed by the caller.
    pub memo: Option<String>,
}

/// In-memory [`PaymentGateway`] with scripted outcomes.
///
/// With an empty script every transfer settles immediately; enqueue
/// [`ScriptedTransfer`]s to exercise pending-authorization, decline,
/// transient-failure, and timeout paths. Settled transfers are recorded
/// so tests can assert exactly-once payout behavior.
#[derive(Debug, Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<ScriptedTransfer>>,
    recorded: Mutex<Vec<RecordedTransfer>>,
    reference_counter: AtomicU64,
}

impl MockGateway {
    /// Creates a gateway that settles every transfer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next scripted response.
    pub fn enqueue(&self, scripted: ScriptedTransfer) {
        self.lock_script().push_back(scripted);
    }

    /// Number of transfers the gateway actually settled.
    #[must_use]
    pub fn settled_count(&self) -> usize {
        self.lock_recorded().len()
    }

    /// Snapshot of every settled transfer, in order.
    #[must_use]
    pub fn settled_transfers(&self) -> Vec<RecordedTransfer> {
        self.lock_recorded().clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedTransfer>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_recorded(&self) -> std::sync::MutexGuard<'_, Vec<RecordedTransfer>> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reference(&self) -> String {
        let n = self.reference_counter.fetch_add(1, Ordering::Relaxed);
        format!("xfer-{n}")
    }

    fn next_scripted(&self) -> ScriptedTransfer {
        self.lock_script()
            .pop_front()
            .unwrap_or(ScriptedTransfer::Settle)
    }

    fn settle(
        &self,
        source: &WalletAddress,
        destination: &WalletAddress,
        amount: u64,
        memo: Option<&str>,
    ) -> TransferReceipt {
        self.lock_recorded().push(RecordedTransfer {
            source: source.clone(),
            destination: destination.clone(),
            amount,
            memo: memo.map(str::to_string),
        });
        TransferReceipt {
            reference: self.next_reference(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn transfer(
        &self,
        source: &WalletAddress,
        destination: &WalletAddress,
        amount: u64,
        memo: Option<&str>,
    ) -> Result<TransferOutcome, TransferError> {
        match self.next_scripted() {
            ScriptedTransfer::Settle => Ok(TransferOutcome::Settled(self.settle(
                source,
                destination,
                amount,
                memo,
            ))),
            ScriptedTransfer::Pending { authorization_url } => Ok(TransferOutcome::Pending {
                continuation_token: format!("cont-{}", self.next_reference()),
                authorization_url,
            }),
            ScriptedTransfer::Decline(reason) => Err(TransferError::Declined(reason)),
            ScriptedTransfer::Unavailable(reason) => Err(TransferError::Unavailable(reason)),
            ScriptedTransfer::Hang => {
                std::future::pending::<()>().await;
                Err(TransferError::Unavailable("unreachable".to_string()))
            }
        }
    }

    async fn continue_transfer(
        &self,
        _continuation_token: &str,
        proof: &str,
    ) -> Result<TransferReceipt, TransferError> {
        match self.next_scripted() {
            ScriptedTransfer::Settle => {
                // Record under an opaque source; continuation settles the
                // transfer that was previously left pending.
                let source = WalletAddress::from(format!("continued:{proof}"));
                let destination = WalletAddress::from("pool");
                Ok(self.settle(&source, &destination, 0, None))
            }
            ScriptedTransfer::Pending { .. } | ScriptedTransfer::Unavailable(_) => Err(
                TransferError::Unavailable("authorization not finalized".to_string()),
            ),
            ScriptedTransfer::Decline(reason) => Err(TransferError::Declined(reason)),
            ScriptedTransfer::Hang => {
                std::future::pending::<()>().await;
                Err(TransferError::Unavailable("unreachable".to_string()))
            }
        }
    }
}
