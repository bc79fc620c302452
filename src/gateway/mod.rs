//! Payment gateway port: the only door to actual fund movement.
//!
//! The settlement engine calls [`PaymentGateway::transfer`] to move a
//! contribution into the pool wallet and a payout out of it, and
//! [`PaymentGateway::continue_transfer`] to resume a transfer that needed
//! interactive authorization. The adapter never decides tanda state and
//! never retries; retry policy belongs to the caller.

pub mod mock;

use async_trait::async_trait;
use std::fmt;

use crate::domain::WalletAddress;

pub use mock::MockGateway;

/// Proof of a settled transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Gateway-assigned reference for the settled transfer.
    pub reference: String,
}

/// Result of initiating a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Funds moved immediately.
    Settled(TransferReceipt),
    /// The source wallet's owner must authorize the transfer first.
    Pending {
        /// Opaque token the gateway needs to resume the transfer.
        continuation_token: String,
        /// URL where the wallet owner grants authorization.
        authorization_url: String,
    },
}

/// Gateway failure modes.
///
/// `Declined` is terminal for the attempted transfer; `Unavailable`
/// covers transport errors, timeouts, and authorizations that have not
/// been granted yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The gateway rejected the transfer outright.
    #[error("transfer declined: {0}")]
    Declined(String),

    /// The gateway could not be reached or is not ready to settle.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Capability interface for moving funds between wallets.
///
/// Implementations talk to a payment network (grants, quotes, outgoing
/// payments); the engine only sees settled/pending/failed.
#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Moves `amount` from `source` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Declined`] when the network rejects the
    /// transfer and [`TransferError::Unavailable`] when it cannot be
    /// completed right now.
    async fn transfer(
        &self,
        source: &WalletAddress,
        destination: &WalletAddress,
        amount: u64,
        memo: Option<&str>,
    ) -> Result<TransferOutcome, TransferError>;

    /// Resumes a transfer that required interactive authorization.
    ///
    /// `proof` is the opaque evidence of the completed interaction
    /// (e.g. the interact reference from a finalized grant).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Declined`] when the authorization was
    /// refused and [`TransferError::Unavailable`] when the grant is not
    /// finalized yet.
    async fn continue_transfer(
        &self,
        continuation_token: &str,
        proof: &str,
    ) -> Result<TransferReceipt, TransferError>;
}
