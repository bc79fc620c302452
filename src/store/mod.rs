//! Ledger store port: atomic access to tanda records.
//!
//! The store is an explicit interface rather than a shared mutable map so
//! the per-tanda exclusive-section discipline survives a change of
//! backing storage. [`LedgerStore::tanda`] hands out the record *behind
//! its lock*; holding that lock's write guard is what makes every
//! observe-then-mutate sequence atomic, whatever the backing store is.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{PaymentId, TandaId, TandaRecord};
use crate::error::TandaError;

pub use memory::InMemoryLedger;

/// Port for tanda and payment record storage.
///
/// Implementations must hand out one stable lock per tanda: repeated
/// calls to [`LedgerStore::tanda`] for the same id return handles to the
/// same underlying `RwLock`.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Registers a new tanda record and its invite code.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::Internal`] if a record with the same id
    /// already exists (should never happen with UUID v4).
    async fn insert(&self, record: TandaRecord) -> Result<TandaId, TandaError>;

    /// Returns the record for the given tanda behind its per-tanda lock.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::TandaNotFound`] if no such tanda exists.
    async fn tanda(&self, id: TandaId) -> Result<Arc<RwLock<TandaRecord>>, TandaError>;

    /// Resolves an invite code to its tanda id.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::InviteNotFound`] if the code is unknown.
    async fn resolve_invite(&self, code: &str) -> Result<TandaId, TandaError>;

    /// Records which tanda a payment belongs to, so continuations can
    /// find their exclusive section from a payment id alone.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::TandaNotFound`] if the tanda does not exist.
    async fn index_payment(
        &self,
        payment_id: PaymentId,
        tanda_id: TandaId,
    ) -> Result<(), TandaError>;

    /// Looks up the tanda a payment belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::PaymentNotFound`] if the payment id was
    /// never indexed.
    async fn tanda_for_payment(&self, payment_id: PaymentId) -> Result<TandaId, TandaError>;

    /// Returns handles to every stored tanda, for cross-tanda read scans.
    async fn all_tandas(&self) -> Vec<Arc<RwLock<TandaRecord>>>;
}
