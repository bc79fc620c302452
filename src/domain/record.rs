//! Tanda record: the per-tanda unit of mutual exclusion.

use std::collections::HashMap;

use crate::error::TandaError;

use super::id::{ParticipantId, PaymentId};
use super::payment::Payment;
use super::tanda::Tanda;

/// A tanda together with its payment set and halt flag.
///
/// The ledger store hands out each record behind one
/// `Arc<tokio::sync::RwLock<TandaRecord>>`; every mutating operation
/// (join, contribution submission, continuation, settlement) holds the
/// write lock for its full duration, gateway call included, so no two
/// operations can observe-then-mutate the same tanda concurrently.
#[derive(Debug)]
pub struct TandaRecord {
    /// Membership and round state.
    pub tanda: Tanda,
    /// Every contribution attempt against this tanda, by payment id.
    pub payments: HashMap<PaymentId, Payment>,
    /// Set after an invariant violation; blocks all further mutation.
    pub halted: bool,
}

impl TandaRecord {
    /// Wraps a freshly created tanda with an empty payment set.
    #[must_use]
    pub fn new(tanda: Tanda) -> Self {
        Self {
            tanda,
            payments: HashMap::new(),
            halted: false,
        }
    }

    /// Rejects mutation of a halted tanda.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::Halted`] if an invariant violation has frozen
    /// this tanda.
    pub fn ensure_not_halted(&self) -> Result<(), TandaError> {
        if self.halted {
            return Err(TandaError::Halted(*self.tanda.id.as_uuid()));
        }
        Ok(())
    }

    /// Whether a blocking payment already exists for the given round and
    /// participant (the at-most-one Completed/PendingAuthorization
    /// invariant).
    #[must_use]
    pub fn has_blocking_payment(&self, round: u32, participant_id: ParticipantId) -> bool {
        self.payments.values().any(|p| {
            p.round == round && p.participant_id == participant_id && p.blocks_resubmission()
        })
    }
}
