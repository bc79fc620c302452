//! In-memory ledger with per-tanda fine-grained locking.
//!
//! [`InMemoryLedger`] stores records in a `HashMap` where each entry is
//! individually protected by a [`tokio::sync::RwLock`]. Reads on the same
//! tanda may run concurrently; writes on different tandas are
//! independent; writes on the same tanda are serialized.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{PaymentId, TandaId, TandaRecord};
use crate::error::TandaError;

use super::LedgerStore;

/// Default in-memory [`LedgerStore`] implementation.
///
/// Outer maps are behind their own `RwLock`s and are held only long
/// enough to resolve a handle; all domain mutation happens under the
/// per-tanda entry lock.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    tandas: RwLock<HashMap<TandaId, Arc<RwLock<TandaRecord>>>>,
    invites: RwLock<HashMap<String, TandaId>>,
    payment_index: RwLock<HashMap<PaymentId, TandaId>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored tandas.
    pub async fn len(&self) -> usize {
        self.tandas.read().await.len()
    }

    /// Returns `true` if no tandas are stored.
    pub async fn is_empty(&self) -> bool {
        self.tandas.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert(&self, record: TandaRecord) -> Result<TandaId, TandaError> {
        let tanda_id = record.tanda.id;
        let invite_code = record.tanda.invite_code.clone();

        let mut map = self.tandas.write().await;
        if map.contains_key(&tanda_id) {
            return Err(TandaError::Internal(format!(
                "tanda {tanda_id} already exists"
            )));
        }
        map.insert(tanda_id, Arc::new(RwLock::new(record)));
        drop(map);

        self.invites.write().await.insert(invite_code, tanda_id);
        Ok(tanda_id)
    }

    async fn tanda(&self, id: TandaId) -> Result<Arc<RwLock<TandaRecord>>, TandaError> {
        let map = self.tandas.read().await;
        map.get(&id)
            .cloned()
            .ok_or(TandaError::TandaNotFound(*id.as_uuid()))
    }

    async fn resolve_invite(&self, code: &str) -> Result<TandaId, TandaError> {
        let invites = self.invites.read().await;
        invites
            .get(code)
            .copied()
            .ok_or_else(|| TandaError::InviteNotFound(code.to_string()))
    }

    async fn index_payment(
        &self,
        payment_id: PaymentId,
        tanda_id: TandaId,
    ) -> Result<(), TandaError> {
        if !self.tandas.read().await.contains_key(&tanda_id) {
            return Err(TandaError::TandaNotFound(*tanda_id.as_uuid()));
        }
        self.payment_index
            .write()
            .await
            .insert(payment_id, tanda_id);
        Ok(())
    }

    async fn tanda_for_payment(&self, payment_id: PaymentId) -> Result<TandaId, TandaError> {
        let index = self.payment_index.read().await;
        index
            .get(&payment_id)
            .copied()
            .ok_or(TandaError::PaymentNotFound(*payment_id.as_uuid()))
    }

    async fn all_tandas(&self) -> Vec<Arc<RwLock<TandaRecord>>> {
        let map = self.tandas.read().await;
        map.values().cloned().collect()
    }
}
