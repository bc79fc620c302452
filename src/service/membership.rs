//! Membership manager: tanda creation, enrollment, and read views.
//!
//! Every mutation follows the pattern: acquire the per-tanda write lock,
//! validate against the evaluator, mutate, release, emit events.

use std::sync::Arc;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::domain::tanda::{InvitePreview, Participant, ParticipantTandaView, Tanda, TandaView};
use crate::domain::{EventBus, TandaEvent, TandaId, TandaRecord, TandaStatus, WalletAddress, evaluator};
use crate::error::TandaError;
use crate::store::LedgerStore;

/// How the creation request expresses the contribution amount.
///
/// The original product let founders state either the per-person amount
/// or the whole pool; both normalize to a per-participant amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionTerms {
    /// Fixed amount each participant pays per round.
    PerParticipant(u64),
    /// Total pool; must divide evenly by the participant count.
    TotalPool(u64),
}

impl ContributionTerms {
    /// Normalizes to the per-participant amount.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::InvalidConfig`] when the amount is zero or a
    /// total pool does not divide evenly by the participant count.
    pub fn per_participant(self, participant_count: u32) -> Result<u64, TandaError> {
        match self {
            Self::PerParticipant(amount) => {
                if amount == 0 {
                    return Err(TandaError::InvalidConfig(
                        "contribution amount must be positive".to_string(),
                    ));
                }
                Ok(amount)
            }
            Self::TotalPool(total) => {
                if total == 0 {
                    return Err(TandaError::InvalidConfig(
                        "pool total must be positive".to_string(),
                    ));
                }
                let count = u64::from(participant_count);
                if count == 0 || total % count != 0 {
                    return Err(TandaError::InvalidConfig(format!(
                        "pool total {total} is not evenly divisible by {participant_count} participants"
                    )));
                }
                Ok(total / count)
            }
        }
    }
}

/// Parameters for creating a tanda.
#[derive(Debug, Clone)]
pub struct CreateTandaRequest {
    /// Group name.
    pub name: String,
    /// Optional free-form description.
    pub description: String,
    /// Founder's display name.
    pub founder_name: String,
    /// Founder's wallet identity.
    pub founder_wallet: WalletAddress,
    /// Contribution amount, per person or as a pool total.
    pub terms: ContributionTerms,
    /// Fixed number of participants (and of rounds).
    pub participant_count: u32,
}

/// Enrollment and read-side operations for tandas.
#[derive(Debug)]
pub struct MembershipManager {
    store: Arc<dyn LedgerStore>,
    event_bus: EventBus,
    invite_base_url: String,
}

impl MembershipManager {
    /// Creates a membership manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, event_bus: EventBus, config: &EngineConfig) -> Self {
        Self {
            store,
            event_bus,
            invite_base_url: config.invite_base_url.clone(),
        }
    }

    /// Creates a tanda with the founder auto-enrolled at position 1.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::InvalidConfig`] for a participant count
    /// below 2, a non-positive or non-divisible amount, an overflowing
    /// pool total, or an empty founder wallet.
    pub async fn create_tanda(&self, request: CreateTandaRequest) -> Result<TandaView, TandaError> {
        if request.participant_count < 2 {
            return Err(TandaError::InvalidConfig(
                "a tanda needs at least 2 participants".to_string(),
            ));
        }
        if request.founder_wallet.is_empty() {
            return Err(TandaError::InvalidConfig(
                "founder wallet identity must not be empty".to_string(),
            ));
        }
        if request.name.trim().is_empty() {
            return Err(TandaError::InvalidConfig(
                "tanda name must not be empty".to_string(),
            ));
        }
        let contribution_amount = request.terms.per_participant(request.participant_count)?;
        if contribution_amount
            .checked_mul(u64::from(request.participant_count - 1))
            .is_none()
        {
            return Err(TandaError::InvalidConfig(
                "pool total overflows the amount range".to_string(),
            ));
        }

        let founder = Participant::new(request.founder_name, request.founder_wallet, 1, true);
        let tanda = Tanda::new(
            request.name,
            request.description,
            contribution_amount,
            request.participant_count,
            founder,
            &self.invite_base_url,
        );
        let view = TandaView::from(&tanda);
        let event = TandaEvent::TandaCreated {
            tanda_id: tanda.id,
            name: tanda.name.clone(),
            contribution_amount,
            participant_count: tanda.participant_count,
            timestamp: tanda.created_at,
        };

        let tanda_id = self.store.insert(TandaRecord::new(tanda)).await?;
        self.event_bus.publish(event);
        tracing::info!(%tanda_id, contribution_amount, participant_count = view.participant_count, "tanda created");
        Ok(view)
    }

    /// Enrolls a wallet into a tanda at the next sequential position.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::NotOpen`] once the tanda stopped accepting
    /// members, [`TandaError::AlreadyMember`] for a duplicate wallet,
    /// [`TandaError::Full`] when every slot is taken, and
    /// [`TandaError::Halted`] for a frozen tanda.
    pub async fn join_tanda(
        &self,
        tanda_id: TandaId,
        wallet: WalletAddress,
        display_name: impl Into<String> + Send,
    ) -> Result<TandaView, TandaError> {
        let record_lock = self.store.tanda(tanda_id).await?;
        let mut record = record_lock.write().await;
        record.ensure_not_halted()?;

        let status = evaluator::status(&record.tanda);
        if status != TandaStatus::Open {
            return Err(TandaError::NotOpen(status));
        }
        if record.tanda.participant_by_wallet(&wallet).is_some() {
            return Err(TandaError::AlreadyMember);
        }
        let joined = record.tanda.participants.len() as u32;
        if joined >= record.tanda.participant_count {
            return Err(TandaError::Full);
        }

        let position = joined + 1;
        let participant = Participant::new(display_name, wallet, position, false);
        let joined_event = TandaEvent::ParticipantJoined {
            tanda_id,
            participant_id: participant.id,
            position,
            display_name: participant.display_name.clone(),
            timestamp: participant.joined_at,
        };
        record.tanda.participants.push(participant);

        let filled = position == record.tanda.participant_count;
        if filled {
            record.tanda.filled_at = Some(Utc::now());
        }
        let view = TandaView::from(&record.tanda);
        drop(record);

        self.event_bus.publish(joined_event);
        if filled {
            self.event_bus.publish(TandaEvent::TandaFilled {
                tanda_id,
                timestamp: Utc::now(),
            });
            tracing::info!(%tanda_id, "last slot filled; tanda is full");
        }
        tracing::info!(%tanda_id, position, "participant joined");
        Ok(view)
    }

    /// Resolves an invite code and enrolls the wallet.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::InviteNotFound`] for an unknown code, plus
    /// every failure mode of [`Self::join_tanda`].
    pub async fn join_by_invite(
        &self,
        invite_code: &str,
        wallet: WalletAddress,
        display_name: impl Into<String> + Send,
    ) -> Result<TandaView, TandaError> {
        let tanda_id = self.store.resolve_invite(invite_code).await?;
        self.join_tanda(tanda_id, wallet, display_name).await
    }

    /// What a prospective member sees behind an invite link.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::InviteNotFound`] for an unknown code.
    pub async fn invite_preview(&self, invite_code: &str) -> Result<InvitePreview, TandaError> {
        let tanda_id = self.store.resolve_invite(invite_code).await?;
        let record_lock = self.store.tanda(tanda_id).await?;
        let record = record_lock.read().await;
        Ok(InvitePreview::from(&record.tanda))
    }

    /// Full view of a tanda with derived status and next recipient.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::TandaNotFound`] for an unknown id.
    pub async fn get_tanda(&self, tanda_id: TandaId) -> Result<TandaView, TandaError> {
        let record_lock = self.store.tanda(tanda_id).await?;
        let record = record_lock.read().await;
        Ok(TandaView::from(&record.tanda))
    }

    /// Every tanda the wallet participates in, one row per membership.
    pub async fn participant_tandas(&self, wallet: &WalletAddress) -> Vec<ParticipantTandaView> {
        let mut rows = Vec::new();
        for record_lock in self.store.all_tandas().await {
            let record = record_lock.read().await;
            if let Some(row) = ParticipantTandaView::for_wallet(&record.tanda, wallet) {
                rows.push(row);
            }
        }
        rows
    }
}
