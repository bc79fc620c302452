//! Settlement engine: the round-settlement state machine.
//!
//! Accepts contributions, finalizes pending authorizations, and settles
//! completed rounds. Every mutating path acquires the per-tanda write
//! lock and holds it across the gateway call, so two concurrent
//! last-contributions can never both trigger a payout: the second one
//! waits, re-observes the advanced round, and finds nothing to settle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::domain::tanda::{Participant, TandaView};
use crate::domain::{
    EventBus, Payment, PaymentContinuation, PaymentId, PaymentStatus, TandaEvent, TandaId,
    TandaRecord, TandaStatus, WalletAddress, evaluator,
};
use crate::error::TandaError;
use crate::gateway::{PaymentGateway, TransferError, TransferOutcome, TransferReceipt};
use crate::store::LedgerStore;

/// Result of a successful round settlement.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSettlement {
    /// Tanda identifier.
    pub tanda_id: TandaId,
    /// The round that settled.
    pub round: u32,
    /// Recipient, with `has_received` already set.
    pub recipient: Participant,
    /// Disbursed pool amount.
    pub amount: u64,
    /// Gateway reference for the payout transfer.
    pub gateway_reference: String,
    /// Round counter after settlement (unchanged for the final round).
    pub current_round: u32,
    /// Derived status after settlement.
    pub status: TandaStatus,
}

/// What happened when a completed round's settlement was attempted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The pool was disbursed and the round advanced.
    Settled(RoundSettlement),
    /// The payout failed; the round stays complete-but-unsettled and
    /// [`SettlementEngine::settle_round`] may be retried.
    Failed {
        /// The round whose payout failed.
        round: u32,
        /// Failure description.
        reason: String,
    },
}

/// Result of submitting or finalizing a contribution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContributionOutcome {
    /// The contribution settled into the pool.
    Completed {
        /// The completed payment record.
        payment: Payment,
        /// Settlement attempt, present when this contribution completed
        /// the round.
        settlement: Option<SettlementOutcome>,
    },
    /// The participant must authorize the transfer before it settles.
    RequiresAuth {
        /// The parked payment record.
        payment: Payment,
        /// Where the participant grants authorization.
        authorization_url: String,
    },
}

/// Contribution tally for the effective round of a tanda.
#[derive(Debug, Clone, Serialize)]
pub struct RoundProgress {
    /// Tanda identifier.
    pub tanda_id: TandaId,
    /// The effective round being tallied.
    pub round: u32,
    /// Recipient owed this round's pool, if one remains.
    pub recipient: Option<Participant>,
    /// Contributions required to complete the round.
    pub contributions_required: u32,
    /// Settled contributions so far.
    pub completed: u32,
    /// Contributions parked awaiting authorization.
    pub pending_authorization: u32,
    /// Failed contribution attempts.
    pub failed: u32,
    /// Contribution attempts still in flight.
    pub processing: u32,
    /// Whether the round has collected every required contribution.
    pub complete: bool,
}

/// Orchestrator for contributions and round settlement.
#[derive(Debug)]
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_bus: EventBus,
    pool_wallet: WalletAddress,
    gateway_timeout: Duration,
}

impl SettlementEngine {
    /// Creates a settlement engine over the given store and gateway.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_bus: EventBus,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            event_bus,
            pool_wallet: config.pool_wallet.clone(),
            gateway_timeout: config.gateway_timeout(),
        }
    }

    /// Submits a contribution toward the effective round.
    ///
    /// Validation happens in a fixed order under the per-tanda write
    /// lock; the gateway transfer (participant → pool) runs under the
    /// same lock, bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::WrongPhase`] after the tanda completed,
    /// [`TandaError::NotAMember`], [`TandaError::RecipientCannotPay`],
    /// [`TandaError::WrongAmount`], [`TandaError::AlreadyPaid`],
    /// [`TandaError::Gateway`] when the transfer fails or times out (the
    /// payment is recorded as failed), and [`TandaError::Halted`] for a
    /// frozen tanda.
    pub async fn submit_contribution(
        &self,
        tanda_id: TandaId,
        wallet: &WalletAddress,
        amount: u64,
    ) -> Result<ContributionOutcome, TandaError> {
        let record_lock = self.store.tanda(tanda_id).await?;
        let mut record = record_lock.write().await;
        record.ensure_not_halted()?;

        let status = evaluator::status(&record.tanda);
        if status == TandaStatus::Completed {
            return Err(TandaError::WrongPhase(status));
        }
        let participant = record
            .tanda
            .participant_by_wallet(wallet)
            .cloned()
            .ok_or(TandaError::NotAMember)?;
        // The recipient is exempt once rounds run; during pre-fund the
        // future round-1 recipient may still contribute.
        if record.tanda.current_round > 0
            && evaluator::next_recipient(&record.tanda).is_some_and(|r| r.id == participant.id)
        {
            return Err(TandaError::RecipientCannotPay);
        }
        if amount != record.tanda.contribution_amount {
            return Err(TandaError::WrongAmount {
                expected: record.tanda.contribution_amount,
                actual: amount,
            });
        }
        let round = evaluator::effective_round(&record.tanda);
        if record.has_blocking_payment(round, participant.id) {
            return Err(TandaError::AlreadyPaid(round));
        }

        let mut payment = Payment::new(tanda_id, participant.id, round, amount);
        self.store.index_payment(payment.id, tanda_id).await?;
        tracing::info!(
            %tanda_id,
            payment_id = %payment.id,
            participant = %participant.wallet,
            round,
            "contribution initiated"
        );

        let memo = format!("tanda {} round {round} contribution", record.tanda.name);
        let transfer = self
            .transfer_bounded(&participant.wallet, &self.pool_wallet, amount, Some(&memo))
            .await;
        match transfer {
            Ok(TransferOutcome::Pending {
                continuation_token,
                authorization_url,
            }) => {
                payment.mark_pending(PaymentContinuation {
                    continuation_token,
                    authorization_url: authorization_url.clone(),
                });
                record.payments.insert(payment.id, payment.clone());
                drop(record);
                self.event_bus.publish(TandaEvent::ContributionPending {
                    tanda_id,
                    payment_id: payment.id,
                    participant_id: participant.id,
                    round,
                    authorization_url: authorization_url.clone(),
                    timestamp: Utc::now(),
                });
                tracing::info!(%tanda_id, payment_id = %payment.id, "contribution awaiting authorization");
                Ok(ContributionOutcome::RequiresAuth {
                    payment,
                    authorization_url,
                })
            }
            Ok(TransferOutcome::Settled(receipt)) => {
                payment.complete(receipt.reference);
                record.payments.insert(payment.id, payment.clone());
                self.event_bus.publish(TandaEvent::ContributionCompleted {
                    tanda_id,
                    payment_id: payment.id,
                    participant_id: participant.id,
                    round,
                    amount,
                    timestamp: Utc::now(),
                });
                let settlement = self.maybe_settle(&mut record).await;
                drop(record);
                Ok(ContributionOutcome::Completed {
                    payment,
                    settlement,
                })
            }
            Err(err) => {
                payment.fail(err.to_string());
                record.payments.insert(payment.id, payment.clone());
                drop(record);
                self.event_bus.publish(TandaEvent::ContributionFailed {
                    tanda_id,
                    payment_id: payment.id,
                    participant_id: participant.id,
                    round,
                    reason: err.to_string(),
                    timestamp: Utc::now(),
                });
                tracing::warn!(%tanda_id, payment_id = %payment.id, error = %err, "contribution transfer failed");
                Err(TandaError::Gateway(err.to_string()))
            }
        }
    }

    /// Finalizes a contribution that was awaiting authorization.
    ///
    /// On settlement the payment completes and the round-completion check
    /// reruns exactly as in [`Self::submit_contribution`]. A declined
    /// continuation demotes the payment to failed; a transient failure
    /// (or timeout) leaves it pending for a later retry, so the pending
    /// record is never silently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::PaymentNotFound`] for an unknown payment,
    /// [`TandaError::NotPending`] unless the payment awaits
    /// authorization, [`TandaError::Gateway`] for either gateway failure
    /// mode, and [`TandaError::Halted`] for a frozen tanda.
    pub async fn complete_pending_payment(
        &self,
        payment_id: PaymentId,
        proof: &str,
    ) -> Result<ContributionOutcome, TandaError> {
        let tanda_id = self.store.tanda_for_payment(payment_id).await?;
        let record_lock = self.store.tanda(tanda_id).await?;
        let mut record = record_lock.write().await;
        record.ensure_not_halted()?;

        let stored = record
            .payments
            .get(&payment_id)
            .ok_or(TandaError::PaymentNotFound(*payment_id.as_uuid()))?;
        if stored.status != PaymentStatus::PendingAuthorization {
            return Err(TandaError::NotPending(stored.status));
        }
        let continuation = stored.continuation.clone().ok_or_else(|| {
            TandaError::Internal("pending payment is missing its continuation".to_string())
        })?;
        let participant_id = stored.participant_id;
        let round = stored.round;
        let amount = stored.amount;

        let continued = self
            .continue_bounded(&continuation.continuation_token, proof)
            .await;
        match continued {
            Ok(receipt) => {
                let payment = {
                    let stored = record.payments.get_mut(&payment_id).ok_or(
                        TandaError::PaymentNotFound(*payment_id.as_uuid()),
                    )?;
                    stored.complete(receipt.reference);
                    stored.clone()
                };
                self.event_bus.publish(TandaEvent::ContributionCompleted {
                    tanda_id,
                    payment_id,
                    participant_id,
                    round,
                    amount,
                    timestamp: Utc::now(),
                });
                tracing::info!(%tanda_id, %payment_id, round, "pending contribution completed");
                let settlement = self.maybe_settle(&mut record).await;
                drop(record);
                Ok(ContributionOutcome::Completed {
                    payment,
                    settlement,
                })
            }
            Err(TransferError::Declined(reason)) => {
                if let Some(stored) = record.payments.get_mut(&payment_id) {
                    stored.fail(reason.clone());
                }
                drop(record);
                self.event_bus.publish(TandaEvent::ContributionFailed {
                    tanda_id,
                    payment_id,
                    participant_id,
                    round,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                tracing::warn!(%tanda_id, %payment_id, %reason, "continuation declined; payment failed");
                Err(TandaError::Gateway(reason))
            }
            Err(TransferError::Unavailable(reason)) => {
                // Payment stays PendingAuthorization; the caller may retry.
                drop(record);
                tracing::warn!(%tanda_id, %payment_id, %reason, "continuation not finalized; payment still pending");
                Err(TandaError::Gateway(reason))
            }
        }
    }

    /// Settles the effective round if it is complete.
    ///
    /// This is the public retry entry for a round whose payout previously
    /// failed; the contribution path invokes the same internal settlement
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::RoundNotComplete`] when contributions are
    /// still missing, [`TandaError::NoRecipient`] on a corrupted record
    /// (the tanda is halted), [`TandaError::Gateway`] when the payout
    /// transfer fails, and [`TandaError::Halted`] for a frozen tanda.
    pub async fn settle_round(&self, tanda_id: TandaId) -> Result<RoundSettlement, TandaError> {
        let record_lock = self.store.tanda(tanda_id).await?;
        let mut record = record_lock.write().await;
        record.ensure_not_halted()?;

        if !evaluator::is_round_complete(&record.tanda, record.payments.values()) {
            return Err(TandaError::RoundNotComplete(evaluator::effective_round(
                &record.tanda,
            )));
        }
        self.settle_locked(&mut record).await
    }

    /// Formally starts rounds without waiting for pre-fund completion.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::WrongPhase`] unless the tanda is full with
    /// rounds not yet started, and [`TandaError::Halted`] for a frozen
    /// tanda.
    pub async fn start_rounds(&self, tanda_id: TandaId) -> Result<TandaView, TandaError> {
        let record_lock = self.store.tanda(tanda_id).await?;
        let mut record = record_lock.write().await;
        record.ensure_not_halted()?;

        let status = evaluator::status(&record.tanda);
        if status != TandaStatus::Full {
            return Err(TandaError::WrongPhase(status));
        }
        record.tanda.current_round = 1;
        let view = TandaView::from(&record.tanda);
        drop(record);

        self.event_bus.publish(TandaEvent::RoundsStarted {
            tanda_id,
            round: 1,
            timestamp: Utc::now(),
        });
        tracing::info!(%tanda_id, "rounds formally started");
        Ok(view)
    }

    /// Returns a payment record by id.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::PaymentNotFound`] for an unknown id.
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, TandaError> {
        let tanda_id = self.store.tanda_for_payment(payment_id).await?;
        let record_lock = self.store.tanda(tanda_id).await?;
        let record = record_lock.read().await;
        record
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or(TandaError::PaymentNotFound(*payment_id.as_uuid()))
    }

    /// Contribution tally for the effective round.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::TandaNotFound`] for an unknown tanda.
    pub async fn round_progress(&self, tanda_id: TandaId) -> Result<RoundProgress, TandaError> {
        let record_lock = self.store.tanda(tanda_id).await?;
        let record = record_lock.read().await;
        let round = evaluator::effective_round(&record.tanda);

        let mut completed = 0u32;
        let mut pending_authorization = 0u32;
        let mut failed = 0u32;
        let mut processing = 0u32;
        for payment in record.payments.values().filter(|p| p.round == round) {
            match payment.status {
                PaymentStatus::Completed => completed += 1,
                PaymentStatus::PendingAuthorization => pending_authorization += 1,
                PaymentStatus::Failed => failed += 1,
                PaymentStatus::Processing => processing += 1,
            }
        }

        Ok(RoundProgress {
            tanda_id,
            round,
            recipient: evaluator::next_recipient(&record.tanda).cloned(),
            contributions_required: record.tanda.participant_count.saturating_sub(1),
            completed,
            pending_authorization,
            failed,
            processing,
            complete: evaluator::is_round_complete(&record.tanda, record.payments.values()),
        })
    }

    /// Runs settlement when the just-completed contribution closed the
    /// round; converts payout failures into a reportable outcome instead
    /// of failing the contribution that succeeded.
    async fn maybe_settle(&self, record: &mut TandaRecord) -> Option<SettlementOutcome> {
        if !evaluator::is_round_complete(&record.tanda, record.payments.values()) {
            return None;
        }
        let round = evaluator::effective_round(&record.tanda);
        match self.settle_locked(record).await {
            Ok(settlement) => Some(SettlementOutcome::Settled(settlement)),
            Err(err) => Some(SettlementOutcome::Failed {
                round,
                reason: err.to_string(),
            }),
        }
    }

    /// Settles the effective round. Caller holds the per-tanda write lock
    /// and has verified `is_round_complete`.
    async fn settle_locked(
        &self,
        record: &mut TandaRecord,
    ) -> Result<RoundSettlement, TandaError> {
        let tanda_id = record.tanda.id;
        // First close formally starts rounds.
        if record.tanda.current_round == 0 {
            record.tanda.current_round = 1;
        }
        let round = record.tanda.current_round;

        let Some(recipient) = evaluator::next_recipient(&record.tanda).cloned() else {
            record.halted = true;
            tracing::error!(
                %tanda_id,
                round,
                "invariant violation: round complete but no eligible recipient; halting tanda"
            );
            return Err(TandaError::NoRecipient {
                tanda_id: *tanda_id.as_uuid(),
                round,
            });
        };

        let amount = evaluator::payout_amount(&record.tanda);
        let memo = format!("tanda {} round {round} payout", record.tanda.name);
        let receipt = match self
            .transfer_bounded(&self.pool_wallet, &recipient.wallet, amount, Some(&memo))
            .await
        {
            Ok(TransferOutcome::Settled(receipt)) => receipt,
            Ok(TransferOutcome::Pending { .. }) => {
                // The pool wallet is server-owned; its transfers must not
                // need interactive authorization.
                let reason = "payout transfer unexpectedly requires authorization".to_string();
                self.report_payout_failure(tanda_id, round, &reason);
                return Err(TandaError::Gateway(reason));
            }
            Err(err) => {
                self.report_payout_failure(tanda_id, round, &err.to_string());
                return Err(TandaError::Gateway(err.to_string()));
            }
        };

        let now = Utc::now();
        let recipient = record.tanda.mark_received(recipient.id, now).ok_or_else(|| {
            TandaError::Internal("recipient disappeared during settlement".to_string())
        })?;
        if round < record.tanda.participant_count {
            record.tanda.current_round = round + 1;
        }
        let status = evaluator::status(&record.tanda);
        if status == TandaStatus::Completed {
            record.tanda.completed_at = Some(now);
        }

        self.event_bus.publish(TandaEvent::RoundSettled {
            tanda_id,
            round,
            recipient_id: recipient.id,
            amount,
            gateway_reference: receipt.reference.clone(),
            timestamp: now,
        });
        tracing::info!(
            %tanda_id,
            round,
            recipient = %recipient.wallet,
            amount,
            "round settled"
        );
        if status == TandaStatus::Completed {
            self.event_bus.publish(TandaEvent::TandaCompleted {
                tanda_id,
                timestamp: now,
            });
            tracing::info!(%tanda_id, "every position has received; tanda completed");
        }

        Ok(RoundSettlement {
            tanda_id,
            round,
            recipient,
            amount,
            gateway_reference: receipt.reference,
            current_round: record.tanda.current_round,
            status,
        })
    }

    fn report_payout_failure(&self, tanda_id: TandaId, round: u32, reason: &str) {
        tracing::warn!(
            %tanda_id,
            round,
            reason,
            "payout transfer failed; round remains complete but unsettled"
        );
        self.event_bus.publish(TandaEvent::PayoutFailed {
            tanda_id,
            round,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn transfer_bounded(
        &self,
        source: &WalletAddress,
        destination: &WalletAddress,
        amount: u64,
        memo: Option<&str>,
    ) -> Result<TransferOutcome, TransferError> {
        match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.transfer(source, destination, amount, memo),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransferError::Unavailable(format!(
                "gateway did not answer within {}s",
                self.gateway_timeout.as_secs()
            ))),
        }
    }

    async fn continue_bounded(
        &self,
        continuation_token: &str,
        proof: &str,
    ) -> Result<TransferReceipt, TransferError> {
        match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.continue_transfer(continuation_token, proof),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransferError::Unavailable(format!(
                "gateway did not answer within {}s",
                self.gateway_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use crate::gateway::mock::ScriptedTransfer;
    use crate::service::membership::{ContributionTerms, CreateTandaRequest, MembershipManager};
    use crate::store::InMemoryLedger;

    struct Fixture {
        store: Arc<InMemoryLedger>,
        gateway: Arc<MockGateway>,
        membership: MembershipManager,
        engine: SettlementEngine,
        bus: EventBus,
    }

    fn fixture() -> Fixture {
        fixture_with_config(EngineConfig::default())
    }

    fn fixture_with_config(config: EngineConfig) -> Fixture {
        let store = Arc::new(InMemoryLedger::new());
        let gateway = Arc::new(MockGateway::new());
        let bus = EventBus::new(256);
        let membership = MembershipManager::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            bus.clone(),
            &config,
        );
        let engine = SettlementEngine::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            bus.clone(),
            &config,
        );
        Fixture {
            store,
            gateway,
            membership,
            engine,
            bus,
        }
    }

    fn wallet(n: u32) -> WalletAddress {
        WalletAddress::from(format!("https://wallet.example/p{n}"))
    }

    /// Creates a tanda with `count` members (contribution 100) and
    /// returns its id. Wallets are `wallet(1)..=wallet(count)` in
    /// position order.
    async fn filled_tanda(fix: &Fixture, count: u32) -> TandaId {
        let Ok(view) = fix
            .membership
            .create_tanda(CreateTandaRequest {
                name: "Cena familiar".to_string(),
                description: String::new(),
                founder_name: "p1".to_string(),
                founder_wallet: wallet(1),
                terms: ContributionTerms::PerParticipant(100),
                participant_count: count,
            })
            .await
        else {
            panic!("create failed");
        };
        for n in 2..=count {
            let Ok(_) = fix
                .membership
                .join_tanda(view.id, wallet(n), format!("p{n}"))
                .await
            else {
                panic!("join failed");
            };
        }
        view.id
    }

    fn completed(outcome: &ContributionOutcome) -> (&Payment, Option<&SettlementOutcome>) {
        let ContributionOutcome::Completed {
            payment,
            settlement,
        } = outcome
        else {
            panic!("expected completed contribution");
        };
        (payment, settlement.as_ref())
    }

    #[tokio::test]
    async fn scenario_a_round_one_settles_on_final_contribution() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        let Ok(first) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("first contribution failed");
        };
        let (payment, settlement) = completed(&first);
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.round, 1);
        assert!(settlement.is_none());

        let Ok(second) = fix.engine.submit_contribution(id, &wallet(3), 100).await else {
            panic!("second contribution failed");
        };
        let (_, settlement) = completed(&second);
        let Some(SettlementOutcome::Settled(settled)) = settlement else {
            panic!("expected round settlement");
        };
        assert_eq!(settled.round, 1);
        assert_eq!(settled.recipient.position, 1);
        assert!(settled.recipient.has_received);
        assert_eq!(settled.amount, 200);
        assert_eq!(settled.current_round, 2);
        assert_eq!(settled.status, TandaStatus::Active);

        // p2 + p3 contributions into the pool, then one payout to p1.
        let transfers = fix.gateway.settled_transfers();
        assert_eq!(transfers.len(), 3);
        let Some(payout) = transfers.last() else {
            panic!("payout missing");
        };
        assert_eq!(payout.destination, wallet(1));
        assert_eq!(payout.amount, 200);

        let Ok(view) = fix.membership.get_tanda(id).await else {
            panic!("get failed");
        };
        assert_eq!(view.status, TandaStatus::Active);
        assert_eq!(view.current_round, 2);
        let received: Vec<u32> = view
            .participants
            .iter()
            .filter(|p| p.has_received)
            .map(|p| p.position)
            .collect();
        assert_eq!(received, vec![1]);
    }

    #[tokio::test]
    async fn scenario_b_recipient_cannot_pay_into_own_round() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        // Settle round 1 (recipient p1).
        let _ = fix.engine.submit_contribution(id, &wallet(2), 100).await;
        let _ = fix.engine.submit_contribution(id, &wallet(3), 100).await;

        // p2 is the round-2 recipient and owes nothing.
        let result = fix.engine.submit_contribution(id, &wallet(2), 100).await;
        assert!(matches!(result, Err(TandaError::RecipientCannotPay)));
    }

    #[tokio::test]
    async fn scenario_c_duplicate_contribution_rejected() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        let Ok(_) = fix.engine.submit_contribution(id, &wallet(3), 100).await else {
            panic!("first contribution failed");
        };
        let duplicate = fix.engine.submit_contribution(id, &wallet(3), 100).await;
        assert!(matches!(duplicate, Err(TandaError::AlreadyPaid(1))));

        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.round, 1);
        assert!(!progress.complete);
    }

    #[tokio::test]
    async fn scenario_d_pending_contribution_settles_round_on_continuation() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        let Ok(_) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("p2 contribution failed");
        };

        fix.gateway.enqueue(ScriptedTransfer::Pending {
            authorization_url: "https://auth.example/grant".to_string(),
        });
        let Ok(outcome) = fix.engine.submit_contribution(id, &wallet(3), 100).await else {
            panic!("p3 contribution failed");
        };
        let ContributionOutcome::RequiresAuth {
            payment,
            authorization_url,
        } = outcome
        else {
            panic!("expected pending authorization");
        };
        assert_eq!(payment.status, PaymentStatus::PendingAuthorization);
        assert_eq!(authorization_url, "https://auth.example/grant");

        // Round must not settle off a pending payment.
        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert!(!progress.complete);
        assert_eq!(progress.pending_authorization, 1);

        let Ok(finalized) = fix
            .engine
            .complete_pending_payment(payment.id, "interact-ref-1")
            .await
        else {
            panic!("continuation failed");
        };
        let (finished, settlement) = completed(&finalized);
        assert_eq!(finished.status, PaymentStatus::Completed);
        let Some(SettlementOutcome::Settled(settled)) = settlement else {
            panic!("expected settlement");
        };
        assert_eq!(settled.round, 1);

        // Continuing again must not settle anything twice.
        let again = fix
            .engine
            .complete_pending_payment(payment.id, "interact-ref-1")
            .await;
        assert!(matches!(
            again,
            Err(TandaError::NotPending(PaymentStatus::Completed))
        ));
    }

    #[tokio::test]
    async fn scenario_e_full_lifecycle_completes_and_rejects_more() {
        let fix = fixture();
        let id = filled_tanda(&fix, 2).await;

        // Round 1: p2 pays, p1 receives.
        let Ok(first) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("round 1 contribution failed");
        };
        let (_, settlement) = completed(&first);
        let Some(SettlementOutcome::Settled(settled)) = settlement else {
            panic!("round 1 did not settle");
        };
        assert_eq!(settled.current_round, 2);
        assert_eq!(settled.status, TandaStatus::Active);

        // Round 2: p1 pays, p2 receives, tanda completes.
        let Ok(second) = fix.engine.submit_contribution(id, &wallet(1), 100).await else {
            panic!("round 2 contribution failed");
        };
        let (_, settlement) = completed(&second);
        let Some(SettlementOutcome::Settled(settled)) = settlement else {
            panic!("round 2 did not settle");
        };
        assert_eq!(settled.status, TandaStatus::Completed);
        // Final round does not advance the counter.
        assert_eq!(settled.current_round, 2);

        let Ok(view) = fix.membership.get_tanda(id).await else {
            panic!("get failed");
        };
        assert_eq!(view.status, TandaStatus::Completed);
        assert!(view.completed_at.is_some());
        // Recipients are exactly the positions, once each.
        assert!(view.participants.iter().all(|p| p.has_received));

        let rejected = fix.engine.submit_contribution(id, &wallet(1), 100).await;
        assert!(matches!(
            rejected,
            Err(TandaError::WrongPhase(TandaStatus::Completed))
        ));
    }

    #[tokio::test]
    async fn wrong_amount_and_non_member_are_rejected_without_mutation() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        let wrong = fix.engine.submit_contribution(id, &wallet(2), 50).await;
        assert!(matches!(
            wrong,
            Err(TandaError::WrongAmount {
                expected: 100,
                actual: 50
            })
        ));

        let stranger = fix
            .engine
            .submit_contribution(id, &WalletAddress::from("https://wallet.example/nadie"), 100)
            .await;
        assert!(matches!(stranger, Err(TandaError::NotAMember)));

        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert_eq!(progress.completed, 0);
        assert_eq!(progress.failed, 0);
        assert_eq!(fix.gateway.settled_count(), 0);
    }

    #[tokio::test]
    async fn pre_fund_contribution_from_future_recipient_is_allowed() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        // Rounds have not started; position 1 may pre-pay round 1.
        let Ok(outcome) = fix.engine.submit_contribution(id, &wallet(1), 100).await else {
            panic!("pre-fund contribution failed");
        };
        let (payment, settlement) = completed(&outcome);
        assert_eq!(payment.round, 1);
        assert!(settlement.is_none());
    }

    #[tokio::test]
    async fn contribution_before_full_counts_toward_round_one() {
        let fix = fixture();
        let Ok(view) = fix
            .membership
            .create_tanda(CreateTandaRequest {
                name: "Abierta".to_string(),
                description: String::new(),
                founder_name: "p1".to_string(),
                founder_wallet: wallet(1),
                terms: ContributionTerms::PerParticipant(100),
                participant_count: 3,
            })
            .await
        else {
            panic!("create failed");
        };
        let Ok(_) = fix.membership.join_tanda(view.id, wallet(2), "p2").await else {
            panic!("join failed");
        };

        // Still Open; contributions are accepted in the pre-fund phase.
        let Ok(outcome) = fix
            .engine
            .submit_contribution(view.id, &wallet(2), 100)
            .await
        else {
            panic!("open-phase contribution failed");
        };
        let (payment, _) = completed(&outcome);
        assert_eq!(payment.round, 1);
    }

    #[tokio::test]
    async fn gateway_failure_marks_payment_failed_and_allows_resubmission() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        fix.gateway
            .enqueue(ScriptedTransfer::Decline("insufficient funds".to_string()));
        let failed = fix.engine.submit_contribution(id, &wallet(2), 100).await;
        assert!(matches!(failed, Err(TandaError::Gateway(_))));

        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.completed, 0);

        // A failed attempt does not block a fresh submission.
        let Ok(outcome) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("resubmission failed");
        };
        let (payment, _) = completed(&outcome);
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn gateway_timeout_fails_payment_and_releases_the_lock() {
        let config = EngineConfig {
            gateway_timeout_secs: 0,
            ..EngineConfig::default()
        };
        let fix = fixture_with_config(config);
        let id = filled_tanda(&fix, 3).await;

        fix.gateway.enqueue(ScriptedTransfer::Hang);
        let result = fix.engine.submit_contribution(id, &wallet(2), 100).await;
        assert!(matches!(result, Err(TandaError::Gateway(_))));

        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert_eq!(progress.failed, 1);

        // The exclusive section was released; the tanda still works.
        let Ok(_) = fix.engine.submit_contribution(id, &wallet(3), 100).await else {
            panic!("post-timeout contribution failed");
        };
    }

    #[tokio::test]
    async fn payout_failure_leaves_round_complete_and_retryable() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        // Two contributions settle, the payout declines.
        fix.gateway.enqueue(ScriptedTransfer::Settle);
        fix.gateway.enqueue(ScriptedTransfer::Settle);
        fix.gateway
            .enqueue(ScriptedTransfer::Decline("pool wallet frozen".to_string()));

        let Ok(_) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("p2 contribution failed");
        };
        let Ok(outcome) = fix.engine.submit_contribution(id, &wallet(3), 100).await else {
            panic!("p3 contribution failed");
        };
        let (_, settlement) = completed(&outcome);
        let Some(SettlementOutcome::Failed { round, reason }) = settlement else {
            panic!("expected failed settlement");
        };
        assert_eq!(*round, 1);
        assert!(reason.contains("pool wallet frozen"));

        // Recipient unmarked, round still complete.
        let Ok(view) = fix.membership.get_tanda(id).await else {
            panic!("get failed");
        };
        assert!(view.participants.iter().all(|p| !p.has_received));
        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert!(progress.complete);

        // Retry settles with the default script.
        let Ok(settled) = fix.engine.settle_round(id).await else {
            panic!("retry failed");
        };
        assert_eq!(settled.round, 1);
        assert_eq!(settled.current_round, 2);
    }

    #[tokio::test]
    async fn settle_round_rejects_incomplete_round() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        let early = fix.engine.settle_round(id).await;
        assert!(matches!(early, Err(TandaError::RoundNotComplete(1))));
        assert_eq!(fix.gateway.settled_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_duplicate_submissions_yield_already_paid() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        // Two racing submissions of the same contribution; the per-tanda
        // write lock serializes them and the second finds the slot taken.
        let w3 = wallet(3);
        let (a, b) = tokio::join!(
            fix.engine.submit_contribution(id, &w3, 100),
            fix.engine.submit_contribution(id, &w3, 100),
        );
        let outcomes = [a, b];
        let ok_count = outcomes.iter().filter(|r| r.is_ok()).count();
        let dup_count = outcomes
            .iter()
            .filter(|r| matches!(r, Err(TandaError::AlreadyPaid(1))))
            .count();
        assert_eq!(ok_count, 1);
        assert_eq!(dup_count, 1);
        assert_eq!(fix.gateway.settled_count(), 1);

        let Ok(progress) = fix.engine.round_progress(id).await else {
            panic!("progress failed");
        };
        assert_eq!(progress.completed, 1);
    }

    #[tokio::test]
    async fn concurrent_final_contributions_trigger_exactly_one_payout() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        // Both remaining participants contribute concurrently. Each
        // observes the round under the lock in turn; only the one that
        // lands second finds the round complete and settles it.
        let w2 = wallet(2);
        let w3 = wallet(3);
        let (a, b) = tokio::join!(
            fix.engine.submit_contribution(id, &w2, 100),
            fix.engine.submit_contribution(id, &w3, 100),
        );
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("both contributions should complete");
        };
        let settlements = [&a, &b]
            .into_iter()
            .filter(|outcome| {
                matches!(
                    outcome,
                    ContributionOutcome::Completed {
                        settlement: Some(SettlementOutcome::Settled(_)),
                        ..
                    }
                )
            })
            .count();
        assert_eq!(settlements, 1);

        // Two contributions and exactly one payout.
        assert_eq!(fix.gateway.settled_count(), 3);
        let Ok(view) = fix.membership.get_tanda(id).await else {
            panic!("get failed");
        };
        assert_eq!(view.current_round, 2);
    }

    #[tokio::test]
    async fn declined_continuation_demotes_to_failed() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        fix.gateway.enqueue(ScriptedTransfer::Pending {
            authorization_url: "https://auth.example/grant".to_string(),
        });
        let Ok(ContributionOutcome::RequiresAuth { payment, .. }) =
            fix.engine.submit_contribution(id, &wallet(2), 100).await
        else {
            panic!("expected pending authorization");
        };

        fix.gateway
            .enqueue(ScriptedTransfer::Decline("authorization refused".to_string()));
        let declined = fix
            .engine
            .complete_pending_payment(payment.id, "interact-ref")
            .await;
        assert!(matches!(declined, Err(TandaError::Gateway(_))));

        let Ok(stored) = fix.engine.get_payment(payment.id).await else {
            panic!("payment lookup failed");
        };
        assert_eq!(stored.status, PaymentStatus::Failed);

        // Demotion frees the slot for a fresh submission.
        let Ok(_) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("resubmission failed");
        };
    }

    #[tokio::test]
    async fn unfinalized_continuation_stays_pending() {
        let fix = fixture();
        let id = filled_tanda(&fix, 3).await;

        fix.gateway.enqueue(ScriptedTransfer::Pending {
            authorization_url: "https://auth.example/grant".to_string(),
        });
        let Ok(ContributionOutcome::RequiresAuth { payment, .. }) =
            fix.engine.submit_contribution(id, &wallet(2), 100).await
        else {
            panic!("expected pending authorization");
        };

        fix.gateway
            .enqueue(ScriptedTransfer::Unavailable("grant not finalized".to_string()));
        let not_ready = fix
            .engine
            .complete_pending_payment(payment.id, "interact-ref")
            .await;
        assert!(matches!(not_ready, Err(TandaError::Gateway(_))));

        let Ok(stored) = fix.engine.get_payment(payment.id).await else {
            panic!("payment lookup failed");
        };
        assert_eq!(stored.status, PaymentStatus::PendingAuthorization);

        // A later retry with a finalized grant completes it.
        let Ok(_) = fix
            .engine
            .complete_pending_payment(payment.id, "interact-ref")
            .await
        else {
            panic!("second continuation failed");
        };
    }

    #[tokio::test]
    async fn start_rounds_requires_full_phase() {
        let fix = fixture();
        let Ok(view) = fix
            .membership
            .create_tanda(CreateTandaRequest {
                name: "Temprano".to_string(),
                description: String::new(),
                founder_name: "p1".to_string(),
                founder_wallet: wallet(1),
                terms: ContributionTerms::PerParticipant(100),
                participant_count: 3,
            })
            .await
        else {
            panic!("create failed");
        };

        let open = fix.engine.start_rounds(view.id).await;
        assert!(matches!(open, Err(TandaError::WrongPhase(TandaStatus::Open))));

        let _ = fix.membership.join_tanda(view.id, wallet(2), "p2").await;
        let _ = fix.membership.join_tanda(view.id, wallet(3), "p3").await;

        let Ok(started) = fix.engine.start_rounds(view.id).await else {
            panic!("start failed");
        };
        assert_eq!(started.current_round, 1);
        assert_eq!(started.status, TandaStatus::Active);

        // With rounds running, the recipient exemption kicks in.
        let refused = fix.engine.submit_contribution(view.id, &wallet(1), 100).await;
        assert!(matches!(refused, Err(TandaError::RecipientCannotPay)));
    }

    #[tokio::test]
    async fn corrupted_record_halts_tanda_on_settlement() {
        let fix = fixture();
        let id = filled_tanda(&fix, 2).await;

        // Corrupt the record: the round-1 recipient is marked received
        // even though nothing settled.
        {
            let Ok(record_lock) = fix.store.tanda(id).await else {
                panic!("tanda missing");
            };
            let mut record = record_lock.write().await;
            let Some(target) = record
                .tanda
                .participants
                .iter()
                .find(|p| p.position == 1)
                .map(|p| p.id)
            else {
                panic!("position 1 missing");
            };
            let _ = record.tanda.mark_received(target, Utc::now());
        }

        // p2's contribution completes round 1, but no eligible recipient
        // remains; settlement halts the tanda instead of guessing.
        let Ok(outcome) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("contribution failed");
        };
        let (_, settlement) = completed(&outcome);
        let Some(SettlementOutcome::Failed { reason, .. }) = settlement else {
            panic!("expected failed settlement");
        };
        assert!(reason.contains("no eligible recipient"));

        let frozen = fix.engine.submit_contribution(id, &wallet(2), 100).await;
        assert!(matches!(frozen, Err(TandaError::Halted(_))));
        let frozen_join = fix
            .membership
            .join_tanda(id, WalletAddress::from("late"), "tarde")
            .await;
        assert!(matches!(frozen_join, Err(TandaError::Halted(_))));
    }

    #[tokio::test]
    async fn events_follow_contribution_then_settlement_order() {
        let fix = fixture();
        let id = filled_tanda(&fix, 2).await;
        let mut rx = fix.bus.subscribe();

        let Ok(_) = fix.engine.submit_contribution(id, &wallet(2), 100).await else {
            panic!("contribution failed");
        };

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.tanda_id() == id {
                types.push(event.event_type_str());
            }
        }
        assert_eq!(
            types,
            vec!["contribution_completed", "round_settled"]
        );
    }
}
