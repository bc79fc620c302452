//! Contribution payment records and their status lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ParticipantId, PaymentId, TandaId};

/// Status of a contribution payment.
///
/// `Processing → {Completed, Failed, PendingAuthorization}`;
/// `PendingAuthorization → {Completed, Failed}`. `Completed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Gateway transfer in flight.
    Processing,
    /// Transfer needs interactive authorization by the participant.
    PendingAuthorization,
    /// Funds moved into the pool.
    Completed,
    /// Transfer declined, errored, or timed out.
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::PendingAuthorization => "pending_authorization",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Gateway continuation data held while a payment awaits authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentContinuation {
    /// Opaque token the gateway needs to resume the transfer.
    pub continuation_token: String,
    /// URL where the participant grants authorization.
    pub authorization_url: String,
}

/// One contribution attempt by a participant toward a specific round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identifier.
    pub id: PaymentId,
    /// Tanda this contribution belongs to.
    pub tanda_id: TandaId,
    /// Contributing participant.
    pub participant_id: ParticipantId,
    /// Round this contribution counts toward.
    pub round: u32,
    /// Contributed amount; always equals the tanda's contribution amount.
    pub amount: u64,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// When the payment attempt was created.
    pub created_at: DateTime<Utc>,
    /// When the transfer settled, for completed payments.
    pub completed_at: Option<DateTime<Utc>>,
    /// Gateway reference for the settled transfer.
    pub gateway_reference: Option<String>,
    /// Continuation data; populated only while `PendingAuthorization`.
    pub continuation: Option<PaymentContinuation>,
    /// Gateway failure description, for failed payments.
    pub failure_reason: Option<String>,
}

impl Payment {
    /// Creates a payment in `Processing` state.
    pub(crate) fn new(
        tanda_id: TandaId,
        participant_id: ParticipantId,
        round: u32,
        amount: u64,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            tanda_id,
            participant_id,
            round,
            amount,
            status: PaymentStatus::Processing,
            created_at: Utc::now(),
            completed_at: None,
            gateway_reference: None,
            continuation: None,
            failure_reason: None,
        }
    }

    /// Parks the payment until the participant authorizes the transfer.
    pub(crate) fn mark_pending(&mut self, continuation: PaymentContinuation) {
        self.status = PaymentStatus::PendingAuthorization;
        self.continuation = Some(continuation);
    }

    /// Finalizes the payment as settled.
    pub(crate) fn complete(&mut self, gateway_reference: String) {
        self.status = PaymentStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.gateway_reference = Some(gateway_reference);
        self.continuation = None;
    }

    /// Finalizes the payment as failed.
    pub(crate) fn fail(&mut self, reason: String) {
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason);
        self.continuation = None;
    }

    /// Whether this payment blocks another submission for the same
    /// `(tanda, round, participant)` slot.
    #[must_use]
    pub fn blocks_resubmission(&self) -> bool {
        matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PendingAuthorization
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_payment() -> Payment {
        Payment::new(TandaId::new(), ParticipantId::new(), 1, 100)
    }

    #[test]
    fn new_payment_is_processing() {
        let payment = make_payment();
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert!(payment.completed_at.is_none());
        assert!(!payment.blocks_resubmission());
    }

    #[test]
    fn complete_clears_continuation() {
        let mut payment = make_payment();
        payment.mark_pending(PaymentContinuation {
            continuation_token: "tok".to_string(),
            authorization_url: "https://auth.example/grant".to_string(),
        });
        assert_eq!(payment.status, PaymentStatus::PendingAuthorization);
        assert!(payment.blocks_resubmission());

        payment.complete("xfer-1".to_string());
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.continuation.is_none());
        assert_eq!(payment.gateway_reference.as_deref(), Some("xfer-1"));
        assert!(payment.completed_at.is_some());
    }

    #[test]
    fn failed_payment_does_not_block_resubmission() {
        let mut payment = make_payment();
        payment.fail("declined".to_string());
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(!payment.blocks_resubmission());
        assert_eq!(payment.failure_reason.as_deref(), Some("declined"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::PendingAuthorization).unwrap_or_default();
        assert_eq!(json, "\"pending_authorization\"");
    }
}
