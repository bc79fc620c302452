//! Domain events reflecting tanda state mutations.
//!
//! Every state change emits a [`TandaEvent`] through the
//! [`super::EventBus`]. An embedding transport layer can fan these out to
//! its own subscribers; the settlement tests use them to observe ordering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::{ParticipantId, PaymentId, TandaId};

/// Domain event emitted after every state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TandaEvent {
    /// Emitted when a new tanda is created.
    TandaCreated {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Group name.
        name: String,
        /// Per-participant contribution per round.
        contribution_amount: u64,
        /// Fixed participant count.
        participant_count: u32,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a participant joins.
    ParticipantJoined {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Joining participant.
        participant_id: ParticipantId,
        /// Assigned payout position.
        position: u32,
        /// Display name of the joiner.
        display_name: String,
        /// Join timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted the instant the last membership slot fills.
    TandaFilled {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Fill timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when rounds formally start.
    RoundsStarted {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// The round that just opened (always 1).
        round: u32,
        /// Start timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a contribution settles into the pool.
    ContributionCompleted {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Payment identifier.
        payment_id: PaymentId,
        /// Contributing participant.
        participant_id: ParticipantId,
        /// Round the contribution counts toward.
        round: u32,
        /// Contributed amount.
        amount: u64,
        /// Settlement timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a contribution needs interactive authorization.
    ContributionPending {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Payment identifier.
        payment_id: PaymentId,
        /// Contributing participant.
        participant_id: ParticipantId,
        /// Round the contribution counts toward.
        round: u32,
        /// Where the participant grants authorization.
        authorization_url: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a contribution transfer fails.
    ContributionFailed {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Payment identifier.
        payment_id: PaymentId,
        /// Contributing participant.
        participant_id: ParticipantId,
        /// Round the contribution counted toward.
        round: u32,
        /// Gateway failure description.
        reason: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a round's pool is disbursed to its recipient.
    RoundSettled {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Settled round number.
        round: u32,
        /// Recipient of the pool.
        recipient_id: ParticipantId,
        /// Disbursed amount.
        amount: u64,
        /// Gateway reference for the payout transfer.
        gateway_reference: String,
        /// Settlement timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a completed round's payout transfer fails.
    ///
    /// The round stays complete-but-unsettled; settlement can be retried.
    PayoutFailed {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Round whose payout failed.
        round: u32,
        /// Gateway failure description.
        reason: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the final round settles.
    TandaCompleted {
        /// Tanda identifier.
        tanda_id: TandaId,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl TandaEvent {
    /// Returns the tanda ID associated with this event.
    #[must_use]
    pub const fn tanda_id(&self) -> TandaId {
        match self {
            Self::TandaCreated { tanda_id, .. }
            | Self::ParticipantJoined { tanda_id, .. }
            | Self::TandaFilled { tanda_id, .. }
            | Self::RoundsStarted { tanda_id, .. }
            | Self::ContributionCompleted { tanda_id, .. }
            | Self::ContributionPending { tanda_id, .. }
            | Self::ContributionFailed { tanda_id, .. }
            | Self::RoundSettled { tanda_id, .. }
            | Self::PayoutFailed { tanda_id, .. }
            | Self::TandaCompleted { tanda_id, .. } => *tanda_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::TandaCreated { .. } => "tanda_created",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::TandaFilled { .. } => "tanda_filled",
            Self::RoundsStarted { .. } => "rounds_started",
            Self::ContributionCompleted { .. } => "contribution_completed",
            Self::ContributionPending { .. } => "contribution_pending",
            Self::ContributionFailed { .. } => "contribution_failed",
            Self::RoundSettled { .. } => "round_settled",
            Self::PayoutFailed { .. } => "payout_failed",
            Self::TandaCompleted { .. } => "tanda_completed",
        }
    }
}
