//! Round evaluator: pure functions deriving tanda state.
//!
//! The single source of truth for status, the effective round, the payout
//! recipient, and round completion. Nothing here mutates anything; callers
//! (the settlement engine and membership manager) act on what these
//! functions report, under the per-tanda exclusive section.

use super::payment::{Payment, PaymentStatus};
use super::tanda::{Participant, Tanda, TandaStatus};

/// Derives the lifecycle status from the tanda's current fields.
///
/// `Open` while under capacity, `Full` at capacity before rounds start,
/// `Active` while rounds run, `Completed` once every participant has
/// received. The final round leaves `current_round` at
/// `participant_count`, so completion is detected through the received
/// flags rather than the counter.
#[must_use]
pub fn status(tanda: &Tanda) -> TandaStatus {
    if (tanda.participants.len() as u32) < tanda.participant_count {
        return TandaStatus::Open;
    }
    if tanda.current_round == 0 {
        return TandaStatus::Full;
    }
    if tanda.current_round > tanda.participant_count
        || tanda.participants.iter().all(|p| p.has_received)
    {
        return TandaStatus::Completed;
    }
    TandaStatus::Active
}

/// The round contributions currently count toward: `current_round` once
/// rounds have started, otherwise 1 (pre-fund contributions apply to the
/// first round).
#[must_use]
pub const fn effective_round(tanda: &Tanda) -> u32 {
    if tanda.current_round > 0 {
        tanda.current_round
    } else {
        1
    }
}

/// Recipient of the effective round: the participant holding that
/// position who has not yet received. Positions are unique, so there is
/// at most one.
#[must_use]
pub fn next_recipient(tanda: &Tanda) -> Option<&Participant> {
    let round = effective_round(tanda);
    tanda
        .participants
        .iter()
        .find(|p| p.position == round && !p.has_received)
}

/// Whether the effective round has collected every required contribution.
///
/// Counts `Completed` payments tagged with the effective round; the round
/// is complete once `participant_count − 1` have settled (the recipient
/// is never required to pay into their own round).
#[must_use]
pub fn is_round_complete<'a>(
    tanda: &Tanda,
    payments: impl IntoIterator<Item = &'a Payment>,
) -> bool {
    let round = effective_round(tanda);
    let settled = payments
        .into_iter()
        .filter(|p| p.round == round && p.status == PaymentStatus::Completed)
        .count() as u32;
    settled >= tanda.participant_count.saturating_sub(1)
}

/// Pool disbursed to the round recipient:
/// `contribution_amount × (participant_count − 1)`.
#[must_use]
pub fn payout_amount(tanda: &Tanda) -> u64 {
    tanda
        .contribution_amount
        .saturating_mul(u64::from(tanda.participant_count.saturating_sub(1)))
}
