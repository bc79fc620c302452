//! Tanda aggregate: the rotating-savings group and its members.
//!
//! A [`Tanda`] carries no stored status field. Lifecycle status is derived
//! on demand by [`super::evaluator::status`], which keeps the stored state
//! and the reported state from ever drifting apart.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evaluator;
use super::id::{ParticipantId, TandaId, WalletAddress};

/// Derived lifecycle status of a tanda.
///
/// `Open → Full → Active → Completed`, monotonic. Never stored; always
/// computed from the tanda's fields by the round evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TandaStatus {
    /// Accepting members; under capacity.
    Open,
    /// At capacity; rounds have not formally started.
    Full,
    /// Rounds in progress.
    Active,
    /// Every position has received its payout.
    Completed,
}

impl fmt::Display for TandaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Full => "full",
            Self::Active => "active",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// A member of a tanda with a fixed payout position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier, unique within the tanda.
    pub id: ParticipantId,
    /// Display name shown to other members.
    pub display_name: String,
    /// Opaque wallet identity, unique within the tanda.
    pub wallet: WalletAddress,
    /// 1-based payout order, assigned at join time, immutable.
    pub position: u32,
    /// Whether this participant created the tanda.
    pub is_founder: bool,
    /// Whether this participant has received their round payout.
    pub has_received: bool,
    /// When the payout was received, if it has been.
    pub received_at: Option<DateTime<Utc>>,
    /// When this participant joined.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Creates a participant at the given position who has not yet received.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        wallet: WalletAddress,
        position: u32,
        is_founder: bool,
    ) -> Self {
        Self {
            id: ParticipantId::new(),
            display_name: display_name.into(),
            wallet,
            position,
            is_founder,
            has_received: false,
            received_at: None,
            joined_at: Utc::now(),
        }
    }
}

/// Core rotating-savings group state.
///
/// Membership, the round counter, and identity fields. The associated
/// payment set lives in [`super::record::TandaRecord`] so that the whole
/// unit shares one exclusive section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tanda {
    /// Unique tanda identifier (immutable after creation).
    pub id: TandaId,
    /// Group name.
    pub name: String,
    /// Optional free-form description.
    pub description: String,
    /// Six-character invite code used to join.
    pub invite_code: String,
    /// Shareable join URL built from the configured base.
    pub invite_url: String,
    /// Per-participant contribution per round, in integer units.
    pub contribution_amount: u64,
    /// Fixed number of participants (and of rounds), ≥ 2.
    pub participant_count: u32,
    /// Ordered members; positions are `1..=participant_count`, first-come.
    pub participants: Vec<Participant>,
    /// Current round; `0` means rounds have not formally started.
    pub current_round: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the last membership slot filled, if it has.
    pub filled_at: Option<DateTime<Utc>>,
    /// When the final round settled, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Tanda {
    /// Creates a tanda with the founder enrolled at position 1 and
    /// `current_round = 0`. Inputs are validated by the membership manager.
    pub(crate) fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        contribution_amount: u64,
        participant_count: u32,
        founder: Participant,
        invite_base_url: &str,
    ) -> Self {
        let invite_code = generate_invite_code();
        let invite_url = format!("{}/join/{invite_code}", invite_base_url.trim_end_matches('/'));
        Self {
            id: TandaId::new(),
            name: name.into(),
            description: description.into(),
            invite_code,
            invite_url,
            contribution_amount,
            participant_count,
            participants: vec![founder],
            current_round: 0,
            created_at: Utc::now(),
            filled_at: None,
            completed_at: None,
        }
    }

    /// Looks up a member by wallet identity.
    #[must_use]
    pub fn participant_by_wallet(&self, wallet: &WalletAddress) -> Option<&Participant> {
        self.participants.iter().find(|p| p.wallet == *wallet)
    }

    /// Looks up a member by participant id.
    #[must_use]
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Marks a participant as having received their payout, returning the
    /// updated participant. `None` if the id is not a member.
    pub(crate) fn mark_received(
        &mut self,
        id: ParticipantId,
        at: DateTime<Utc>,
    ) -> Option<Participant> {
        let participant = self.participants.iter_mut().find(|p| p.id == id)?;
        participant.has_received = true;
        participant.received_at = Some(at);
        Some(participant.clone())
    }
}

/// Generates a six-character invite code over `A–Z0–9`.
///
/// Entropy comes from a fresh UUID v4, which the crate already depends on
/// for identifiers.
pub(crate) fn generate_invite_code() -> String {
    uuid::Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(6)
        .map(|b| {
            let v = b % 36;
            if v < 26 {
                char::from(b'A' + v)
            } else {
                char::from(b'0' + (v - 26))
            }
        })
        .collect()
}

/// Full read view of a tanda with derived fields attached.
#[derive(Debug, Clone, Serialize)]
pub struct TandaView {
    /// Tanda identifier.
    pub id: TandaId,
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Invite code.
    pub invite_code: String,
    /// Shareable join URL.
    pub invite_url: String,
    /// Per-participant contribution per round.
    pub contribution_amount: u64,
    /// Fixed participant (and round) count.
    pub participant_count: u32,
    /// Number of members enrolled so far.
    pub joined_count: u32,
    /// Current round counter.
    pub current_round: u32,
    /// Derived lifecycle status.
    pub status: TandaStatus,
    /// Enrolled members in join order.
    pub participants: Vec<Participant>,
    /// Recipient of the effective round, if one is still owed.
    pub next_recipient: Option<Participant>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the last slot filled.
    pub filled_at: Option<DateTime<Utc>>,
    /// When the final round settled.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Tanda> for TandaView {
    fn from(tanda: &Tanda) -> Self {
        Self {
            id: tanda.id,
            name: tanda.name.clone(),
            description: tanda.description.clone(),
            invite_code: tanda.invite_code.clone(),
            invite_url: tanda.invite_url.clone(),
            contribution_amount: tanda.contribution_amount,
            participant_count: tanda.participant_count,
            joined_count: tanda.participants.len() as u32,
            current_round: tanda.current_round,
            status: evaluator::status(tanda),
            participants: tanda.participants.clone(),
            next_recipient: evaluator::next_recipient(tanda).cloned(),
            created_at: tanda.created_at,
            filled_at: tanda.filled_at,
            completed_at: tanda.completed_at,
        }
    }
}

/// One row of a participant's tanda listing.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantTandaView {
    /// Tanda identifier.
    pub tanda_id: TandaId,
    /// Group name.
    pub name: String,
    /// Derived lifecycle status.
    pub status: TandaStatus,
    /// This participant's payout position.
    pub position: u32,
    /// Whether this participant has already received.
    pub has_received: bool,
    /// Per-participant contribution per round.
    pub contribution_amount: u64,
    /// Current round counter.
    pub current_round: u32,
    /// Total number of rounds (= participant count).
    pub total_rounds: u32,
    /// Recipient of the effective round.
    pub next_recipient: Option<Participant>,
}

impl ParticipantTandaView {
    /// Builds the row for the given wallet, if it is a member.
    #[must_use]
    pub fn for_wallet(tanda: &Tanda, wallet: &WalletAddress) -> Option<Self> {
        let participant = tanda.participant_by_wallet(wallet)?;
        Some(Self {
            tanda_id: tanda.id,
            name: tanda.name.clone(),
            status: evaluator::status(tanda),
            position: participant.position,
            has_received: participant.has_received,
            contribution_amount: tanda.contribution_amount,
            current_round: tanda.current_round,
            total_rounds: tanda.participant_count,
            next_recipient: evaluator::next_recipient(tanda).cloned(),
        })
    }
}

/// What a prospective member sees before joining through an invite link.
#[derive(Debug, Clone, Serialize)]
pub struct InvitePreview {
    /// Invite code the preview was resolved from.
    pub invite_code: String,
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Founder's display name.
    pub founder_name: String,
    /// Per-participant contribution per round.
    pub contribution_amount: u64,
    /// Fixed participant count.
    pub participant_count: u32,
    /// Members enrolled so far.
    pub joined_count: u32,
    /// Derived lifecycle status.
    pub status: TandaStatus,
    /// Whether the tanda is still accepting members.
    pub can_join: bool,
}

impl From<&Tanda> for InvitePreview {
    fn from(tanda: &Tanda) -> Self {
        let status = evaluator::status(tanda);
        let founder_name = tanda
            .participants
            .iter()
            .find(|p| p.is_founder)
            .map(|p| p.display_name.clone())
            .unwrap_or_default();
        Self {
            invite_code: tanda.invite_code.clone(),
            name: tanda.name.clone(),
            description: tanda.description.clone(),
            founder_name,
            contribution_amount: tanda.contribution_amount,
            participant_count: tanda.participant_count,
            joined_count: tanda.participants.len() as u32,
            status,
            can_join: status == TandaStatus::Open,
        }
    }
}
