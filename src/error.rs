//! Engine error types with a stable taxonomy and numeric codes.
//!
//! [`TandaError`] is the central error type for the engine. Each variant
//! carries a numeric code and a [`ErrorKind`] classification so an
//! embedding transport layer can map failures to its own wire format
//! without matching on variants.

use crate::domain::{PaymentStatus, TandaStatus};

/// Classification of an engine failure.
///
/// Mirrors the error-handling taxonomy: user-correctable categories are
/// surfaced verbatim, gateway failures leave tanda state untouched, and
/// invariant violations halt the affected tanda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad creation parameters; fatal to the request, never retried.
    Config,
    /// Join-time failures (`NotOpen`, `AlreadyMember`, `Full`).
    Membership,
    /// Operation invalid for the current tanda or payment status.
    Phase,
    /// Contribution rejected before any mutation.
    Validation,
    /// The referenced tanda, payment, or invite does not exist.
    NotFound,
    /// External transfer failure; the payment is marked failed.
    Gateway,
    /// Corrupted state; the tanda is halted rather than guessed at.
    Invariant,
    /// Unexpected internal failure.
    Internal,
}

/// Engine error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          |
/// |-----------|-------------------|
/// | 1000–1999 | Config/Validation |
/// | 2000–2999 | State/Not Found   |
/// | 3000–3999 | Internal          |
/// | 4000–4999 | Gateway           |
/// | 5000–5999 | Invariant         |
#[derive(Debug, Clone, thiserror::Error)]
pub enum TandaError {
    /// Creation parameters failed validation.
    #[error("invalid tanda configuration: {0}")]
    InvalidConfig(String),

    /// The tanda is no longer accepting members.
    #[error("tanda is not open for new members (status: {0})")]
    NotOpen(TandaStatus),

    /// The wallet already belongs to a member of this tanda.
    #[error("wallet is already a member of this tanda")]
    AlreadyMember,

    /// Every membership slot is taken.
    #[error("tanda already has all its members")]
    Full,

    /// The operation is not valid in the tanda's current phase.
    #[error("operation not allowed while tanda is {0}")]
    WrongPhase(TandaStatus),

    /// The wallet is not enrolled in this tanda.
    #[error("wallet is not a member of this tanda")]
    NotAMember,

    /// The current round's recipient does not pay into their own round.
    #[error("the current round's recipient does not pay into their own round")]
    RecipientCannotPay,

    /// Contribution amount differs from the tanda's fixed amount.
    #[error("amount must be exactly {expected}, got {actual}")]
    WrongAmount {
        /// The tanda's fixed contribution amount.
        expected: u64,
        /// The amount that was submitted.
        actual: u64,
    },

    /// A completed or pending contribution already exists for this round.
    #[error("participant already paid for round {0}")]
    AlreadyPaid(u32),

    /// Settlement requested before the round collected every contribution.
    #[error("round {0} has not collected every contribution yet")]
    RoundNotComplete(u32),

    /// Continuation attempted on a payment that is not awaiting one.
    #[error("payment is not pending authorization (status: {0})")]
    NotPending(PaymentStatus),

    /// Tanda with the given ID was not found.
    #[error("tanda not found: {0}")]
    TandaNotFound(uuid::Uuid),

    /// Payment with the given ID was not found.
    #[error("payment not found: {0}")]
    PaymentNotFound(uuid::Uuid),

    /// Invite code did not resolve to a tanda.
    #[error("invite code not valid: {0}")]
    InviteNotFound(String),

    /// External transfer failure surfaced from the payment gateway.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// No eligible recipient for a complete round; indicates corruption.
    #[error("no eligible recipient for round {round} of tanda {tanda_id}")]
    NoRecipient {
        /// The affected tanda.
        tanda_id: uuid::Uuid,
        /// The round that could not be settled.
        round: u32,
    },

    /// The tanda was frozen after an invariant violation.
    #[error("tanda {0} is halted after an invariant violation")]
    Halted(uuid::Uuid),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TandaError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 1001,
            Self::WrongAmount { .. } => 1002,
            Self::RecipientCannotPay => 1003,
            Self::AlreadyPaid(_) => 1004,
            Self::TandaNotFound(_) => 2001,
            Self::PaymentNotFound(_) => 2002,
            Self::InviteNotFound(_) => 2003,
            Self::NotOpen(_) => 2101,
            Self::AlreadyMember => 2102,
            Self::Full => 2103,
            Self::WrongPhase(_) => 2104,
            Self::RoundNotComplete(_) => 2105,
            Self::NotPending(_) => 2106,
            Self::NotAMember => 2107,
            Self::Internal(_) => 3000,
            Self::Gateway(_) => 4001,
            Self::NoRecipient { .. } => 5001,
            Self::Halted(_) => 5002,
        }
    }

    /// Returns the taxonomy classification for this variant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::Config,
            Self::NotOpen(_) | Self::AlreadyMember | Self::Full => ErrorKind::Membership,
            Self::WrongPhase(_) | Self::RoundNotComplete(_) | Self::NotPending(_) => {
                ErrorKind::Phase
            }
            Self::NotAMember
            | Self::RecipientCannotPay
            | Self::WrongAmount { .. }
            | Self::AlreadyPaid(_) => ErrorKind::Validation,
            Self::TandaNotFound(_) | Self::PaymentNotFound(_) | Self::InviteNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::NoRecipient { .. } | Self::Halted(_) => ErrorKind::Invariant,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
