//! Service layer: business logic orchestration.
//!
//! [`MembershipManager`] handles enrollment and read views;
//! [`SettlementEngine`] runs the round-settlement state machine. Both
//! operate through the [`crate::store::LedgerStore`] port and emit
//! [`crate::domain::TandaEvent`]s.

pub mod membership;
pub mod settlement;

pub use membership::{ContributionTerms, CreateTandaRequest, MembershipManager};
pub use settlement::{
    ContributionOutcome, RoundProgress, RoundSettlement, SettlementEngine, SettlementOutcome,
};
