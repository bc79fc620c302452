//! Domain layer: tanda state, payments, the round evaluator, and events.
//!
//! This module contains the rotating-savings domain model: identifier
//! newtypes, the [`Tanda`] aggregate and its [`TandaRecord`] exclusive
//! unit, contribution [`Payment`]s, the pure round [`evaluator`], and the
//! event bus that broadcasts state changes.

pub mod evaluator;
pub mod event;
pub mod event_bus;
pub mod id;
pub mod payment;
pub mod record;
pub mod tanda;

pub use event::TandaEvent;
pub use event_bus::EventBus;
pub use id::{ParticipantId, PaymentId, TandaId, WalletAddress};
pub use payment::{Payment, PaymentContinuation, PaymentStatus};
pub use record::TandaRecord;
pub use tanda::{
    InvitePreview, Participant, ParticipantTandaView, Tanda, TandaStatus, TandaView,
};
