//! # tanda-engine
//!
//! Round-settlement engine for rotating savings groups ("tandas"): a
//! fixed set of participants contributes equal amounts each round, and
//! one participant receives the pooled total per round until every member
//! has received once.
//!
//! The crate is the coordination core only. HTTP framing, wallet
//! discovery, grant negotiation, and actual fund movement are external
//! collaborators: fund movement sits behind the
//! [`gateway::PaymentGateway`] port, storage behind
//! [`store::LedgerStore`].
//!
//! ## Architecture
//!
//! ```text
//! Embedding transport (HTTP, CLI, ...)
//!     │
//!     ├── AppState (app_state)
//!     │     ├── MembershipManager (service/)
//!     │     └── SettlementEngine (service/)
//!     │
//!     ├── EventBus (domain/)
//!     ├── Round evaluator (domain/): pure derived state
//!     │
//!     ├── LedgerStore (store/): per-tanda Arc<RwLock<TandaRecord>>
//!     └── PaymentGateway (gateway/): external fund movement
//! ```
//!
//! ## Concurrency
//!
//! Each tanda is one unit of mutual exclusion. Every mutating operation
//! holds that tanda's write lock for its full duration, awaited gateway
//! call included, which is what makes "at most one payout per round"
//! hold under concurrent contributions. Gateway calls are bounded by a
//! configurable timeout so the section is never held indefinitely.

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod service;
pub mod store;
