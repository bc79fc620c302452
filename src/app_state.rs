//! Shared application state handed to an embedding transport layer.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::EventBus;
use crate::gateway::PaymentGateway;
use crate::service::{MembershipManager, SettlementEngine};
use crate::store::{InMemoryLedger, LedgerStore};

/// Composition root wiring the store, gateway, event bus, and services.
///
/// An embedding server (HTTP, CLI, whatever transport) builds one
/// `AppState` and routes its requests to [`AppState::membership`] and
/// [`AppState::settlement`]; WebSocket-style consumers subscribe through
/// [`AppState::event_bus`].
#[derive(Debug, Clone)]
pub struct AppState {
    /// Enrollment and read views.
    pub membership: Arc<MembershipManager>,
    /// Contribution intake and round settlement.
    pub settlement: Arc<SettlementEngine>,
    /// Event bus for state-change subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires both services over the given store and gateway.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let membership = Arc::new(MembershipManager::new(
            Arc::clone(&store),
            event_bus.clone(),
            config,
        ));
        let settlement = Arc::new(SettlementEngine::new(
            store,
            gateway,
            event_bus.clone(),
            config,
        ));
        Self {
            membership,
            settlement,
            event_bus,
        }
    }

    /// Convenience constructor backed by the in-memory ledger.
    #[must_use]
    pub fn in_memory(config: &EngineConfig, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::new(config, Arc::new(InMemoryLedger::new()), gateway)
    }
}
