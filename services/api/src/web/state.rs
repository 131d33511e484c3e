//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use study_buddy_core::ports::{DatabaseService, PaymentGateway};
use study_buddy_core::service::FlashcardService;
use study_buddy_core::settlement::SettlementHandler;

/// The shared application state, created once at startup and passed to all handlers.
///
/// The orchestrator and the settlement handler are built over the same
/// database port, so a generation debit and a webhook credit always land in
/// the same ledger.
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub flashcards: FlashcardService,
    pub settlement: SettlementHandler,
    pub payments: Arc<dyn PaymentGateway>,
}
