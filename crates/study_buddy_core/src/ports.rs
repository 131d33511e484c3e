//! crates/study_buddy_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{CardContent, CheckoutSession, SettlementOutcome, User, UserCredentials};
use crate::fingerprint::ContentFingerprint;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The user's credit balance cannot cover the requested debit.
    #[error("Insufficient credits")]
    InsufficientFunds,
    /// The persistence layer could not be reached at all.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The persistence port: users, auth sessions, the shared flashcard cache,
/// and the credit ledger.
///
/// The cache and the ledger share one port deliberately: a generation debit
/// and its flashcard inserts must commit as a single atomic unit, which only
/// the adapter's transaction mechanism can guarantee.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials>;

    /// Re-reads the user's current state (including credit balance) from the
    /// store. The balance is never cached in memory between requests.
    async fn load_user(&self, user_id: Uuid) -> PortResult<User>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Flashcard Cache ---
    /// Returns every cached card sharing the fingerprint, across all users,
    /// in insertion order. An empty Vec means "not cached".
    async fn find_cards_by_fingerprint(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> PortResult<Vec<CardContent>>;

    // --- Credit Ledger ---
    /// Debits exactly one credit from the user and inserts the freshly
    /// generated cards under the fingerprint, as one transaction. Returns the
    /// post-debit balance. Fails with [`PortError::InsufficientFunds`] when
    /// the balance is already zero; in every failure case nothing persists.
    async fn commit_generation(
        &self,
        user_id: Uuid,
        fingerprint: &ContentFingerprint,
        cards: &[CardContent],
    ) -> PortResult<i64>;

    /// Credits the user's balance for a settled payment, keyed by the
    /// external event id. A replayed event id is a no-op
    /// ([`SettlementOutcome::AlreadyApplied`]); a given payment can never be
    /// credited twice.
    async fn credit_settlement(
        &self,
        event_id: &str,
        user_id: Uuid,
        amount: i64,
    ) -> PortResult<SettlementOutcome>;
}

/// The external text-generation service that turns submitted study text into
/// question/answer pairs.
#[async_trait]
pub trait CardGenerationService: Send + Sync {
    /// Generates up to [`crate::service::CARDS_PER_GENERATION`] Q&A pairs
    /// from the given context.
    ///
    /// Returns an empty Vec - not an error - when the upstream call fails or
    /// its response cannot be parsed. A single attempt only; no retries.
    async fn generate_cards(&self, context: &str) -> Vec<CardContent>;
}

/// The payment provider port, used to start a credit-bundle purchase.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout session for one credit bundle, carrying the
    /// user's id as an opaque reference so the later webhook can attribute
    /// the payment.
    async fn create_checkout_session(&self, user_id: Uuid) -> PortResult<CheckoutSession>;
}
