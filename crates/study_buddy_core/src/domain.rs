//! crates/study_buddy_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    /// Usage credits remaining. Never negative; one credit is spent per
    /// cache-missing flashcard generation.
    pub credits: i64,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The question/answer content of one flashcard, detached from any stored
/// row. This is what the cache hands back and what the generation client
/// produces.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CardContent {
    pub question: String,
    pub answer: String,
}

/// A persisted flashcard row. Ownership is recorded for attribution only;
/// lookups by fingerprint are global across users.
#[derive(Debug, Clone)]
pub struct Flashcard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub context_hash: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// A Stripe Checkout session created for a credit purchase.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// The outcome of applying a settlement credit for one external event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// First delivery of this event id; the balance was increased.
    Applied { new_balance: i64 },
    /// Replay of an event id that was already credited. No mutation.
    AlreadyApplied,
}
