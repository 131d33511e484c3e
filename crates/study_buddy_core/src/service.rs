//! crates/study_buddy_core/src/service.rs
//!
//! The flashcard orchestrator: the one place where the cache, the generation
//! client, and the credit ledger are composed. The ordering here is the
//! critical contract - a credit is spent only on a true cache miss that
//! successfully produced new content, and a cache hit is always free.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::CardContent;
use crate::fingerprint::ContentFingerprint;
use crate::ports::{CardGenerationService, DatabaseService, PortError};

/// How many Q&A pairs a single generation is asked to produce.
pub const CARDS_PER_GENERATION: usize = 5;

/// Credits debited per cache-missing generation.
pub const GENERATION_COST: i64 = 1;

/// The outcome of a successful flashcard request.
#[derive(Debug, Clone)]
pub struct FlashcardSet {
    pub cards: Vec<CardContent>,
    /// Whether the cards came from the shared cache (free) or were freshly
    /// generated (debited).
    pub from_cache: bool,
    /// The user's balance after the request, re-read from or returned by the
    /// store - never a stale in-memory copy.
    pub remaining_credits: i64,
}

/// Everything that can go wrong while serving a flashcard request.
#[derive(Debug, thiserror::Error)]
pub enum FlashcardError {
    #[error("Insufficient credits. Please purchase more.")]
    InsufficientFunds,
    #[error("Text cannot be empty")]
    EmptyInput,
    #[error("Failed to generate flashcards from AI model")]
    GenerationFailed,
    #[error("A database error occurred during transaction.")]
    TransactionFailed,
    #[error("Database connection failed")]
    StoreUnavailable,
}

impl From<PortError> for FlashcardError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::InsufficientFunds => FlashcardError::InsufficientFunds,
            PortError::Unavailable(_) => FlashcardError::StoreUnavailable,
            _ => FlashcardError::TransactionFailed,
        }
    }
}

/// Orchestrates one flashcard request end to end:
/// gate on credits, fingerprint, cache check, generate on miss, then commit
/// the debit and the new cards as a single atomic unit.
pub struct FlashcardService {
    db: Arc<dyn DatabaseService>,
    generator: Arc<dyn CardGenerationService>,
}

impl FlashcardService {
    pub fn new(db: Arc<dyn DatabaseService>, generator: Arc<dyn CardGenerationService>) -> Self {
        Self { db, generator }
    }

    /// Serves one flashcard request for `user_id` over the submitted `text`.
    ///
    /// State machine:
    /// 1. Reject with `InsufficientFunds` before any work if the balance
    ///    cannot cover a generation (avoids wasted upstream calls).
    /// 2. Reject with `EmptyInput` if the text is blank after trimming.
    /// 3. Cache hit: return the shared cards, no debit, no generation.
    /// 4. Cache miss: call the generation client once; an empty result is
    ///    `GenerationFailed` with no debit and nothing persisted.
    /// 5. Commit debit + inserts atomically; any store failure leaves the
    ///    balance and the cache untouched.
    pub async fn generate_flashcards(
        &self,
        user_id: Uuid,
        text: &str,
    ) -> Result<FlashcardSet, FlashcardError> {
        let user = self.db.load_user(user_id).await?;
        if user.credits < GENERATION_COST {
            return Err(FlashcardError::InsufficientFunds);
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(FlashcardError::EmptyInput);
        }
        let fingerprint = ContentFingerprint::of(text);

        // Cards cached by ANY user satisfy the request; only a genuinely new
        // text costs a credit.
        let cached = self.db.find_cards_by_fingerprint(&fingerprint).await?;
        if !cached.is_empty() {
            return Ok(FlashcardSet {
                cards: cached,
                from_cache: true,
                remaining_credits: user.credits,
            });
        }

        let generated = self.generator.generate_cards(text).await;
        if generated.is_empty() {
            return Err(FlashcardError::GenerationFailed);
        }

        let remaining_credits = self
            .db
            .commit_generation(user_id, &fingerprint, &generated)
            .await?;

        Ok(FlashcardSet {
            cards: generated,
            from_cache: false,
            remaining_credits,
        })
    }
}
