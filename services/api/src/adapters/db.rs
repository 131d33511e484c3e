//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The two invariant-bearing operations live here: `commit_generation` runs
//! the credit debit and the flashcard inserts inside one transaction, and
//! `credit_settlement` uses the `payment_events` table as an idempotency
//! guard so a replayed webhook can never double-credit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use study_buddy_core::domain::{CardContent, SettlementOutcome, User, UserCredentials};
use study_buddy_core::fingerprint::ContentFingerprint;
use study_buddy_core::ports::{DatabaseService, PortError, PortResult};
use study_buddy_core::service::GENERATION_COST;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps an sqlx error onto the port's vocabulary. Connection-level failures
/// become `Unavailable` so the caller can distinguish "store unreachable"
/// from "transaction went wrong".
fn map_db_err(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    username: String,
    credits: i64,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            username: self.username,
            credits: self.credits,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    username: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            username: self.username,
            hashed_password: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct CardRecord {
    question: String,
    answer: String,
}
impl CardRecord {
    fn to_domain(self) -> CardContent {
        CardContent {
            question: self.question,
            answer: self.answer,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, username, password_hash, credits)
             VALUES ($1, $2, $3, 0)
             RETURNING user_id, username, credits",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(record.to_domain())
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("User '{}' not found", username))
            }
            _ => map_db_err(e),
        })?;

        Ok(record.to_domain())
    }

    async fn load_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, username, credits FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => map_db_err(e),
        })?;

        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => map_db_err(e),
        })?;

        Ok(row.0)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn find_cards_by_fingerprint(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> PortResult<Vec<CardContent>> {
        // Deliberately not filtered by user: cards generated by anyone for
        // the same text satisfy everyone's request. Ordered by the seq
        // serial, not created_at: all rows of one batch share the
        // transaction timestamp.
        let records = sqlx::query_as::<_, CardRecord>(
            "SELECT question, answer FROM flashcards WHERE context_hash = $1 ORDER BY seq ASC",
        )
        .bind(fingerprint.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn commit_generation(
        &self,
        user_id: Uuid,
        fingerprint: &ContentFingerprint,
        cards: &[CardContent],
    ) -> PortResult<i64> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // The guarded UPDATE both debits and enforces the non-negative
        // invariant: zero rows means the balance could not cover the cost.
        // Row-level locking serializes this against a concurrent settlement
        // credit on the same user.
        let debited = sqlx::query_as::<_, (i64,)>(
            "UPDATE users SET credits = credits - $1
             WHERE user_id = $2 AND credits >= $1
             RETURNING credits",
        )
        .bind(GENERATION_COST)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let new_balance = match debited {
            Some((balance,)) => balance,
            // Dropping the transaction rolls it back.
            None => return Err(PortError::InsufficientFunds),
        };

        for card in cards {
            sqlx::query(
                "INSERT INTO flashcards (id, user_id, context_hash, question, answer)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(fingerprint.as_str())
            .bind(&card.question)
            .bind(&card.answer)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(new_balance)
    }

    async fn credit_settlement(
        &self,
        event_id: &str,
        user_id: Uuid,
        amount: i64,
    ) -> PortResult<SettlementOutcome> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // The primary key on event_id is the idempotency guard: a replayed
        // delivery conflicts, inserts nothing, and must not credit again.
        let inserted = sqlx::query(
            "INSERT INTO payment_events (event_id, user_id, credited)
             VALUES ($1, $2, $3)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if inserted.rows_affected() == 0 {
            return Ok(SettlementOutcome::AlreadyApplied);
        }

        let (new_balance,) = sqlx::query_as::<_, (i64,)>(
            "UPDATE users SET credits = credits + $1 WHERE user_id = $2 RETURNING credits",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => map_db_err(e),
        })?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(SettlementOutcome::Applied { new_balance })
    }
}
