//! crates/study_buddy_core/src/settlement.rs
//!
//! Payment settlement: verifies signed webhook notifications from the
//! payment provider and credits the user's balance, idempotently per
//! external event id. This is the only code path that ever increases a
//! balance.
//!
//! The signature scheme matches Stripe's: a header of the form
//! `t=<unix-timestamp>,v1=<hex-signature>` where the signature is
//! HMAC-SHA256 over `"{t}.{raw_body}"` with the shared webhook secret.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::SettlementOutcome;
use crate::ports::{DatabaseService, PortError};

type HmacSha256 = Hmac<Sha256>;

/// Credits granted per settled payment (one fixed-price bundle).
pub const SETTLEMENT_CREDIT_BUNDLE: i64 = 10;

/// The event kind that carries a settled payment. Everything else is
/// acknowledged without touching the ledger.
const COMPLETED_EVENT_KIND: &str = "checkout.session.completed";

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid payload")]
    InvalidPayload,
    #[error("Settlement store error: {0}")]
    Store(#[from] PortError),
}

/// What a verified webhook delivery amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementDisposition {
    /// A completed payment was attributed and credited.
    Credited { user_id: Uuid, new_balance: i64 },
    /// A completed payment whose event id was already applied; no mutation.
    Replayed,
    /// A valid event that requires no action (wrong kind, or no user
    /// reference to attribute the credit to).
    Ignored,
}

//=========================================================================================
// Webhook payload shape (the subset this handler reads)
//=========================================================================================

// The data envelope is optional end to end: event kinds this handler
// ignores are acknowledged whatever their body carries, and a completed
// payment without one simply cannot be attributed.
#[derive(Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Deserialize)]
struct EventData {
    #[serde(default)]
    object: Option<EventObject>,
}

#[derive(Deserialize)]
struct EventObject {
    #[serde(default)]
    client_reference_id: Option<String>,
}

//=========================================================================================
// The Settlement Handler
//=========================================================================================

/// Verifies inbound payment notifications and applies their credits.
pub struct SettlementHandler {
    db: Arc<dyn DatabaseService>,
    webhook_secret: String,
}

impl SettlementHandler {
    pub fn new(db: Arc<dyn DatabaseService>, webhook_secret: String) -> Self {
        Self { db, webhook_secret }
    }

    /// Processes one webhook delivery.
    ///
    /// 1. Verify the signature over the exact raw body; reject otherwise.
    /// 2. Parse the payload; reject if malformed.
    /// 3. Only `checkout.session.completed` mutates the ledger; other kinds
    ///    and events without a user reference are acknowledged as no-ops.
    /// 4. Credit [`SETTLEMENT_CREDIT_BUNDLE`], idempotently per event id.
    pub async fn handle_event(
        &self,
        raw_body: &str,
        signature_header: &str,
    ) -> Result<SettlementDisposition, SettlementError> {
        verify_signature(&self.webhook_secret, raw_body, signature_header)?;

        let event: WebhookEvent =
            serde_json::from_str(raw_body).map_err(|_| SettlementError::InvalidPayload)?;

        if event.kind != COMPLETED_EVENT_KIND {
            return Ok(SettlementDisposition::Ignored);
        }

        // Without a user reference the credit cannot be attributed.
        let user_id = match event
            .data
            .and_then(|data| data.object)
            .and_then(|object| object.client_reference_id)
            .and_then(|id| Uuid::parse_str(&id).ok())
        {
            Some(id) => id,
            None => return Ok(SettlementDisposition::Ignored),
        };

        let outcome = self
            .db
            .credit_settlement(&event.id, user_id, SETTLEMENT_CREDIT_BUNDLE)
            .await?;

        Ok(match outcome {
            SettlementOutcome::Applied { new_balance } => SettlementDisposition::Credited {
                user_id,
                new_balance,
            },
            SettlementOutcome::AlreadyApplied => SettlementDisposition::Replayed,
        })
    }
}

//=========================================================================================
// Signature verification
//=========================================================================================

/// Checks a `t=...,v1=...` signature header against the raw body.
fn verify_signature(secret: &str, raw_body: &str, header: &str) -> Result<(), SettlementError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(v1)) => (t, v1),
        _ => return Err(SettlementError::InvalidSignature),
    };

    let provided = hex::decode(signature).ok_or(SettlementError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SettlementError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body.as_bytes());

    // verify_slice is constant-time.
    mac.verify_slice(&provided)
        .map_err(|_| SettlementError::InvalidSignature)
}

mod hex {
    /// Decode a lowercase/uppercase hex string; None on any non-hex input.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CardContent, User, UserCredentials};
    use crate::fingerprint::ContentFingerprint;
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Signs a body the way the provider would, for building test headers.
    fn signature_header(secret: &str, timestamp: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        let signature: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("t={timestamp},v1={signature}")
    }

    fn completed_event_body(event_id: &str, user_id: Option<Uuid>) -> String {
        let reference = match user_id {
            Some(id) => format!("\"{id}\""),
            None => "null".to_string(),
        };
        format!(
            r#"{{"id":"{event_id}","type":"checkout.session.completed","data":{{"object":{{"client_reference_id":{reference}}}}}}}"#
        )
    }

    /// Ledger-only fake; the flashcard methods are never reached here.
    struct FakeLedger {
        balances: Mutex<HashMap<Uuid, i64>>,
        settled_events: Mutex<Vec<String>>,
    }

    impl FakeLedger {
        fn with_balance(user_id: Uuid, credits: i64) -> Self {
            Self {
                balances: Mutex::new(HashMap::from([(user_id, credits)])),
                settled_events: Mutex::new(Vec::new()),
            }
        }

        fn balance(&self, user_id: Uuid) -> i64 {
            self.balances.lock().unwrap()[&user_id]
        }
    }

    #[async_trait]
    impl DatabaseService for FakeLedger {
        async fn create_user(&self, _username: &str, _hash: &str) -> PortResult<User> {
            unimplemented!()
        }

        async fn get_user_credentials(&self, _username: &str) -> PortResult<UserCredentials> {
            unimplemented!()
        }

        async fn load_user(&self, _user_id: Uuid) -> PortResult<User> {
            unimplemented!()
        }

        async fn create_auth_session(
            &self,
            _session_id: &str,
            _user_id: Uuid,
            _expires_at: DateTime<Utc>,
        ) -> PortResult<()> {
            unimplemented!()
        }

        async fn validate_auth_session(&self, _session_id: &str) -> PortResult<Uuid> {
            unimplemented!()
        }

        async fn delete_auth_session(&self, _session_id: &str) -> PortResult<()> {
            unimplemented!()
        }

        async fn find_cards_by_fingerprint(
            &self,
            _fingerprint: &ContentFingerprint,
        ) -> PortResult<Vec<CardContent>> {
            unimplemented!()
        }

        async fn commit_generation(
            &self,
            _user_id: Uuid,
            _fingerprint: &ContentFingerprint,
            _cards: &[CardContent],
        ) -> PortResult<i64> {
            unimplemented!()
        }

        async fn credit_settlement(
            &self,
            event_id: &str,
            user_id: Uuid,
            amount: i64,
        ) -> PortResult<SettlementOutcome> {
            let mut events = self.settled_events.lock().unwrap();
            if events.iter().any(|e| e == event_id) {
                return Ok(SettlementOutcome::AlreadyApplied);
            }
            events.push(event_id.to_string());
            let mut balances = self.balances.lock().unwrap();
            let balance = balances.entry(user_id).or_insert(0);
            *balance += amount;
            Ok(SettlementOutcome::Applied {
                new_balance: *balance,
            })
        }
    }

    const SECRET: &str = "whsec_test_secret";

    fn handler(db: Arc<FakeLedger>) -> SettlementHandler {
        SettlementHandler::new(db, SECRET.to_string())
    }

    #[tokio::test]
    async fn completed_payment_credits_ten() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = completed_event_body("evt_001", Some(user));
        let header = signature_header(SECRET, "1700000000", &body);

        let disposition = handler(db.clone()).handle_event(&body, &header).await.unwrap();

        assert_eq!(
            disposition,
            SettlementDisposition::Credited {
                user_id: user,
                new_balance: 12
            }
        );
        assert_eq!(db.balance(user), 12);
    }

    #[tokio::test]
    async fn replayed_event_id_credits_only_once() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 0));
        let handler = handler(db.clone());
        let body = completed_event_body("evt_replay", Some(user));
        let header = signature_header(SECRET, "1700000000", &body);

        let first = handler.handle_event(&body, &header).await.unwrap();
        let second = handler.handle_event(&body, &header).await.unwrap();

        assert!(matches!(first, SettlementDisposition::Credited { .. }));
        assert_eq!(second, SettlementDisposition::Replayed);
        assert_eq!(db.balance(user), SETTLEMENT_CREDIT_BUNDLE);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_mutation() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = completed_event_body("evt_002", Some(user));
        let header = signature_header("whsec_wrong_secret", "1700000000", &body);

        let err = handler(db.clone()).handle_event(&body, &header).await.unwrap_err();

        assert!(matches!(err, SettlementError::InvalidSignature));
        assert_eq!(db.balance(user), 2);
    }

    #[tokio::test]
    async fn tampered_body_fails_verification() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = completed_event_body("evt_003", Some(user));
        let header = signature_header(SECRET, "1700000000", &body);
        let tampered = body.replace("evt_003", "evt_004");

        let err = handler(db.clone())
            .handle_event(&tampered, &header)
            .await
            .unwrap_err();

        assert!(matches!(err, SettlementError::InvalidSignature));
    }

    #[tokio::test]
    async fn malformed_header_is_invalid_signature() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = completed_event_body("evt_005", Some(user));

        for header in ["", "v1=deadbeef", "t=123", "t=123,v1=not-hex"] {
            let err = handler(db.clone()).handle_event(&body, header).await.unwrap_err();
            assert!(matches!(err, SettlementError::InvalidSignature));
        }
    }

    #[tokio::test]
    async fn signed_garbage_is_invalid_payload() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = "not json at all";
        let header = signature_header(SECRET, "1700000000", body);

        let err = handler(db.clone()).handle_event(body, &header).await.unwrap_err();

        assert!(matches!(err, SettlementError::InvalidPayload));
        assert_eq!(db.balance(user), 2);
    }

    #[tokio::test]
    async fn other_event_kinds_are_acknowledged_as_noops() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = format!(
            r#"{{"id":"evt_006","type":"payment_intent.created","data":{{"object":{{"client_reference_id":"{user}"}}}}}}"#
        );
        let header = signature_header(SECRET, "1700000000", &body);

        let disposition = handler(db.clone()).handle_event(&body, &header).await.unwrap();

        assert_eq!(disposition, SettlementDisposition::Ignored);
        assert_eq!(db.balance(user), 2);
    }

    #[tokio::test]
    async fn filtered_kind_without_a_data_envelope_is_a_noop() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        // Some event kinds carry no data.object at all; a signed one must
        // still be acknowledged, not rejected as malformed.
        let body = r#"{"id":"evt_008","type":"charge.updated"}"#;
        let header = signature_header(SECRET, "1700000000", body);

        let disposition = handler(db.clone()).handle_event(body, &header).await.unwrap();

        assert_eq!(disposition, SettlementDisposition::Ignored);
        assert_eq!(db.balance(user), 2);
    }

    #[tokio::test]
    async fn completed_payment_without_a_data_envelope_is_a_noop() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = r#"{"id":"evt_009","type":"checkout.session.completed"}"#;
        let header = signature_header(SECRET, "1700000000", body);

        let disposition = handler(db.clone()).handle_event(body, &header).await.unwrap();

        assert_eq!(disposition, SettlementDisposition::Ignored);
        assert_eq!(db.balance(user), 2);
    }

    #[tokio::test]
    async fn missing_user_reference_is_a_noop() {
        let user = Uuid::new_v4();
        let db = Arc::new(FakeLedger::with_balance(user, 2));
        let body = completed_event_body("evt_007", None);
        let header = signature_header(SECRET, "1700000000", &body);

        let disposition = handler(db.clone()).handle_event(&body, &header).await.unwrap();

        assert_eq!(disposition, SettlementDisposition::Ignored);
        assert_eq!(db.balance(user), 2);
    }
}
