//! services/api/src/web/payments.rs
//!
//! Payment endpoints: starting a credit-bundle checkout and receiving the
//! provider's settlement webhook.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use study_buddy_core::settlement::{SettlementDisposition, SettlementError};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// The checkout session the frontend redirects to.
#[derive(Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /create-checkout-session - Start a purchase of one credit bundle.
#[utoipa::path(
    post,
    path = "/create-checkout-session",
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Payment provider error")
    )
)]
pub async fn create_checkout_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<CheckoutSessionResponse>, (StatusCode, String)> {
    let session = state
        .payments
        .create_checkout_session(user_id)
        .await
        .map_err(|e| {
            error!("Failed to create checkout session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create checkout session".to_string(),
            )
        })?;

    info!(user_id = %user_id, session_id = %session.session_id, "Checkout session created");

    Ok(Json(CheckoutSessionResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

/// POST /stripe-webhook - Settlement notifications from the payment provider.
///
/// The body must stay raw: the signature covers the exact bytes Stripe sent.
/// This endpoint is unauthenticated; the HMAC signature is the authenticator.
pub async fn stripe_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let signature_header = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.settlement.handle_event(&body, signature_header).await {
        Ok(SettlementDisposition::Credited {
            user_id,
            new_balance,
        }) => {
            info!(user_id = %user_id, new_balance, "Payment settled, credits applied");
            (StatusCode::OK, "Success")
        }
        Ok(SettlementDisposition::Replayed) => {
            warn!("Replayed settlement event acknowledged without credit");
            (StatusCode::OK, "Success")
        }
        Ok(SettlementDisposition::Ignored) => (StatusCode::OK, "Success"),
        Err(SettlementError::InvalidSignature) => {
            warn!("Webhook rejected: invalid signature");
            (StatusCode::BAD_REQUEST, "Invalid signature")
        }
        Err(SettlementError::InvalidPayload) => {
            warn!("Webhook rejected: invalid payload");
            (StatusCode::BAD_REQUEST, "Invalid payload")
        }
        Err(SettlementError::Store(e)) => {
            error!("Settlement failed against the store: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Settlement failed")
        }
    }
}
