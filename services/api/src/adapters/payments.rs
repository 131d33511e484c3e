//! services/api/src/adapters/payments.rs
//!
//! This module contains the adapter for the payment provider. It implements
//! the `PaymentGateway` port from the `core` crate by calling Stripe's
//! Checkout Sessions REST endpoint directly.

use async_trait::async_trait;
use serde::Deserialize;
use study_buddy_core::domain::CheckoutSession;
use study_buddy_core::ports::{PaymentGateway, PortError, PortResult};
use study_buddy_core::settlement::SETTLEMENT_CREDIT_BUNDLE;
use uuid::Uuid;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Price of one credit bundle in US cents ($5.00).
const BUNDLE_PRICE_CENTS: &str = "500";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PaymentGateway` against the Stripe REST API.
#[derive(Clone)]
pub struct StripeGatewayAdapter {
    client: reqwest::Client,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl StripeGatewayAdapter {
    /// Creates a new `StripeGatewayAdapter`.
    pub fn new(
        client: reqwest::Client,
        secret_key: String,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            client,
            secret_key,
            success_url,
            cancel_url,
        }
    }
}

/// The subset of Stripe's Checkout Session object this adapter reads.
#[derive(Deserialize)]
struct StripeCheckoutResponse {
    id: String,
    url: String,
}

//=========================================================================================
// `PaymentGateway` Trait Implementation
//=========================================================================================

#[async_trait]
impl PaymentGateway for StripeGatewayAdapter {
    /// Creates a hosted Checkout session for one fixed-price credit bundle.
    ///
    /// The user's id travels as `client_reference_id` so the settlement
    /// webhook can attribute the payment later.
    async fn create_checkout_session(&self, user_id: Uuid) -> PortResult<CheckoutSession> {
        let product_name = format!("{} Study Buddy Credits", SETTLEMENT_CREDIT_BUNDLE);
        let user_reference = user_id.to_string();
        let params: [(&str, &str); 9] = [
            ("payment_method_types[0]", "card"),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][product_data][name]", &product_name),
            ("line_items[0][price_data][unit_amount]", BUNDLE_PRICE_CENTS),
            ("line_items[0][quantity]", "1"),
            ("mode", "payment"),
            ("success_url", &self.success_url),
            ("cancel_url", &self.cancel_url),
            ("client_reference_id", &user_reference),
        ];

        let response = self
            .client
            .post(CHECKOUT_SESSIONS_URL)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Stripe returned HTTP {}",
                response.status()
            )));
        }

        let session: StripeCheckoutResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url,
        })
    }
}
