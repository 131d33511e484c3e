//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the flashcard REST endpoints and the master
//! definition for the OpenAPI specification.

use axum::{extract::State, http::StatusCode, response::Json, Extension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_buddy_core::domain::CardContent;
use study_buddy_core::service::FlashcardError;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_flashcards_handler,
        me_handler,
        config_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::payments::create_checkout_session_handler,
    ),
    components(
        schemas(
            GenerateFlashcardsRequest,
            CardResponse,
            MeResponse,
            FrontendConfigResponse,
            ErrorResponse,
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
            crate::web::payments::CheckoutSessionResponse,
        )
    ),
    tags(
        (name = "Study Buddy API", description = "API endpoints for AI flashcard generation and credit purchases.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateFlashcardsRequest {
    pub text: String,
}

/// One question/answer flashcard as returned to the caller.
#[derive(Serialize, ToSchema)]
pub struct CardResponse {
    pub question: String,
    pub answer: String,
}

impl From<CardContent> for CardResponse {
    fn from(card: CardContent) -> Self {
        Self {
            question: card.question,
            answer: card.answer,
        }
    }
}

/// The current user's identity and credit balance.
#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub credits: i64,
}

/// Public configuration the frontend needs to start a checkout.
#[derive(Serialize, ToSchema)]
pub struct FrontendConfigResponse {
    #[serde(rename = "publishableKey")]
    pub publishable_key: String,
}

/// The stable error shape for every failure: a short message and a
/// machine-readable kind. Internal error text never leaks here.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Maps an orchestrator failure onto its stable status and error kind.
fn flashcard_error_response(err: FlashcardError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind) = match err {
        FlashcardError::InsufficientFunds => (StatusCode::FORBIDDEN, "insufficient_funds"),
        FlashcardError::EmptyInput => (StatusCode::BAD_REQUEST, "empty_input"),
        FlashcardError::GenerationFailed => {
            (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed")
        }
        FlashcardError::TransactionFailed => {
            (StatusCode::INTERNAL_SERVER_ERROR, "transaction_failed")
        }
        FlashcardError::StoreUnavailable => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable")
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind,
        }),
    )
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Generate flashcards for the submitted study text.
///
/// A cached text (submitted before by any user) is returned for free;
/// a genuinely new text costs one credit and is charged only if the
/// generated cards were persisted.
#[utoipa::path(
    post,
    path = "/generate-flashcards",
    request_body = GenerateFlashcardsRequest,
    responses(
        (status = 200, description = "Flashcards for the submitted text", body = [CardResponse]),
        (status = 400, description = "Empty input", body = ErrorResponse),
        (status = 403, description = "Insufficient credits", body = ErrorResponse),
        (status = 500, description = "Generation or store failure", body = ErrorResponse)
    )
)]
pub async fn generate_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateFlashcardsRequest>,
) -> Result<Json<Vec<CardResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let set = state
        .flashcards
        .generate_flashcards(user_id, &req.text)
        .await
        .map_err(|e| {
            error!("Flashcard request failed for user {}: {:?}", user_id, e);
            flashcard_error_response(e)
        })?;

    info!(
        user_id = %user_id,
        from_cache = set.from_cache,
        cards = set.cards.len(),
        remaining_credits = set.remaining_credits,
        "Flashcard request served"
    );

    Ok(Json(set.cards.into_iter().map(CardResponse::from).collect()))
}

/// Get the current user's identity and credit balance.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The authenticated user", body = MeResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<MeResponse>, StatusCode> {
    let user = state.db.load_user(user_id).await.map_err(|e| {
        error!("Failed to load user {}: {:?}", user_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(MeResponse {
        user_id: user.user_id,
        username: user.username,
        credits: user.credits,
    }))
}

/// Get the public configuration needed by the payment frontend.
#[utoipa::path(
    get,
    path = "/config",
    responses(
        (status = 200, description = "Frontend configuration", body = FrontendConfigResponse)
    )
)]
pub async fn config_handler(State(state): State<Arc<AppState>>) -> Json<FrontendConfigResponse> {
    Json(FrontendConfigResponse {
        publishable_key: state.config.stripe_publishable_key.clone(),
    })
}
