//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{generation, DbAdapter, OpenAiGenerationAdapter, StripeGatewayAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        config_handler, create_checkout_session_handler, generate_flashcards_handler, me_handler,
        middleware::require_auth,
        rest::ApiDoc,
        state::AppState,
        stripe_webhook_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use study_buddy_core::service::FlashcardService;
use study_buddy_core::settlement::SettlementHandler;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter
        .run_migrations()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    // One outbound HTTP client with a bounded total timeout, shared by the
    // generation call and the Stripe call; a stuck upstream surfaces as a
    // failed request instead of hanging.
    let http_client = reqwest::Client::builder()
        .timeout(generation::UPSTREAM_TIMEOUT)
        .build()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client =
        Client::with_config(openai_config).with_http_client(http_client.clone());

    let generation_adapter = Arc::new(OpenAiGenerationAdapter::new(
        openai_client,
        config.generation_model.clone(),
    ));
    let payments_adapter = Arc::new(StripeGatewayAdapter::new(
        http_client,
        config.stripe_secret_key.clone(),
        config.checkout_success_url.clone(),
        config.checkout_cancel_url.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let flashcards = FlashcardService::new(db_adapter.clone(), generation_adapter);
    let settlement = SettlementHandler::new(
        db_adapter.clone(),
        config.stripe_webhook_secret.clone(),
    );
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        flashcards,
        settlement,
        payments: payments_adapter,
    });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required; the webhook is authenticated by its
    // HMAC signature, not by a session cookie)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/stripe-webhook", post(stripe_webhook_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/generate-flashcards", post(generate_flashcards_handler))
        .route("/me", get(me_handler))
        .route("/config", get(config_handler))
        .route(
            "/create-checkout-session",
            post(create_checkout_session_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
