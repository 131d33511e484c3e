pub mod auth;
pub mod middleware;
pub mod payments;
pub mod rest;
pub mod state;

// Re-export the main handlers to make them easily accessible
// to the binary that will build the web server router.
pub use middleware::require_auth;
pub use payments::{create_checkout_session_handler, stripe_webhook_handler};
pub use rest::{config_handler, generate_flashcards_handler, me_handler};
