pub mod db;
pub mod generation;
pub mod payments;

pub use db::DbAdapter;
pub use generation::OpenAiGenerationAdapter;
pub use payments::StripeGatewayAdapter;
