pub mod domain;
pub mod fingerprint;
pub mod ports;
pub mod service;
pub mod settlement;

pub use domain::{
    AuthSession, CardContent, CheckoutSession, Flashcard, SettlementOutcome, User, UserCredentials,
};
pub use fingerprint::ContentFingerprint;
pub use ports::{CardGenerationService, DatabaseService, PaymentGateway, PortError, PortResult};
pub use service::{FlashcardError, FlashcardService, FlashcardSet};
pub use settlement::{SettlementDisposition, SettlementError, SettlementHandler};
