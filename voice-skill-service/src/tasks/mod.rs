// Turn tasks, in graph order
pub mod classify_intent;
pub mod verification;
pub mod pairing;
pub mod authenticate;
pub mod continuation;
pub mod shipment_list;
pub mod general_chat;

// Shared modules
pub mod types;

// Re-export task implementations
pub use authenticate::AuthenticateTask;
pub use classify_intent::ClassifyIntentTask;
pub use continuation::ContinuationTask;
pub use general_chat::GeneralChatTask;
pub use pairing::PairingTask;
pub use shipment_list::ShipmentListTask;
pub use verification::VerificationTask;

// Re-export session keys
pub use types::session_keys;
