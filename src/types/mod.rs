// Public modules
pub mod action;
pub mod chat_request;
pub mod chat_response;
pub mod envelope;
pub mod health_status;
pub mod turn;

// Re-exports
pub use action::Action;
pub use chat_request::{ChatRequest, HistoryEntry};
pub use chat_response::ChatResponse;
pub use envelope::{InboundEnvelope, OutboundEnvelope};
pub use health_status::HealthStatus;
pub use turn::{Role, Turn};
