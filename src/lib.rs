// Public modules
pub mod chat;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod render;
pub mod transcript;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use chat::{ChatSession, SessionConfig, SessionObserver, SessionState};
pub use connection::{ChannelMode, ConnectResult, ConnectionEvent, ConnectionManager, Reply};
pub use endpoint::{EndpointConfig, Environment};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{MarkdownRenderer, MessageRenderer, PlainRenderer, SafeHtml};
pub use transcript::{ConversationHistory, Transcript};
pub use types::*;
