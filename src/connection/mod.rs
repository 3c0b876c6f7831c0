//! Transport management for the widget.
//!
//! A [`ConnectionManager`] prefers a persistent [`LiveChannel`] and falls back
//! to stateless requests through a [`FallbackTransport`] when the live channel
//! is unavailable.  Callers see the same `send`/`next_event` surface in both
//! modes.

mod fallback;
mod live;
mod manager;
pub mod scripted;
mod state;

pub use fallback::{FallbackTransport, HttpFallback};
pub use live::{LiveChannel, LiveConnector, WebSocketChannel, WebSocketConnector};
pub use manager::{ConnectResult, ConnectionEvent, ConnectionManager, Reply};
pub use scripted::{ScriptedChannel, ScriptedConnector, ScriptedFallback, ScriptedServer};
pub use state::{ChannelMode, ConnectionState};
