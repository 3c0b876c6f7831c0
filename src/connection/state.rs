use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle of the connection manager.
///
/// The legal moves are:
///
/// ```text
/// Unconnected | Closed  -> Connecting
/// Connecting            -> Live | Fallback
/// Live                  -> Fallback
/// any but Closed        -> Closed
/// ```
///
/// There is no way back from `Fallback` to `Live` within a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected.
    Unconnected,
    /// Attempting the live channel.
    Connecting,
    /// The live channel is open and greeted.
    Live,
    /// Messages go through the request/response fallback.
    Fallback,
    /// Torn down; a new `connect` starts a fresh session.
    Closed,
}

impl ConnectionState {
    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Unconnected | Closed, Connecting)
                | (Connecting, Live | Fallback)
                | (Live, Fallback)
                | (Unconnected | Connecting | Live | Fallback, Closed)
        )
    }

    /// Validates a move, returning the new state.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::invalid_state(
                format!("cannot move from {self} to {next}"),
                self.as_str(),
            ))
        }
    }

    /// Returns true if messages can be sent in this state.
    pub fn accepts_messages(self) -> bool {
        matches!(self, ConnectionState::Live | ConnectionState::Fallback)
    }

    /// The transport that carries messages in this state.
    pub fn channel_mode(self) -> ChannelMode {
        match self {
            ConnectionState::Live => ChannelMode::Live,
            ConnectionState::Fallback => ChannelMode::Fallback,
            _ => ChannelMode::Unset,
        }
    }

    /// Returns the state name.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Live => "live",
            ConnectionState::Fallback => "fallback",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transport is carrying messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    /// No transport selected yet.
    Unset,
    /// Persistent bidirectional channel.
    Live,
    /// Stateless request/response.
    Fallback,
}

impl ChannelMode {
    /// Returns the mode name.
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMode::Unset => "unset",
            ChannelMode::Live => "live",
            ChannelMode::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
