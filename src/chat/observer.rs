use crate::connection::ConnectionState;
use crate::types::{Action, Turn};

use super::session::SessionState;

/// Receives everything a host surface needs to redraw.
///
/// All methods default to no-ops so implementors pick what they care about.
pub trait SessionObserver: Send {
    /// The session moved between states.
    fn on_state_change(&mut self, from: SessionState, to: SessionState) {
        _ = from;
        _ = to;
    }

    /// The underlying connection moved between states.
    fn on_connection_state(&mut self, state: ConnectionState) {
        _ = state;
    }

    /// A turn was appended to the transcript.
    fn on_turn(&mut self, turn: &Turn) {
        _ = turn;
    }

    /// A reply carried page actions.
    fn on_actions(&mut self, actions: &[Action]) {
        _ = actions;
    }

    /// Input became enabled or disabled.
    fn on_input_enabled(&mut self, enabled: bool) {
        _ = enabled;
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}
