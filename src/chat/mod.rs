//! Chat session layer for the widget.
//!
//! This module sits on top of the [`connection`](crate::connection) layer
//! and provides:
//!
//! - The session state machine (closed, connecting, ready, sending, errored)
//! - Transcript maintenance and rendering of every turn
//! - Observer callbacks for host surfaces
//! - Slash commands for the terminal front end
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The session controller
//! - [`observer`]: Host notification hooks
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod observer;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, DEFAULT_REPLY_TIMEOUT, SessionConfig};
pub use observer::{NullObserver, SessionObserver};
pub use session::{BACKEND_UNREACHABLE_NOTICE, ChatSession, SessionState, user_notice};
