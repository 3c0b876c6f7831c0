//! Chat session management.
//!
//! A [`ChatSession`] is the state machine behind the widget: it opens the
//! connection, turns user input into sends, turns connection events into
//! transcript turns, and tells its [`SessionObserver`] when input should be
//! enabled.

use std::fmt;

use crate::connection::{
    ChannelMode, ConnectResult, ConnectionEvent, ConnectionManager, ConnectionState, Reply,
};
use crate::error::{Error, Result};
use crate::observability::{SESSION_OPENS, SESSION_REJECTED_SUBMITS, SESSION_REPLY_TIMEOUTS};
use crate::render::{MessageRenderer, renderer_for};
use crate::transcript::{ConversationHistory, Transcript};
use crate::types::{HealthStatus, Role};

use super::config::SessionConfig;
use super::observer::{NullObserver, SessionObserver};

/// Shown in place of transport details when the backend cannot be reached.
pub const BACKEND_UNREACHABLE_NOTICE: &str =
    "Failed to connect to the chat service. Please make sure the backend is running.";

/// Lifecycle of a chat session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not open.  The transcript is empty.
    Closed,
    /// Opening the connection.
    Connecting,
    /// Waiting for user input.
    Ready,
    /// A message is outstanding; input is disabled.
    Sending,
    /// The last send failed; the next submit retries.
    Errored,
}

impl SessionState {
    /// Returns true if the user may type in this state.
    pub fn input_enabled(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Errored)
    }

    /// Returns the state name.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Closed => "closed",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Sending => "sending",
            SessionState::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat session bound to one connection manager.
pub struct ChatSession {
    config: SessionConfig,
    manager: ConnectionManager,
    renderer: Box<dyn MessageRenderer>,
    observer: Box<dyn SessionObserver>,
    transcript: Transcript,
    state: SessionState,
    last_error: Option<Error>,
}

impl ChatSession {
    /// Creates a closed session over `manager`.
    pub fn new(manager: ConnectionManager, config: SessionConfig) -> Self {
        let manager = manager.with_history_limit(config.history_limit);
        Self {
            renderer: renderer_for(config.markdown),
            observer: Box::new(NullObserver),
            transcript: Transcript::new(config.transcript_limit),
            state: SessionState::Closed,
            last_error: None,
            manager,
            config,
        }
    }

    /// Creates a closed session over WebSocket and HTTP.
    pub fn network(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let manager = ConnectionManager::network(&config.endpoints)?;
        Ok(Self::new(manager, config))
    }

    /// Sets the observer notified of every change.
    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Replaces the renderer chosen from the configuration.
    pub fn with_renderer(mut self, renderer: Box<dyn MessageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Switches between markdown and escaped rendering for later turns.
    pub fn set_markdown(&mut self, markdown: bool) {
        self.config.markdown = markdown;
        self.renderer = renderer_for(markdown);
    }

    /// Opens the session.
    ///
    /// Always ends in `Ready`: if the live channel is unavailable the session
    /// runs on the fallback.  The greeting is the first transcript turn.
    pub async fn open(&mut self) -> Result<ConnectResult> {
        if self.state != SessionState::Closed {
            return Err(Error::invalid_state(
                "session is already open",
                self.state.as_str(),
            ));
        }
        SESSION_OPENS.click();
        self.transcript = Transcript::new(self.config.transcript_limit);
        self.set_state(SessionState::Connecting);

        let result = self.manager.connect(&self.config.endpoints).await;
        while let Some(event) = self.manager.poll_event() {
            self.apply(event);
        }
        self.set_state(SessionState::Ready);
        tracing::info!(mode = %result.mode, "session open");
        Ok(result)
    }

    /// Submits a message without waiting for its reply.
    ///
    /// Empty input fails with `InvalidInput` and changes nothing.  Submitting
    /// while `Errored` acknowledges the error first.  Any other state but
    /// `Ready` rejects the submission with `Busy`.
    pub async fn submit(&mut self, text: &str) -> Result<()> {
        let message = text.trim();
        if message.is_empty() {
            return Err(Error::invalid_input("message is empty"));
        }
        if self.state == SessionState::Errored {
            self.acknowledge();
        }
        if self.state != SessionState::Ready {
            SESSION_REJECTED_SUBMITS.click();
            return Err(Error::busy(format!("cannot submit while {}", self.state)));
        }
        self.manager.send(message).await?;
        self.append(Role::User, message);
        self.set_state(SessionState::Sending);
        Ok(())
    }

    /// Waits for the outstanding reply.
    ///
    /// Ends in `Ready` with the reply, or in `Errored` with the failure.
    /// Waiting is bounded by the configured reply timeout.
    pub async fn await_reply(&mut self) -> Result<Reply> {
        if self.state != SessionState::Sending {
            return Err(Error::invalid_state(
                "no reply is outstanding",
                self.state.as_str(),
            ));
        }
        let timeout = self.config.reply_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, self.manager.next_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.manager.abandon_reply();
                    return Err(self.fail(Error::backend_unreachable(
                        "connection ended before a reply arrived",
                        None,
                        None,
                    )));
                }
                Err(_) => {
                    SESSION_REPLY_TIMEOUTS.click();
                    tracing::warn!(?timeout, "gave up waiting for a reply");
                    self.manager.abandon_reply();
                    return Err(self.fail(Error::backend_unreachable(
                        format!("no reply within {timeout:?}"),
                        None,
                        None,
                    )));
                }
            };
            if let Some(outcome) = self.apply(event) {
                return outcome;
            }
        }
    }

    /// Submits a message and waits for its reply.
    pub async fn send(&mut self, text: &str) -> Result<Reply> {
        self.submit(text).await?;
        self.await_reply().await
    }

    /// Stops waiting for the outstanding reply and re-enables input.
    ///
    /// Returns false if nothing was outstanding.
    pub fn cancel_reply(&mut self) -> bool {
        if self.state != SessionState::Sending {
            return false;
        }
        self.manager.abandon_reply();
        self.set_state(SessionState::Ready);
        true
    }

    /// Clears an error, returning to `Ready`.
    pub fn acknowledge(&mut self) {
        if self.state == SessionState::Errored {
            self.last_error = None;
            self.set_state(SessionState::Ready);
        }
    }

    /// Closes the session and discards the transcript.
    ///
    /// Valid in every state; a reply still in flight is dropped.
    pub async fn close(&mut self) {
        self.manager.close().await;
        self.transcript.clear();
        self.last_error = None;
        self.set_state(SessionState::Closed);
    }

    /// Closes the session and opens a fresh one.
    pub async fn reset(&mut self) -> Result<ConnectResult> {
        self.close().await;
        self.open().await
    }

    /// Probes the backend health endpoint.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.manager.health(&self.config.endpoints).await
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transport currently carrying messages.
    pub fn channel_mode(&self) -> ChannelMode {
        self.manager.channel_mode()
    }

    /// State of the underlying connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Turns shown so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Exchanges sent with fallback requests.
    pub fn history(&self) -> &ConversationHistory {
        self.manager.history()
    }

    /// Returns true if the user may type.
    pub fn input_enabled(&self) -> bool {
        self.state.input_enabled()
    }

    /// The failure that put the session in `Errored`.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn apply(&mut self, event: ConnectionEvent) -> Option<Result<Reply>> {
        match event {
            ConnectionEvent::Greeting(text) => {
                self.append(Role::System, &text);
                None
            }
            ConnectionEvent::StateChanged(state) => {
                self.observer.on_connection_state(state);
                None
            }
            ConnectionEvent::Reply(reply) => {
                self.append(Role::Assistant, &reply.text);
                if !reply.actions.is_empty() {
                    self.observer.on_actions(&reply.actions);
                }
                if self.state == SessionState::Sending {
                    self.set_state(SessionState::Ready);
                    Some(Ok(reply))
                } else {
                    None
                }
            }
            ConnectionEvent::Error(err) => {
                if self.state == SessionState::Sending {
                    Some(Err(self.fail(err)))
                } else {
                    self.append(Role::Error, &user_notice(&err));
                    None
                }
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        tracing::warn!(error = %err, "send failed");
        self.append(Role::Error, &user_notice(&err));
        self.last_error = Some(err.clone());
        self.set_state(SessionState::Errored);
        err
    }

    fn append(&mut self, role: Role, raw: &str) {
        let turn = self.renderer.render_turn(role, raw);
        self.observer.on_turn(&turn);
        self.transcript.append(turn);
    }

    fn set_state(&mut self, next: SessionState) {
        let prev = self.state;
        if prev == next {
            return;
        }
        tracing::debug!(from = %prev, to = %next, "session state");
        self.state = next;
        self.observer.on_state_change(prev, next);
        if prev.input_enabled() != next.input_enabled() {
            self.observer.on_input_enabled(next.input_enabled());
        }
    }
}

/// The text shown to the user for a failure.
pub fn user_notice(err: &Error) -> String {
    match err {
        Error::BackendUnreachable { .. } => BACKEND_UNREACHABLE_NOTICE.to_string(),
        Error::Backend { message } | Error::Protocol { message } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::connection::{ScriptedChannel, ScriptedConnector, ScriptedFallback};
    use crate::endpoint::EndpointConfig;

    #[derive(Clone, Default)]
    struct Recorder {
        input: Arc<Mutex<Vec<bool>>>,
        states: Arc<Mutex<Vec<SessionState>>>,
    }

    impl SessionObserver for Recorder {
        fn on_state_change(&mut self, _: SessionState, to: SessionState) {
            self.states.lock().unwrap().push(to);
        }

        fn on_input_enabled(&mut self, enabled: bool) {
            self.input.lock().unwrap().push(enabled);
        }
    }

    fn session(fallback: ScriptedFallback) -> ChatSession {
        let endpoints =
            EndpointConfig::new("ws://127.0.0.1:8000", "http://127.0.0.1:8000").unwrap();
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::refusing()),
            Arc::new(fallback),
        );
        ChatSession::new(manager, SessionConfig::new(endpoints))
    }

    #[test]
    fn input_enabled_states() {
        assert!(SessionState::Ready.input_enabled());
        assert!(SessionState::Errored.input_enabled());
        assert!(!SessionState::Sending.input_enabled());
        assert!(!SessionState::Connecting.input_enabled());
        assert!(!SessionState::Closed.input_enabled());
    }

    #[test]
    fn notices() {
        let err = Error::backend_unreachable("connection refused", None, None);
        assert_eq!(user_notice(&err), BACKEND_UNREACHABLE_NOTICE);
        assert_eq!(user_notice(&Error::backend("rate limited")), "rate limited");
    }

    #[test]
    fn new_session_is_closed() {
        let session = session(ScriptedFallback::echo());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transcript().is_empty());
        assert!(!session.input_enabled());
        assert_eq!(session.channel_mode(), ChannelMode::Unset);
    }

    #[tokio::test]
    async fn input_follows_send_cycle() {
        let recorder = Recorder::default();
        let mut session = session(ScriptedFallback::echo()).with_observer(recorder.clone());
        session.open().await.unwrap();
        session.send("hello").await.unwrap();

        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![
                SessionState::Connecting,
                SessionState::Ready,
                SessionState::Sending,
                SessionState::Ready,
            ]
        );
        assert_eq!(*recorder.input.lock().unwrap(), vec![true, false, true]);
    }

    #[tokio::test]
    async fn double_open_is_rejected() {
        let mut session = session(ScriptedFallback::echo());
        session.open().await.unwrap();
        assert!(session.open().await.unwrap_err().is_invalid_state());
    }

    #[tokio::test]
    async fn await_without_send() {
        let mut session = session(ScriptedFallback::echo());
        session.open().await.unwrap();
        assert!(session.await_reply().await.unwrap_err().is_invalid_state());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn markdown_toggle_applies_to_later_turns() {
        let mut session = session(ScriptedFallback::echo());
        session.open().await.unwrap();
        session.send("**bold**").await.unwrap();
        let rendered = session.transcript().last().unwrap().rendered().to_string();
        assert!(rendered.contains("<strong>bold</strong>"), "{rendered}");

        session.set_markdown(false);
        session.send("**bold**").await.unwrap();
        let rendered = session.transcript().last().unwrap().rendered().to_string();
        assert!(!rendered.contains("<strong>"), "{rendered}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reply_reenables_input() {
        let fallback = ScriptedFallback::echo().with_delay(std::time::Duration::from_secs(5));
        let mut session = session(fallback);
        session.open().await.unwrap();
        session.submit("slow").await.unwrap();
        assert!(!session.input_enabled());

        assert!(session.cancel_reply());
        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.cancel_reply());

        session.submit("again").await.unwrap();
        let reply = session.await_reply().await.unwrap();
        assert_eq!(reply.text, "You said: again");
    }

    #[tokio::test]
    async fn cancelled_live_reply_does_not_answer_the_next_message() {
        let (channel, mut server) = ScriptedChannel::pair();
        server.welcome("hi");
        let endpoints =
            EndpointConfig::new("ws://127.0.0.1:8000", "http://127.0.0.1:8000").unwrap();
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::accepting(channel)),
            Arc::new(ScriptedFallback::echo()),
        );
        let mut session = ChatSession::new(manager, SessionConfig::new(endpoints));
        session.open().await.unwrap();

        session.submit("first").await.unwrap();
        assert!(session.cancel_reply());
        session.submit("second").await.unwrap();
        assert_eq!(server.next_sent().await.unwrap().message, "first");
        assert_eq!(server.next_sent().await.unwrap().message, "second");
        server.reply("answer to first");
        server.reply("answer to second");

        let reply = session.await_reply().await.unwrap();
        assert_eq!(reply.text, "answer to second");
        assert_eq!(
            session.transcript().last().map(|turn| turn.content()),
            Some("answer to second")
        );
        assert!(
            session
                .transcript()
                .all()
                .all(|turn| turn.content() != "answer to first")
        );
    }
}
