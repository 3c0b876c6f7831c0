use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use url::Url;

use super::fallback::{FallbackTransport, HttpFallback};
use super::live::{LiveChannel, LiveConnector, WebSocketConnector};
use super::state::{ChannelMode, ConnectionState};
use crate::endpoint::EndpointConfig;
use crate::error::{Error, Result};
use crate::observability::{
    CONNECT_ATTEMPTS, CONNECT_DURATION, DOWNGRADES, FALLBACK_REQUEST_DURATION, LIVE_CONNECTS,
    PROTOCOL_ERRORS, SEND_FAILURES, SENDS, STALE_RESULTS,
};
use crate::transcript::ConversationHistory;
use crate::types::{
    Action, ChatRequest, ChatResponse, HealthStatus, InboundEnvelope, OutboundEnvelope,
};

/// An assistant reply, from either transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Raw reply text.
    pub text: String,
    /// Backend tools consulted for the reply.
    pub tools_used: Vec<String>,
    /// Page actions suggested alongside the reply.
    pub actions: Vec<Action>,
}

impl From<ChatResponse> for Reply {
    fn from(response: ChatResponse) -> Self {
        Self {
            text: response.response,
            tools_used: response.tools_used,
            actions: response.actions,
        }
    }
}

/// Something the connection has to report.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Greeting text, from the backend or synthesized locally.
    Greeting(String),
    /// An assistant reply.
    Reply(Reply),
    /// A failure the user should see.
    Error(Error),
    /// The manager moved to a new state.
    StateChanged(ConnectionState),
}

/// Outcome of [`ConnectionManager::connect`].
#[derive(Debug, Clone)]
pub struct ConnectResult {
    /// The transport now carrying messages.
    pub mode: ChannelMode,
    /// Why the live channel was not used, when it was not.
    pub downgrade_reason: Option<Error>,
}

impl ConnectResult {
    /// Returns true if the live channel was established.
    pub fn is_live(&self) -> bool {
        self.mode == ChannelMode::Live
    }
}

struct FallbackOutcome {
    generation: u64,
    result: Result<ChatResponse>,
}

/// Owns the transports for one widget session.
///
/// The manager tries the live channel first and drops to the fallback when
/// the live channel cannot be established within the connect timeout, does
/// not greet, or goes away mid-session.  The drop is one-way.
///
/// Every session carries a generation number.  Fallback requests are tagged
/// with the generation that issued them, and `close` bumps the generation so
/// that replies to abandoned requests are discarded instead of delivered.
pub struct ConnectionManager {
    connector: Arc<dyn LiveConnector>,
    fallback: Arc<dyn FallbackTransport>,
    endpoints: Option<EndpointConfig>,
    state: ConnectionState,
    channel: Option<Box<dyn LiveChannel>>,
    history: ConversationHistory,
    queue: VecDeque<ConnectionEvent>,
    pending: Option<String>,
    // live replies still owed for messages whose reply was abandoned
    abandoned_live: usize,
    generation: u64,
    results_tx: mpsc::UnboundedSender<FallbackOutcome>,
    results_rx: mpsc::UnboundedReceiver<FallbackOutcome>,
}

impl ConnectionManager {
    /// Create a manager over the given transports.
    pub fn new(connector: Arc<dyn LiveConnector>, fallback: Arc<dyn FallbackTransport>) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            fallback,
            endpoints: None,
            state: ConnectionState::Unconnected,
            channel: None,
            history: ConversationHistory::default(),
            queue: VecDeque::new(),
            pending: None,
            abandoned_live: 0,
            generation: 0,
            results_tx,
            results_rx,
        }
    }

    /// Create a manager over WebSocket and HTTP.
    pub fn network(endpoints: &EndpointConfig) -> Result<Self> {
        let fallback = HttpFallback::with_timeout(endpoints.request_timeout)?;
        Ok(Self::new(
            Arc::new(WebSocketConnector::new()),
            Arc::new(fallback),
        ))
    }

    /// Sets how many completed exchanges accompany fallback requests.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = ConversationHistory::new(limit);
        self
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transport currently carrying messages.
    pub fn channel_mode(&self) -> ChannelMode {
        self.state.channel_mode()
    }

    /// Completed exchanges of this session.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Returns true while a reply is outstanding.
    pub fn is_awaiting_reply(&self) -> bool {
        self.pending.is_some()
    }

    /// Identifier of the current session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Establish a session.
    ///
    /// Never fails: when the live channel cannot be used the manager settles
    /// in fallback mode and reports why.  Either way a greeting is queued.
    /// Connecting an already connected manager closes the old session first.
    pub async fn connect(&mut self, endpoints: &EndpointConfig) -> ConnectResult {
        if !matches!(
            self.state,
            ConnectionState::Unconnected | ConnectionState::Closed
        ) {
            self.close().await;
        }
        self.generation += 1;
        self.history.clear();
        self.queue.clear();
        self.pending = None;
        self.abandoned_live = 0;
        self.endpoints = Some(endpoints.clone());
        self.transition(ConnectionState::Connecting);

        CONNECT_ATTEMPTS.click();
        let started = Instant::now();
        let attempt = match endpoints.validate() {
            Ok(()) => tokio::time::timeout(
                endpoints.connect_timeout,
                open_live(self.connector.as_ref(), &endpoints.live_url),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::connect_failure(
                    format!(
                        "no welcome from {} within {:?}",
                        endpoints.live_url, endpoints.connect_timeout
                    ),
                    None,
                ))
            }),
            Err(err) => Err(err),
        };
        CONNECT_DURATION.add(started.elapsed().as_secs_f64());

        match attempt {
            Ok((channel, greeting)) => {
                LIVE_CONNECTS.click();
                tracing::info!(url = %endpoints.live_url, "live channel established");
                self.channel = Some(channel);
                self.transition(ConnectionState::Live);
                self.queue.push_back(ConnectionEvent::Greeting(greeting));
                ConnectResult {
                    mode: ChannelMode::Live,
                    downgrade_reason: None,
                }
            }
            Err(err) => {
                DOWNGRADES.click();
                tracing::warn!(error = %err, "live channel unavailable, using fallback");
                self.transition(ConnectionState::Fallback);
                self.queue
                    .push_back(ConnectionEvent::Greeting(endpoints.greeting.clone()));
                ConnectResult {
                    mode: ChannelMode::Fallback,
                    downgrade_reason: Some(err),
                }
            }
        }
    }

    /// Send a user message over whichever transport is active.
    ///
    /// The reply, or the failure to get one, is delivered by
    /// [`next_event`](Self::next_event).  At most one message may be
    /// outstanding.  If the live channel rejects the message the manager drops
    /// to fallback and resends it there.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let message = text.trim();
        if message.is_empty() {
            return Err(Error::invalid_input("message is empty"));
        }
        if !self.state.accepts_messages() {
            return Err(Error::invalid_state(
                format!("cannot send while {}", self.state),
                self.state.as_str(),
            ));
        }
        if self.pending.is_some() {
            return Err(Error::busy("a reply is already outstanding"));
        }
        SENDS.click();

        if self.state == ConnectionState::Live {
            let envelope = OutboundEnvelope::new(message);
            let sent = match self.channel.as_mut() {
                Some(channel) => channel.send(&envelope).await,
                None => Err(Error::backend_unreachable("live channel missing", None, None)),
            };
            match sent {
                Ok(()) => {
                    self.pending = Some(message.to_string());
                    return Ok(());
                }
                Err(err) => {
                    SEND_FAILURES.click();
                    self.downgrade(&err.to_string()).await;
                }
            }
        }
        self.dispatch_fallback(message)
    }

    /// Wait for the next event.
    ///
    /// Returns `None` when nothing further can arrive: the manager is not
    /// connected, or it is in fallback mode with no request in flight.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            match self.state {
                ConnectionState::Live => {
                    let received = match self.channel.as_mut() {
                        Some(channel) => channel.recv().await,
                        None => None,
                    };
                    if let Some(event) = self.on_live_frame(received).await {
                        return Some(event);
                    }
                }
                ConnectionState::Fallback if self.pending.is_some() => {
                    let outcome = self.results_rx.recv().await?;
                    if let Some(event) = self.on_fallback_outcome(outcome) {
                        return Some(event);
                    }
                }
                _ => return None,
            }
        }
    }

    /// Take an already queued event without waiting.
    pub fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.queue.pop_front()
    }

    /// Stop waiting for the outstanding reply.
    ///
    /// A reply that arrives afterwards is discarded.  Live replies carry no
    /// id, so the next live reply or error is dropped for every abandoned one.
    pub fn abandon_reply(&mut self) {
        if self.pending.take().is_some() {
            if self.state == ConnectionState::Live {
                self.abandoned_live += 1;
            }
            self.generation += 1;
            tracing::debug!(generation = self.generation, "abandoned outstanding reply");
        }
    }

    /// Tear the session down.  Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.generation += 1;
        self.pending = None;
        self.abandoned_live = 0;
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.transition(ConnectionState::Closed);
        self.queue.clear();
        tracing::info!(generation = self.generation, "connection closed");
    }

    /// Probe the fallback health endpoint.
    pub async fn health(&self, endpoints: &EndpointConfig) -> Result<HealthStatus> {
        self.fallback.health(endpoints.health_url()?).await
    }

    fn transition(&mut self, next: ConnectionState) {
        match self.state.transition(next) {
            Ok(state) => {
                tracing::debug!(from = %self.state, to = %state, "connection state");
                self.state = state;
                self.queue.push_back(ConnectionEvent::StateChanged(state));
            }
            Err(err) => {
                tracing::error!(error = %err, "rejected connection state change");
            }
        }
    }

    async fn downgrade(&mut self, reason: &str) {
        DOWNGRADES.click();
        tracing::warn!(reason, "live channel lost, switching to fallback");
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.transition(ConnectionState::Fallback);
        self.abandoned_live = 0;
        if self.pending.take().is_some() {
            SEND_FAILURES.click();
            self.queue.push_back(ConnectionEvent::Error(Error::backend_unreachable(
                format!("live channel lost before the reply arrived: {reason}"),
                None,
                None,
            )));
        }
    }

    async fn on_live_frame(
        &mut self,
        received: Option<Result<InboundEnvelope>>,
    ) -> Option<ConnectionEvent> {
        if self.abandoned_live > 0
            && matches!(
                received,
                Some(Ok(InboundEnvelope::Message { .. } | InboundEnvelope::Error { .. }))
            )
        {
            self.abandoned_live -= 1;
            STALE_RESULTS.click();
            tracing::debug!(
                remaining = self.abandoned_live,
                "discarding live reply to abandoned message"
            );
            return None;
        }
        match received {
            Some(Ok(InboundEnvelope::Message {
                response,
                tools_used,
                actions,
            })) => {
                match self.pending.take() {
                    Some(message) => self.history.record(message, response.as_str()),
                    None => tracing::debug!("unsolicited reply on live channel"),
                }
                Some(ConnectionEvent::Reply(Reply {
                    text: response,
                    tools_used,
                    actions,
                }))
            }
            Some(Ok(InboundEnvelope::Error { message })) => {
                self.pending = None;
                Some(ConnectionEvent::Error(Error::backend(message)))
            }
            Some(Ok(InboundEnvelope::Welcome { message })) => {
                Some(ConnectionEvent::Greeting(message))
            }
            Some(Err(err)) if err.is_protocol() => {
                PROTOCOL_ERRORS.click();
                tracing::warn!(error = %err, "bad frame on live channel");
                self.pending = None;
                Some(ConnectionEvent::Error(err))
            }
            Some(Err(err)) => {
                self.downgrade(&err.to_string()).await;
                None
            }
            None => {
                self.downgrade("live channel closed").await;
                None
            }
        }
    }

    fn on_fallback_outcome(&mut self, outcome: FallbackOutcome) -> Option<ConnectionEvent> {
        if outcome.generation != self.generation {
            STALE_RESULTS.click();
            tracing::debug!(
                generation = outcome.generation,
                current = self.generation,
                "discarding reply to abandoned request"
            );
            return None;
        }
        let message = self.pending.take()?;
        match outcome.result {
            Ok(response) => {
                self.history.record(message, response.response.as_str());
                Some(ConnectionEvent::Reply(Reply::from(response)))
            }
            Err(err) => {
                SEND_FAILURES.click();
                tracing::warn!(error = %err, "fallback request failed");
                Some(ConnectionEvent::Error(as_unreachable(err)))
            }
        }
    }

    fn dispatch_fallback(&mut self, message: &str) -> Result<()> {
        let Some(endpoints) = self.endpoints.as_ref() else {
            return Err(Error::invalid_state(
                "no endpoints configured",
                self.state.as_str(),
            ));
        };
        let url = endpoints.chat_url()?;
        let timeout = endpoints.request_timeout;
        let request = ChatRequest::new(message, self.history.snapshot());
        let transport = Arc::clone(&self.fallback);
        let results = self.results_tx.clone();
        let generation = self.generation;
        self.pending = Some(message.to_string());

        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, transport.chat(url, request))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::timeout(
                        format!("no reply within {timeout:?}"),
                        Some(timeout.as_secs_f64()),
                    ))
                });
            FALLBACK_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
            // the manager may be gone
            let _ = results.send(FallbackOutcome { generation, result });
        });
        Ok(())
    }
}

async fn open_live(
    connector: &dyn LiveConnector,
    url: &Url,
) -> Result<(Box<dyn LiveChannel>, String)> {
    let mut channel = connector.connect(url).await?;
    let refusal = match channel.recv().await {
        Some(Ok(InboundEnvelope::Welcome { message })) => return Ok((channel, message)),
        Some(Ok(InboundEnvelope::Error { message })) => {
            Error::connect_failure(format!("backend refused the live session: {message}"), None)
        }
        Some(Ok(other)) => Error::connect_failure(
            format!("expected a welcome, got {}", other.kind()),
            None,
        ),
        Some(Err(err)) => err,
        None => Error::connect_failure("live channel closed during handshake", None),
    };
    channel.close().await;
    Err(refusal)
}

fn as_unreachable(err: Error) -> Error {
    if err.is_backend_unreachable() {
        return err;
    }
    let status_code = err.status_code();
    Error::backend_unreachable(
        format!("fallback request failed: {err}"),
        status_code,
        Some(Box::new(err)),
    )
}
