//! In-memory transports.
//!
//! These stand in for the WebSocket and HTTP transports when no backend is
//! available: the `--offline` mode of the `chatlink` binary runs on them, and
//! the session tests use them to script exactly what the backend does.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use super::fallback::FallbackTransport;
use super::live::{LiveChannel, LiveConnector};
use crate::error::{Error, Result};
use crate::types::{
    Action, ChatRequest, ChatResponse, HealthStatus, InboundEnvelope, OutboundEnvelope,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

//////////////////////////////////////////// Connector /////////////////////////////////////////////

enum ConnectBehavior {
    Refuse(String),
    Hang,
    Accept(Option<ScriptedChannel>),
}

/// A [`LiveConnector`] whose outcome is fixed up front.
pub struct ScriptedConnector {
    behavior: Mutex<ConnectBehavior>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    /// Every attempt fails immediately.
    pub fn refusing() -> Self {
        Self::with_behavior(ConnectBehavior::Refuse("connection refused".to_string()))
    }

    /// Every attempt stalls until the caller's deadline passes.
    pub fn hanging() -> Self {
        Self::with_behavior(ConnectBehavior::Hang)
    }

    /// The first attempt yields `channel`; later attempts are refused.
    pub fn accepting(channel: ScriptedChannel) -> Self {
        Self::with_behavior(ConnectBehavior::Accept(Some(channel)))
    }

    fn with_behavior(behavior: ConnectBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveConnector for ScriptedConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn LiveChannel>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut behavior = lock(&self.behavior);
            match &mut *behavior {
                ConnectBehavior::Refuse(reason) => Err(Some(reason.clone())),
                ConnectBehavior::Hang => Err(None),
                ConnectBehavior::Accept(channel) => match channel.take() {
                    Some(channel) => Ok(channel),
                    None => Err(Some("scripted channel already used".to_string())),
                },
            }
        };
        match outcome {
            Ok(channel) => Ok(Box::new(channel)),
            Err(Some(reason)) => Err(Error::connect_failure(
                format!("connect to {url} failed: {reason}"),
                None,
            )),
            Err(None) => std::future::pending().await,
        }
    }
}

///////////////////////////////////////////// Channel //////////////////////////////////////////////

enum ServerFrame {
    Envelope(InboundEnvelope),
    Malformed(String),
    Failure(String),
}

/// Client half of an in-memory live channel.
pub struct ScriptedChannel {
    inbound: mpsc::UnboundedReceiver<ServerFrame>,
    outbound: mpsc::UnboundedSender<OutboundEnvelope>,
    fail_sends: Arc<AtomicBool>,
    closed: bool,
}

/// Server half of an in-memory live channel.
pub struct ScriptedServer {
    inbound: Option<mpsc::UnboundedSender<ServerFrame>>,
    outbound: mpsc::UnboundedReceiver<OutboundEnvelope>,
    fail_sends: Arc<AtomicBool>,
}

impl ScriptedChannel {
    /// Create a connected client/server pair.
    pub fn pair() -> (ScriptedChannel, ScriptedServer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let channel = ScriptedChannel {
            inbound: inbound_rx,
            outbound: outbound_tx,
            fail_sends: Arc::clone(&fail_sends),
            closed: false,
        };
        let server = ScriptedServer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            fail_sends,
        };
        (channel, server)
    }
}

#[async_trait]
impl LiveChannel for ScriptedChannel {
    async fn send(&mut self, envelope: &OutboundEnvelope) -> Result<()> {
        if self.closed || self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::backend_unreachable("channel is closed", None, None));
        }
        self.outbound
            .send(envelope.clone())
            .map_err(|_| Error::backend_unreachable("server went away", None, None))
    }

    async fn recv(&mut self) -> Option<Result<InboundEnvelope>> {
        if self.closed {
            return None;
        }
        match self.inbound.recv().await? {
            ServerFrame::Envelope(envelope) => Some(Ok(envelope)),
            ServerFrame::Malformed(raw) => {
                Some(Err(Error::protocol(format!("malformed envelope: {raw}"))))
            }
            ServerFrame::Failure(reason) => Some(Err(Error::backend_unreachable(reason, None, None))),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.inbound.close();
    }
}

impl ScriptedServer {
    /// Deliver an envelope to the client.
    pub fn push(&self, envelope: InboundEnvelope) {
        self.frame(ServerFrame::Envelope(envelope));
    }

    /// Deliver the handshake greeting.
    pub fn welcome(&self, message: impl Into<String>) {
        self.push(InboundEnvelope::Welcome {
            message: message.into(),
        });
    }

    /// Deliver an assistant reply.
    pub fn reply(&self, response: impl Into<String>) {
        self.reply_with_actions(response, vec![]);
    }

    /// Deliver an assistant reply with page actions.
    pub fn reply_with_actions(&self, response: impl Into<String>, actions: Vec<Action>) {
        self.push(InboundEnvelope::Message {
            response: response.into(),
            tools_used: vec![],
            actions,
        });
    }

    /// Deliver a backend-reported failure.
    pub fn error(&self, message: impl Into<String>) {
        self.push(InboundEnvelope::Error {
            message: message.into(),
        });
    }

    /// Deliver a frame that does not decode.
    pub fn malformed(&self, raw: impl Into<String>) {
        self.frame(ServerFrame::Malformed(raw.into()));
    }

    /// Deliver a transport failure.
    pub fn fail(&self, reason: impl Into<String>) {
        self.frame(ServerFrame::Failure(reason.into()));
    }

    /// Make every later client send fail.
    pub fn reject_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Close the channel from the server side.
    pub fn close(&mut self) {
        self.inbound = None;
        self.reject_sends();
    }

    /// Wait for the next envelope sent by the client.
    pub async fn next_sent(&mut self) -> Option<OutboundEnvelope> {
        self.outbound.recv().await
    }

    /// Take an envelope sent by the client, if one is waiting.
    pub fn try_sent(&mut self) -> Option<OutboundEnvelope> {
        self.outbound.try_recv().ok()
    }

    fn frame(&self, frame: ServerFrame) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(frame);
        }
    }
}

///////////////////////////////////////////// Fallback /////////////////////////////////////////////

/// A [`FallbackTransport`] that answers from a queue.
///
/// Queued outcomes are used first; once the queue is empty every request is
/// answered by echoing the message back.
pub struct ScriptedFallback {
    outcomes: Mutex<VecDeque<Result<ChatResponse>>>,
    requests: Mutex<Vec<(Url, ChatRequest)>>,
    delay: Option<Duration>,
    health_status: u16,
}

impl ScriptedFallback {
    /// Create a transport with nothing queued.
    pub fn echo() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            health_status: 200,
        }
    }

    /// Delay every answer by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report `status` from health probes.
    pub fn with_health_status(mut self, status: u16) -> Self {
        self.health_status = status;
        self
    }

    /// Queue a reply.
    pub fn respond(&self, response: ChatResponse) {
        lock(&self.outcomes).push_back(Ok(response));
    }

    /// Queue a failure.
    pub fn fail(&self, error: Error) {
        lock(&self.outcomes).push_back(Err(error));
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests)
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// URLs requests were posted to, oldest first.
    pub fn urls(&self) -> Vec<Url> {
        lock(&self.requests)
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl FallbackTransport for ScriptedFallback {
    async fn chat(&self, url: Url, request: ChatRequest) -> Result<ChatResponse> {
        let message = request.message.clone();
        lock(&self.requests).push((url, request));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = lock(&self.outcomes).pop_front();
        queued.unwrap_or_else(|| Ok(ChatResponse::new(format!("You said: {message}"))))
    }

    async fn health(&self, _: Url) -> Result<HealthStatus> {
        Ok(HealthStatus::from_status(self.health_status))
    }
}
