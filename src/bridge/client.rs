//! Reconnecting relay client.
//!
//! One [`BridgeClient`] owns at most one WebSocket to the relay. Many
//! logical request/response exchanges are multiplexed over it by
//! correlation id.
//!
//! # Event Loop
//!
//! Each open channel gets a spawned task that owns the socket and handles:
//!
//! - inbound frames: correlated responses first, then `ping`/`status`, then
//!   registered handlers
//! - outbound frames queued by [`BridgeClient::send`]
//! - client keepalive pings
//! - close detection, which may schedule a reconnect
//!
//! # Failure Semantics
//!
//! Outstanding requests are not failed when the channel drops. They complete
//! through their own timeout, which keeps `disconnect` non-blocking.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::config::{BridgeOptions, LinkConfig, RelayEndpoint};
use crate::error::{Error, Result};
use crate::identifiers::{BridgeToken, CorrelationId};
use crate::protocol::{LocalStatus, Message, kinds};

use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type RelaySink = SplitSink<RelayStream, WsMessage>;

/// Correlation table.
type PendingMap = FxHashMap<CorrelationId, PendingRequest>;

/// Handler for uncorrelated inbound messages of one type.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// An outstanding correlated request.
struct PendingRequest {
    created_at: Instant,
    deadline: Instant,
    responder: oneshot::Sender<Message>,
}

/// Commands for the event loop.
enum LoopCommand {
    /// Write a text frame.
    Send(String),
    /// Close with code 1000 and stop.
    Close,
}

/// Why an event loop stopped.
#[derive(Debug)]
enum LoopExit {
    /// Closed by this client.
    Local,
    /// Close frame from the relay.
    Remote(Option<CloseCode>),
    /// Socket error or end of stream without a close frame.
    Failed(String),
}

/// The currently open channel.
struct Session {
    token: BridgeToken,
    generation: u64,
    outbound: mpsc::UnboundedSender<LoopCommand>,
}

#[derive(Default)]
struct ReconnectState {
    /// Attempts in the current sequence. A sequence ends when a reopened
    /// channel delivers its first frame, or on an external `connect`.
    attempts: u32,
    /// Scheduled or running attempt.
    task: Option<JoinHandle<()>>,
}

// ============================================================================
// BridgeInner
// ============================================================================

struct BridgeInner {
    endpoint: RelayEndpoint,
    options: BridgeOptions,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Session>>,
    pending: Mutex<PendingMap>,
    handlers: Mutex<FxHashMap<String, MessageHandler>>,
    reconnect: Mutex<ReconnectState>,
    local_status: RwLock<LocalStatus>,
    /// Serializes external connects and reconnect attempts.
    connect_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

// ============================================================================
// BridgeClient
// ============================================================================

/// Relay client with correlated requests and automatic reconnection.
///
/// Cloning is cheap and every clone drives the same channel.
///
/// # Example
///
/// ```no_run
/// use ledger_link::bridge::BridgeClient;
/// use ledger_link::protocol::Message;
/// use ledger_link::LinkConfig;
///
/// # async fn example() -> ledger_link::Result<()> {
/// let config = LinkConfig::builder().api_base("https://api.example.com/api").build()?;
/// let bridge = BridgeClient::from_config(&config);
///
/// bridge.connect("session-token").await?;
/// let reply = bridge
///     .send_request(Message::new("tally_request").with_field("action", "companies"))
///     .await?;
/// println!("{reply:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<BridgeInner>,
}

/// Non-owning handle to a [`BridgeClient`].
///
/// Handlers registered on the client hold this to avoid a reference cycle.
#[derive(Clone)]
pub struct WeakBridgeClient {
    inner: Weak<BridgeInner>,
}

impl WeakBridgeClient {
    /// Returns the client if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<BridgeClient> {
        self.inner.upgrade().map(|inner| BridgeClient { inner })
    }
}

impl BridgeClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(endpoint: RelayEndpoint, options: BridgeOptions) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                endpoint,
                options,
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                pending: Mutex::new(PendingMap::default()),
                handlers: Mutex::new(FxHashMap::default()),
                reconnect: Mutex::new(ReconnectState::default()),
                local_status: RwLock::new(LocalStatus::default()),
                connect_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a disconnected client from session configuration.
    #[must_use]
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.relay_endpoint(), config.bridge)
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakBridgeClient {
        WeakBridgeClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Opens the channel for `token` and sends the `bridge_ready` handshake.
    ///
    /// Returns immediately if already connected with the same token. A
    /// different token replaces the current channel. Every call resets the
    /// reconnect attempt counter.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the token is blank or the relay URL is invalid
    /// - [`Error::ConnectionTimeout`] if the channel does not open in time
    /// - [`Error::Connection`] if the transport fails before opening
    pub async fn connect(&self, token: impl Into<BridgeToken>) -> Result<()> {
        let token = token.into();
        if token.is_blank() {
            return Err(Error::config("bridge token must not be blank"));
        }

        let _guard = self.inner.connect_lock.lock().await;
        self.inner.reset_reconnect();

        if self.inner.state() == ConnectionState::Connected {
            if self.inner.session_token().as_ref() == Some(&token) {
                debug!("Bridge already connected");
                return Ok(());
            }
            info!("Bridge token changed, replacing channel");
            self.inner.close_session();
        }

        BridgeInner::open(&self.inner, token).await
    }

    /// Queues a one-way message.
    ///
    /// Returns `false` if not connected. Delivery is not confirmed.
    pub fn send(&self, message: &Message) -> bool {
        self.inner.send_message(message)
    }

    /// Sends a correlated request with the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`BridgeClient::send_request_with_timeout`].
    pub async fn send_request(&self, message: Message) -> Result<Message> {
        self.send_request_with_timeout(message, self.inner.options.request_timeout)
            .await
    }

    /// Sends a correlated request and waits for the response with the same id.
    ///
    /// Any `id` already on `message` is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if not connected when issued
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::RequestCancelled`] if [`BridgeClient::shutdown`] ran first
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send_request_with_timeout(
        &self,
        message: Message,
        request_timeout: Duration,
    ) -> Result<Message> {
        let request_id = CorrelationId::generate();
        let message = message.with_id(request_id.clone());
        let (responder, mut response_rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock();
            if pending.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = pending.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    pending.len(),
                    MAX_PENDING_REQUESTS
                )));
            }

            let created_at = Instant::now();
            pending.insert(
                request_id.clone(),
                PendingRequest {
                    created_at,
                    deadline: created_at + request_timeout,
                    responder,
                },
            );
        }

        if !self.inner.send_message(&message) {
            self.inner.pending.lock().remove(&request_id);
            return Err(Error::connection("bridge is not connected"));
        }

        trace!(%request_id, kind = %message.kind, "Request sent");

        match timeout(request_timeout, &mut response_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::request_cancelled(request_id)),
            Err(_) => self
                .inner
                .finish_timed_out(request_id, &mut response_rx, request_timeout),
        }
    }

    /// Closes the channel with code 1000 and stops reconnecting.
    ///
    /// Outstanding requests are left to time out.
    pub fn disconnect(&self) {
        self.inner.reset_reconnect();
        self.inner.close_session();
        info!("Bridge disconnected");
    }

    /// Disconnects and cancels every outstanding request.
    pub fn shutdown(&self) {
        self.disconnect();

        let cancelled: Vec<_> = self.inner.pending.lock().drain().collect();
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "Cancelled pending requests");
        }
    }

    /// Registers the handler for uncorrelated messages of `kind`.
    ///
    /// Replaces any previous handler for that type. Handlers run on the event
    /// loop and should hand long work to a spawned task.
    pub fn on_message<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .lock()
            .insert(kind.into(), Arc::new(handler));
    }

    /// Removes the handler for `kind`.
    pub fn off_message(&self, kind: &str) {
        self.inner.handlers.lock().remove(kind);
    }

    /// Sets the snapshot reported in `bridge_ready` and `status_response`.
    pub fn set_local_status(&self, status: LocalStatus) {
        *self.inner.local_status.write() = status;
    }

    /// Returns the current local snapshot.
    #[must_use]
    pub fn local_status(&self) -> LocalStatus {
        self.inner.local_status.read().clone()
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Returns `true` while the channel is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the number of outstanding correlated requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the age of the oldest outstanding request and its remaining time.
    #[must_use]
    pub fn oldest_pending(&self) -> Option<(Duration, Duration)> {
        let now = Instant::now();
        self.inner
            .pending
            .lock()
            .values()
            .min_by_key(|request| request.created_at)
            .map(|request| {
                (
                    now.saturating_duration_since(request.created_at),
                    request.deadline.saturating_duration_since(now),
                )
            })
    }

    /// Returns the automatic reconnect attempts in the current sequence.
    ///
    /// Back to zero once a reopened channel has delivered a frame.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.lock().attempts
    }
}

// ============================================================================
// BridgeInner - Lifecycle
// ============================================================================

impl BridgeInner {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Bridge state changed");
        }
    }

    fn session_token(&self) -> Option<BridgeToken> {
        self.session.lock().as_ref().map(|s| s.token.clone())
    }

    /// Opens a channel and spawns its event loop.
    async fn open(inner: &Arc<Self>, token: BridgeToken) -> Result<()> {
        let url = inner.endpoint.url_for(&token)?;
        let host = url.host_str().unwrap_or_default().to_string();

        inner.set_state(ConnectionState::Connecting);
        debug!(%host, "Opening bridge channel");

        let connect_timeout = inner.options.connect_timeout;
        let ws_stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                inner.set_state(ConnectionState::Disconnected);
                warn!(%host, error = %e, "Bridge connection failed");
                return Err(Error::connection(format!("relay at {host}: {e}")));
            }
            Err(_) => {
                inner.set_state(ConnectionState::Disconnected);
                warn!(%host, "Bridge connection timed out");
                return Err(Error::connection_timeout(duration_ms(connect_timeout)));
            }
        };

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound, command_rx) = mpsc::unbounded_channel();

        {
            let mut session = inner.session.lock();
            // disconnect() ran during the handshake
            if inner.state() != ConnectionState::Connecting {
                debug!(%host, "Channel opened after disconnect, dropping");
                return Err(Error::ConnectionClosed);
            }
            *session = Some(Session {
                token,
                generation,
                outbound,
            });
            inner.set_state(ConnectionState::Connected);
        }

        tokio::spawn(Self::run_event_loop(
            Arc::clone(inner),
            ws_stream,
            command_rx,
            generation,
        ));

        let ready = Message::bridge_ready(&inner.local_status.read());
        if !inner.send_message(&ready) {
            warn!("Failed to queue bridge_ready");
        }

        info!(%host, generation, "Bridge connected");
        Ok(())
    }

    /// Completes a request whose timer fired.
    ///
    /// Whoever removes the entry owns completion: if a response already took
    /// it, that response is returned instead of a timeout.
    fn finish_timed_out(
        &self,
        request_id: CorrelationId,
        response_rx: &mut oneshot::Receiver<Message>,
        request_timeout: Duration,
    ) -> Result<Message> {
        if self.pending.lock().remove(&request_id).is_some() {
            debug!(%request_id, "Request timed out");
            return Err(Error::request_timeout(
                request_id,
                duration_ms(request_timeout),
            ));
        }

        match response_rx.try_recv() {
            Ok(response) => {
                trace!(%request_id, "Response won the race with its timeout");
                Ok(response)
            }
            Err(_) => Err(Error::request_cancelled(request_id)),
        }
    }

    /// Takes the current session and asks its loop to close normally.
    fn close_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            let _ = session.outbound.send(LoopCommand::Close);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn send_message(&self, message: &Message) -> bool {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, kind = %message.kind, "Failed to serialize message");
                return false;
            }
        };

        let session = self.session.lock();
        match session.as_ref() {
            Some(session) if self.state() == ConnectionState::Connected => {
                session.outbound.send(LoopCommand::Send(json)).is_ok()
            }
            _ => false,
        }
    }

    /// Called when an event loop ends.
    fn on_loop_exit(self: &Arc<Self>, generation: u64, exit: LoopExit) {
        let token = {
            let mut session = self.session.lock();
            match session.as_ref() {
                Some(current) if current.generation == generation => {
                    session.take().map(|s| s.token)
                }
                _ => None,
            }
        };

        // Superseded by disconnect or a newer channel.
        let Some(token) = token else {
            debug!(generation, ?exit, "Bridge event loop ended");
            return;
        };

        match exit {
            LoopExit::Local | LoopExit::Remote(Some(CloseCode::Normal)) => {
                info!(generation, "Bridge closed normally");
                self.set_state(ConnectionState::Disconnected);
            }
            LoopExit::Remote(code) => {
                warn!(generation, ?code, "Bridge closed abnormally");
                self.schedule_reconnect(token);
            }
            LoopExit::Failed(reason) => {
                warn!(generation, %reason, "Bridge channel failed");
                self.schedule_reconnect(token);
            }
        }
    }
}

// ============================================================================
// BridgeInner - Reconnection
// ============================================================================

impl BridgeInner {
    /// Clears the attempt counter and cancels any scheduled attempt.
    fn reset_reconnect(&self) {
        let mut reconnect = self.reconnect.lock();
        if let Some(task) = reconnect.task.take() {
            task.abort();
            debug!("Cancelled scheduled reconnect");
        }
        reconnect.attempts = 0;
    }

    /// Ends the current reconnect sequence once the relay is talking again.
    fn mark_healthy(&self, generation: u64) {
        let mut reconnect = self.reconnect.lock();
        if reconnect.task.is_none() && reconnect.attempts > 0 {
            debug!(generation, attempts = reconnect.attempts, "Bridge recovered");
            reconnect.attempts = 0;
        }
    }

    /// Schedules the next attempt unless one is pending or the cap is hit.
    fn schedule_reconnect(self: &Arc<Self>, token: BridgeToken) {
        let mut reconnect = self.reconnect.lock();
        if reconnect.task.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }

        let policy = self.options.reconnect;
        if !policy.allows_another(reconnect.attempts) {
            warn!(
                attempts = reconnect.attempts,
                "Reconnect attempts exhausted, staying disconnected"
            );
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        reconnect.attempts += 1;
        let attempt = reconnect.attempts;
        let delay = policy.delay_for(attempt);
        self.set_state(ConnectionState::Reconnecting);

        info!(
            attempt,
            max = policy.max_attempts,
            delay_ms = duration_ms(delay),
            "Scheduling bridge reconnect"
        );

        // The task clears its own slot under this lock, so it cannot
        // finish before the handle is stored.
        let inner = Arc::clone(self);
        reconnect.task = Some(tokio::spawn(async move {
            inner.run_reconnect(token, attempt, delay).await;
        }));
    }

    async fn run_reconnect(self: Arc<Self>, token: BridgeToken, attempt: u32, delay: Duration) {
        sleep(delay).await;

        let _guard = self.connect_lock.lock().await;
        {
            let mut reconnect = self.reconnect.lock();
            reconnect.task = None;
            if self.state() != ConnectionState::Reconnecting {
                return;
            }
        }

        match Self::open(&self, token.clone()).await {
            Ok(()) => {}
            Err(Error::ConnectionClosed) => debug!(attempt, "Reconnect superseded"),
            Err(e) => {
                warn!(attempt, error = %e, "Reconnect attempt failed");
                self.schedule_reconnect(token);
            }
        }
    }
}

// ============================================================================
// BridgeInner - Event Loop
// ============================================================================

impl BridgeInner {
    /// Owns the socket until it closes.
    async fn run_event_loop(
        inner: Arc<Self>,
        ws_stream: RelayStream,
        mut command_rx: mpsc::UnboundedReceiver<LoopCommand>,
        generation: u64,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut keepalive = inner
            .options
            .keepalive_interval
            .map(|period| interval_at(Instant::now() + period, period));

        let mut healthy = false;

        let exit = loop {
            tokio::select! {
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if !healthy {
                                healthy = true;
                                inner.mark_healthy(generation);
                            }
                            if let Some(reply) = inner.dispatch(text.as_str()) {
                                Self::write_message(&mut ws_write, &reply).await;
                            }
                        }

                        Some(Ok(WsMessage::Close(frame))) => {
                            break LoopExit::Remote(frame.map(|f| f.code));
                        }

                        Some(Err(e)) => {
                            break LoopExit::Failed(e.to_string());
                        }

                        None => {
                            break LoopExit::Failed("stream ended".to_string());
                        }

                        // Binary and control frames
                        Some(Ok(_)) => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(LoopCommand::Send(json)) => {
                            if let Err(e) = ws_write.send(WsMessage::Text(json.into())).await {
                                warn!(error = %e, "Failed to write frame");
                            }
                        }

                        Some(LoopCommand::Close) => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            };
                            let _ = ws_write.send(WsMessage::Close(Some(frame))).await;
                            let _ = ws_write.close().await;
                            break LoopExit::Local;
                        }

                        None => break LoopExit::Local,
                    }
                }

                () = next_tick(keepalive.as_mut()) => {
                    trace!("Keepalive ping");
                    Self::write_message(&mut ws_write, &Message::ping()).await;
                }
            }
        };

        inner.on_loop_exit(generation, exit);
    }

    /// Routes one inbound frame; returns an immediate reply if any.
    fn dispatch(&self, text: &str) -> Option<Message> {
        let message = match Message::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
                return None;
            }
        };

        // Correlated responses take priority. The send happens under the
        // lock so a racing timeout sees either the entry or the response.
        if let Some(id) = &message.id {
            let mut pending = self.pending.lock();
            if let Some(request) = pending.remove(id) {
                trace!(%id, "Response matched");
                let _ = request.responder.send(message);
                return None;
            }
        }

        match message.kind.as_str() {
            kinds::PING => return Some(Message::pong_to(&message)),
            kinds::STATUS => {
                return Some(Message::status_response_to(
                    &message,
                    &self.local_status.read(),
                    self.state().as_str(),
                ));
            }
            kinds::PONG => return None,
            _ => {}
        }

        let handler = self.handlers.lock().get(&message.kind).cloned();
        match handler {
            Some(handler) => handler(message),
            None => debug!(kind = %message.kind, "No handler for message, dropping"),
        }
        None
    }

    async fn write_message(ws_write: &mut RelaySink, message: &Message) {
        match message.to_json() {
            Ok(json) => {
                if let Err(e) = ws_write.send(WsMessage::Text(json.into())).await {
                    warn!(error = %e, kind = %message.kind, "Failed to send reply");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize reply"),
        }
    }
}

/// Waits for the next keepalive tick, or forever when disabled.
async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
