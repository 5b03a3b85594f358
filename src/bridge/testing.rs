//! Loopback relay for bridge tests.

// ============================================================================
// Imports
// ============================================================================

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing_subscriber::EnvFilter;

use crate::protocol::Message;

// ============================================================================
// Types
// ============================================================================

/// How the relay treats each accepted connection.
#[derive(Debug, Clone, Copy)]
pub enum RelayBehavior {
    /// Forward frames both ways until told to close.
    Interactive,
    /// Complete the handshake, then close with the given code.
    CloseImmediately(CloseCode),
    /// Accept TCP but never answer the upgrade.
    Stall,
}

enum RelayCommand {
    Text(String),
    Close(CloseCode),
}

type CommandSlot = Arc<Mutex<Option<mpsc::UnboundedSender<RelayCommand>>>>;

/// A relay on `127.0.0.1` with a random port.
pub struct TestRelay {
    /// `ws://` base for the relay.
    pub url: String,
    /// Completed WebSocket handshakes.
    pub accepted: Arc<AtomicUsize>,
    /// Text frames received from clients.
    pub inbound: mpsc::UnboundedReceiver<Message>,
    /// Close codes received from clients.
    pub closes: mpsc::UnboundedReceiver<Option<CloseCode>>,
    current: CommandSlot,
    paths: Arc<Mutex<Vec<String>>>,
}

// ============================================================================
// TestRelay
// ============================================================================

impl TestRelay {
    pub async fn spawn(behavior: RelayBehavior) -> Self {
        init_tracing();

        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .expect("bind relay");
        let port = listener.local_addr().expect("local addr").port();

        let accepted = Arc::new(AtomicUsize::new(0));
        let current: CommandSlot = Arc::new(Mutex::new(None));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (closes_tx, closes) = mpsc::unbounded_channel();

        let ctx = AcceptContext {
            behavior,
            accepted: Arc::clone(&accepted),
            current: Arc::clone(&current),
            paths: Arc::clone(&paths),
            inbound: inbound_tx,
            closes: closes_tx,
        };
        tokio::spawn(accept_loop(listener, ctx));

        Self {
            url: format!("ws://127.0.0.1:{port}"),
            accepted,
            inbound,
            closes,
            current,
            paths,
        }
    }

    /// A `ws://` URL nothing listens on.
    pub fn unused_url() -> String {
        let listener =
            std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind probe");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        format!("ws://127.0.0.1:{port}")
    }

    /// Request path of the latest handshake.
    pub fn last_path(&self) -> Option<String> {
        self.paths.lock().last().cloned()
    }

    pub fn send_text(&self, text: &str) {
        self.command(RelayCommand::Text(text.to_string()));
    }

    pub fn send_json(&self, value: Value) {
        self.command(RelayCommand::Text(value.to_string()));
    }

    /// Closes the latest connection from the relay side.
    pub fn close_with(&self, code: CloseCode) {
        self.command(RelayCommand::Close(code));
    }

    fn command(&self, command: RelayCommand) {
        let current = self.current.lock();
        let sender = current.as_ref().expect("no client connected");
        sender.send(command).ok().expect("connection task alive");
    }
}

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Receives one item or panics after five seconds.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for relay")
        .expect("relay channel closed")
}

// ============================================================================
// Accept Loop
// ============================================================================

struct AcceptContext {
    behavior: RelayBehavior,
    accepted: Arc<AtomicUsize>,
    current: CommandSlot,
    paths: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<Message>,
    closes: mpsc::UnboundedSender<Option<CloseCode>>,
}

async fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    let mut stalled = Vec::new();

    while let Ok((stream, _addr)) = listener.accept().await {
        if matches!(ctx.behavior, RelayBehavior::Stall) {
            stalled.push(stream);
            continue;
        }

        let Some(ws) = handshake(stream, &ctx.paths).await else {
            continue;
        };
        ctx.accepted.fetch_add(1, Ordering::SeqCst);

        match ctx.behavior {
            RelayBehavior::CloseImmediately(code) => {
                tokio::spawn(close_now(ws, code));
            }
            RelayBehavior::Interactive => {
                let (tx, rx) = mpsc::unbounded_channel();
                *ctx.current.lock() = Some(tx);
                tokio::spawn(serve(ws, rx, ctx.inbound.clone(), ctx.closes.clone()));
            }
            RelayBehavior::Stall => {}
        }
    }
}

async fn handshake(
    stream: TcpStream,
    paths: &Arc<Mutex<Vec<String>>>,
) -> Option<WebSocketStream<TcpStream>> {
    let paths = Arc::clone(paths);
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        paths.lock().push(request.uri().path().to_string());
        Ok(response)
    };
    accept_hdr_async(stream, callback).await.ok()
}

async fn close_now(mut ws: WebSocketStream<TcpStream>, code: CloseCode) {
    let frame = CloseFrame {
        code,
        reason: "test close".into(),
    };
    let _ = ws.send(WsMessage::Close(Some(frame))).await;
    while let Some(Ok(_)) = ws.next().await {}
}

async fn serve(
    ws: WebSocketStream<TcpStream>,
    mut commands: mpsc::UnboundedReceiver<RelayCommand>,
    inbound: mpsc::UnboundedSender<Message>,
    closes: mpsc::UnboundedSender<Option<CloseCode>>,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Ok(message) = Message::from_json(text.as_str()) {
                        let _ = inbound.send(message);
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let _ = closes.send(frame.map(|f| f.code));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },

            command = commands.recv() => match command {
                Some(RelayCommand::Text(text)) => {
                    let _ = write.send(WsMessage::Text(text.into())).await;
                }
                Some(RelayCommand::Close(code)) => {
                    let frame = CloseFrame {
                        code,
                        reason: "relay close".into(),
                    };
                    let _ = write.send(WsMessage::Close(Some(frame))).await;
                    while let Some(Ok(_)) = read.next().await {}
                    break;
                }
                None => break,
            },
        }
    }
}
