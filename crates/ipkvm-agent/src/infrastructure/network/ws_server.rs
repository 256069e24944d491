//! WebSocket stream server: accept loop and per-viewer session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured port.
//! 2. Accepting incoming TCP connections from viewers.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Running two concurrent halves per session:
//!    - **Viewer → Agent**: every binary frame is offered to a channel of
//!      [`INBOUND_CAPACITY`] messages that the orchestrator drains with
//!      [`StreamServer::drain_messages`]. Frames arriving while it is full
//!      are dropped.
//!    - **Agent → Viewer**: every packet passed to
//!      [`StreamServer::broadcast`] is written as one binary frame.
//! 5. Shutting everything down when the server value is dropped.
//!
//! # Threading
//!
//! The orchestrator worker is a plain OS thread, so the server owns a small
//! multi-threaded Tokio runtime of its own. The public methods never block
//! on it: inbound messages are read with `try_recv` and outbound packets are
//! handed to a `broadcast` channel.
//!
//! # Slow viewers
//!
//! The broadcast channel holds [`BROADCAST_CAPACITY`] packets. A viewer
//! that falls further behind receives `Lagged`, skips the packets it missed
//! and carries on with the newest ones. One slow viewer never stalls the
//! capture loop or the other viewers.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{NetworkError, ServerFactory, StreamServer, INBOUND_CAPACITY};

/// Packets buffered per viewer before it starts skipping.
pub const BROADCAST_CAPACITY: usize = 64;

/// Worker threads of the server's runtime.
const RUNTIME_THREADS: usize = 2;

// ── Public API ────────────────────────────────────────────────────────────────

/// WebSocket implementation of [`StreamServer`].
pub struct WebSocketStreamServer {
    /// `None` only while dropping.
    runtime: Option<Runtime>,
    port: u16,
    clients: Arc<AtomicUsize>,
    inbound: mpsc::Receiver<Vec<u8>>,
    outbound: broadcast::Sender<Arc<Vec<u8>>>,
    accept_task: JoinHandle<()>,
}

impl WebSocketStreamServer {
    /// Starts listening on `0.0.0.0:port`.
    ///
    /// Passing port 0 binds an ephemeral port; [`StreamServer::port`]
    /// reports the one chosen.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Runtime`] if the runtime cannot start and
    /// [`NetworkError::Bind`] if the port is unavailable.
    pub fn bind(port: u16) -> Result<Self, NetworkError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("ipkvm-net")
            .enable_all()
            .build()
            .map_err(NetworkError::Runtime)?;

        // Bind synchronously so the caller learns about a busy port right away.
        let bind_err = |source| NetworkError::Bind { port, source };
        let std_listener =
            StdTcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let bound_port = std_listener.local_addr().map_err(bind_err)?.port();

        let listener = {
            // `from_std` registers the socket with the reactor of the
            // runtime entered here.
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener).map_err(bind_err)?
        };

        let clients = Arc::new(AtomicUsize::new(0));
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound, _) = broadcast::channel(BROADCAST_CAPACITY);

        let accept_task = runtime.spawn(accept_loop(
            listener,
            Arc::clone(&clients),
            inbound_tx,
            outbound.clone(),
        ));

        info!("stream server listening on port {bound_port}");

        Ok(Self {
            runtime: Some(runtime),
            port: bound_port,
            clients,
            inbound,
            outbound,
            accept_task,
        })
    }
}

impl StreamServer for WebSocketStreamServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn client_count(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    fn drain_messages(&mut self) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn broadcast(&self, packet: &[u8]) {
        // `send` only fails when no viewer is subscribed; nothing to do then.
        let _ = self.outbound.send(Arc::new(packet.to_vec()));
    }
}

impl Drop for WebSocketStreamServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        if let Some(runtime) = self.runtime.take() {
            // Does not block, so dropping from any context is safe.
            runtime.shutdown_background();
        }
        info!("stream server on port {} stopped", self.port);
    }
}

/// [`ServerFactory`] producing [`WebSocketStreamServer`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketServerFactory;

impl ServerFactory for WebSocketServerFactory {
    fn bind(&self, port: u16) -> Result<Box<dyn StreamServer>, NetworkError> {
        Ok(Box::new(WebSocketStreamServer::bind(port)?))
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts connections until the task is aborted.
///
/// Each accepted connection gets its own task so a slow handshake never
/// delays the next viewer.
async fn accept_loop(
    listener: TcpListener,
    clients: Arc<AtomicUsize>,
    inbound: mpsc::Sender<Vec<u8>>,
    outbound: broadcast::Sender<Arc<Vec<u8>>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                debug!("new viewer connection from {peer_addr}");
                let clients = Arc::clone(&clients);
                let inbound = inbound.clone();
                let packets = outbound.subscribe();
                tokio::spawn(async move {
                    handle_viewer_session(stream, peer_addr, clients, inbound, packets).await;
                });
            }
            Err(e) => {
                // Transient (e.g. out of file descriptors); back off briefly.
                error!("accept error: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Runs one viewer session and keeps the client count accurate.
async fn handle_viewer_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    clients: Arc<AtomicUsize>,
    inbound: mpsc::Sender<Vec<u8>>,
    packets: broadcast::Receiver<Arc<Vec<u8>>>,
) {
    let ws_stream = match accept_async(raw_stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed with {peer_addr}: {e}");
            return;
        }
    };

    let session_id = Uuid::new_v4();
    let connected = clients.fetch_add(1, Ordering::AcqRel) + 1;
    info!("viewer {session_id} connected from {peer_addr} ({connected} connected)");

    let (ws_tx, ws_rx) = ws_stream.split();

    // Whichever half finishes first ends the session.
    tokio::select! {
        () = forward_packets(ws_tx, packets, session_id) => {}
        () = read_viewer_messages(ws_rx, inbound, session_id) => {}
    }

    let remaining = clients.fetch_sub(1, Ordering::AcqRel) - 1;
    info!("viewer {session_id} disconnected ({remaining} connected)");
}

/// Agent → Viewer: writes every broadcast packet as a binary frame.
async fn forward_packets<S>(
    mut ws_tx: S,
    mut packets: broadcast::Receiver<Arc<Vec<u8>>>,
    session_id: Uuid,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        match packets.recv().await {
            Ok(packet) => {
                if ws_tx.send(WsMessage::Binary(packet.to_vec())).await.is_err() {
                    debug!("viewer {session_id}: send failed (viewer gone)");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("viewer {session_id}: lagging, skipped {skipped} packets");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Viewer → Agent: forwards binary frames to the orchestrator's queue.
async fn read_viewer_messages<S>(
    mut ws_rx: S,
    inbound: mpsc::Sender<Vec<u8>>,
    session_id: Uuid,
) where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("viewer {session_id}: WebSocket closed");
                return;
            }
            Some(Err(e)) => {
                warn!("viewer {session_id}: WebSocket error: {e}");
                return;
            }
            None => {
                debug!("viewer {session_id}: stream ended");
                return;
            }
        };

        match ws_msg {
            WsMessage::Binary(data) => {
                if !offer_inbound(&inbound, data, session_id) {
                    // Server dropped; the runtime is going away.
                    return;
                }
            }

            WsMessage::Text(_) => {
                // Control messages are binary only.
                debug!("viewer {session_id}: text frame ignored");
            }

            WsMessage::Ping(data) => {
                // tungstenite queues the Pong; it goes out with the next write.
                debug!("viewer {session_id}: ping ({} bytes)", data.len());
            }

            WsMessage::Pong(_) => {}

            WsMessage::Close(_) => {
                debug!("viewer {session_id}: Close frame received");
                return;
            }

            WsMessage::Frame(_) => {}
        }
    }
}

/// Hands `data` to the orchestrator without waiting for room.
///
/// Returns `false` once the receiving server is gone.
fn offer_inbound(inbound: &mpsc::Sender<Vec<u8>>, data: Vec<u8>, session_id: Uuid) -> bool {
    match inbound.try_send(data) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "viewer {session_id}: input backlog full, dropped {}-byte message",
                dropped.len()
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
