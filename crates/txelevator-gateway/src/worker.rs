//! A gateway worker: one bus receiver, its own streams and connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace};

use txelevator_broadcast::{BusMessage, BusReceiver};
use txelevator_core::Network;

use crate::error::GatewayError;
use crate::protocol::ServerMessage;
use crate::session::{error_frame, Session, WorkerStreams};

pub const WELCOME: &str = "connected to txelevator";

pub struct Worker {
    id: usize,
    network: Network,
    streams: WorkerStreams,
    next_conn: Arc<AtomicU64>,
}

impl Worker {
    pub fn new(id: usize, network: Network) -> Self {
        Self {
            id,
            network,
            streams: WorkerStreams::new(),
            next_conn: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn streams(&self) -> &WorkerStreams {
        &self.streams
    }

    /// Re-emit one bus message locally. Messages for another network are dropped.
    pub fn relay(&self, message: &BusMessage) -> usize {
        if message.network != self.network {
            trace!(worker = self.id, network = %message.network, "ignoring foreign network");
            return 0;
        }
        let delivered = self.streams.publish(message);
        trace!(worker = self.id, kind = %message.kind, delivered, "relayed");
        delivered
    }

    /// Serve until both the bus and the connection feed are gone.
    pub async fn run<S>(self, mut bus: BusReceiver, mut connections: mpsc::UnboundedReceiver<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        info!(worker = self.id, network = %self.network, "gateway worker started");
        let mut bus_open = true;
        let mut feed_open = true;

        while bus_open || feed_open {
            tokio::select! {
                message = bus.recv(), if bus_open => match message {
                    Some(message) => {
                        self.relay(&message);
                    }
                    None => bus_open = false,
                },
                stream = connections.recv(), if feed_open => match stream {
                    Some(stream) => {
                        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
                        let streams = self.streams.clone();
                        let worker = self.id;
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, streams, conn).await {
                                debug!(worker, conn, error = %e, "connection ended with error");
                            }
                        });
                    }
                    None => feed_open = false,
                },
            }
        }
        info!(worker = self.id, "gateway worker stopped");
    }
}

/// Run one client connection to completion.
///
/// Every listener the client registered is dropped together with its
/// [`Session`] when this returns, whichever way the connection ended.
pub async fn serve_connection<S>(
    stream: S,
    streams: WorkerStreams,
    conn: u64,
) -> Result<(), GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let mut session = Session::new(conn, streams);
    debug!(conn, "client connected");

    if let Ok(welcome) = ServerMessage::Welcome(WELCOME).encode() {
        sink.send(Message::Text(welcome)).await?;
    }

    let result = loop {
        tokio::select! {
            frame = session.next_frame() => {
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    break Err(e.into());
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = session.handle_text(&text) {
                        if let Err(e) = sink.send(Message::Text(reply)).await {
                            break Err(e.into());
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    let e = GatewayError::MalformedRequest("binary frames are not supported".into());
                    if let Some(reply) = error_frame(&e) {
                        if let Err(e) = sink.send(Message::Text(reply)).await {
                            break Err(e.into());
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        break Err(e.into());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    drop(session);
    debug!(conn, "client disconnected");
    result
}
