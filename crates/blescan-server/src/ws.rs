//! WebSocket transport.
//!
//! Bridges tokio-tungstenite connections into the synchronous, non-blocking
//! [`Listener`]/[`Connection`] interface the session server polls. Each
//! connection gets a reader task and a writer task; the session side talks
//! to them over unbounded channels, so `read` and `write` never block the
//! tick loop.
//!
//! Clients send text (or binary) frames carrying `\r\n`-terminated
//! commands; every response is one text frame.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::transport::{Connection, Listener, TransportError};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listening WebSocket endpoint.
///
/// Handshakes run in the background; finished connections wait in a queue
/// until the server accepts them.
pub struct WsListener {
    local_addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<WsConnection>,
    accept_task: JoinHandle<()>,
}

impl WsListener {
    /// Bind and start accepting. Must be called within a tokio runtime.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("WebSocket transport bound to {}", local_addr);

        let (tx, incoming) = mpsc::unbounded_channel();
        let listener = Arc::new(listener);
        let accept_task = tokio::spawn(accept_loop(
            move || {
                let listener = listener.clone();
                async move { listener.accept().await }
            },
            tx,
        ));

        Ok(Self {
            local_addr,
            incoming,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Listener for WsListener {
    type Connection = WsConnection;

    fn accept(&mut self) -> Result<Option<WsConnection>, TransportError> {
        match self.incoming.try_recv() {
            Ok(connection) => Ok(Some(connection)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    fn close(&mut self) {
        self.accept_task.abort();
        self.incoming.close();
    }
}

impl Drop for WsListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop<A, F>(mut accept: A, tx: mpsc::UnboundedSender<WsConnection>)
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<(TcpStream, SocketAddr)>>,
{
    loop {
        match accept().await {
            Ok((stream, addr)) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => {
                            debug!("WebSocket handshake with {} complete", addr);
                            if tx.send(bridge(ws, addr)).is_err() {
                                debug!("Listener closed, dropping connection from {}", addr);
                            }
                        }
                        Err(e) => warn!("WebSocket handshake with {} failed: {}", addr, e),
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
        if tx.is_closed() {
            break;
        }
    }
}

/// Split the socket into a reader and a writer task joined to the session
/// through channels.
fn bridge(ws: WebSocketStream<TcpStream>, peer: SocketAddr) -> WsConnection {
    let (mut sink, mut stream) = ws.split();
    let (inbound_tx, inbound) = mpsc::unbounded_channel::<Vec<u8>>();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let bytes = match msg {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(data)) => data,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket error from {}: {}", peer, e);
                    break;
                }
            };
            if inbound_tx.send(bytes).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                debug!("Failed to send to {}: {}", peer, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    WsConnection {
        peer,
        inbound,
        outbound: Some(outbound),
    }
}

/// Session-side end of a bridged WebSocket connection.
pub struct WsConnection {
    peer: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

impl Connection for WsConnection {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut bytes = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => return Ok(bytes),
                // Deliver what arrived before the close; report it next time.
                Err(TryRecvError::Disconnected) if !bytes.is_empty() => return Ok(bytes),
                Err(TryRecvError::Disconnected) => return Err(TransportError::Closed),
            }
        }
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(Message::Text(text.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_accept_errors_back_off() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(accept_loop(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(TcpStream, SocketAddr), _>(io::Error::new(
                        io::ErrorKind::Other,
                        "too many open files",
                    ))
                }
            },
            tx,
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let seen = attempts.load(Ordering::SeqCst);
        assert!((1..=4).contains(&seen), "{seen} accept attempts in 250 ms");

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("accept loop should stop once the listener is gone")
            .unwrap();
    }
}
