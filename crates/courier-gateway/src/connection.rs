use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use courier_types::{Response, ResponseFlag};

/// Outgoing half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Incoming half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

#[derive(Debug, thiserror::Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Cloneable handle to a live connection: what the presence registry stores
/// and what deliveries push through.
///
/// Sends are serialized by the sink lock, so frames from concurrent
/// deliveries never interleave. Closing is idempotent.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sink: Arc<Mutex<FrameSink>>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(sink: FrameSink) -> Self {
        Self {
            id: Uuid::new_v4(),
            sink: Arc::new(Mutex::new(sink)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Serialize `value` and send it as one text frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), axum::Error> {
        if self.is_closed() {
            return Err(axum::Error::new(ConnectionClosed));
        }
        let text = serde_json::to_string(value).map_err(axum::Error::new)?;
        self.sink.lock().await.send(Message::Text(text.into())).await
    }

    pub async fn respond(&self, flag: ResponseFlag) -> Result<(), axum::Error> {
        self.send_json(&Response::from(flag)).await
    }

    /// Stop the connection's receive loop and close the sink.
    /// Closing an already closed handle does nothing.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        // Peer may already be gone; nothing to report
        let _ = self.sink.lock().await.close().await;
    }
}

/// An accepted connection: its handle plus the incoming frame stream, which
/// only the owning session reads.
pub struct Connection {
    handle: ConnectionHandle,
    frames: FrameStream,
    remote_addr: SocketAddr,
}

impl Connection {
    pub fn new(sink: FrameSink, frames: FrameStream, remote_addr: SocketAddr) -> Self {
        Self {
            handle: ConnectionHandle::new(sink),
            frames,
            remote_addr,
        }
    }

    pub fn from_socket(socket: WebSocket, remote_addr: SocketAddr) -> Self {
        let (sender, receiver) = socket.split();
        Self::new(Box::pin(sender), Box::pin(receiver), remote_addr)
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Payload of the next text or binary frame.
    ///
    /// `Ok(None)` means the conversation is over: the peer closed, the
    /// stream ended, or the handle was closed (for example by the registry).
    /// Ping and pong frames are answered by the WebSocket layer and skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, axum::Error> {
        loop {
            let next = tokio::select! {
                _ = self.handle.closed.cancelled() => return Ok(None),
                next = self.frames.next() => next,
            };

            match next {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(e),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(_)) => continue,
            }
        }
    }

    /// End the connection. Clones of the handle held elsewhere see it closed.
    pub async fn close(self) {
        self.handle.close().await;
    }
}
