//! Per-connection outbound queue.
//!
//! Broadcasts run inside the session lock and must never wait on a socket.
//! Each connection therefore owns a bounded queue of encoded frames and a
//! writer task that drains it. Queuing never blocks: a full queue means the
//! peer has stopped keeping up, and the session drops it.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use bytes::Bytes;
use flotilla_shared::net::{encode_frame, Message, MessageSink};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, warn};

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("outbound queue full")]
    Full,
    #[error("connection writer stopped")]
    Closed,
}

/// Sending side of one connection's queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
}

impl Outbound {
    /// A bare queue; whoever holds the receiver consumes the frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Starts a writer task that drains the queue into `sink`.
    ///
    /// The task ends when every `Outbound` clone is gone and the queue is
    /// empty, or on the first failed or timed-out write. Either way it
    /// closes the sink. The returned receiver resolves once it has ended.
    pub fn spawn<S>(
        sink: S,
        peer: SocketAddr,
        capacity: usize,
        write_timeout: Duration,
    ) -> (Self, oneshot::Receiver<()>)
    where
        S: MessageSink + 'static,
    {
        let (outbound, rx) = Self::channel(capacity);
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(write_loop(sink, peer, rx, write_timeout, done_tx));
        (outbound, done_rx)
    }

    /// Queues an encoded frame without waiting.
    pub fn push(&self, frame: Bytes) -> Result<(), QueueError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    pub fn push_message(&self, msg: &Message) -> anyhow::Result<()> {
        let frame = encode_frame(msg).context("encode frame")?;
        self.push(frame)?;
        Ok(())
    }
}

async fn write_loop<S: MessageSink>(
    sink: S,
    peer: SocketAddr,
    mut rx: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
    _done: oneshot::Sender<()>,
) {
    while let Some(frame) = rx.recv().await {
        match tokio::time::timeout(write_timeout, sink.send_frame(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "Write failed");
                break;
            }
            Err(_) => {
                warn!(%peer, timeout_ms = write_timeout.as_millis() as u64, "Write timed out");
                break;
            }
        }
    }
    // Later pushes see a closed queue.
    rx.close();
    if let Err(e) = sink.close().await {
        debug!(%peer, error = %e, "Close failed");
    }
}
