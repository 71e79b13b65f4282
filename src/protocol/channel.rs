//! One framed, bidirectional connection.
//!
//! Each connection has:
//! * a read loop, which decodes whole packets and hands them one at a time to a [`Dispatcher`];
//! * an [`Outbox`], a cloneable handle onto a bounded FIFO of outbound packets;
//! * a writer task which drains the outbox, writing each packet completely before starting the next.
//!
//! Packets reach the wire in the order they were enqueued, and bytes of distinct packets are never interleaved.
// (c) 2025 Ross Younger

use anyhow::Result;
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, Span, debug, trace, warn};

use super::packet::{FramingError, HEADER_SIZE, Header, Packet};

/// The connection is closed (or closing); nothing more can be sent on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection is closed")]
pub struct ChannelClosed;

/// Reasons a connection stopped abnormally
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer sent a header we can't accept
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The underlying stream failed
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// The dispatcher gave up
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),
}

/// How a connection ended
#[derive(Debug)]
pub enum ChannelOutcome {
    /// The peer closed the stream cleanly, at a packet boundary
    PeerClosed,
    /// We closed the connection (see [`Outbox::close`])
    Closed,
    /// Something went wrong
    Failed(ChannelError),
}

impl ChannelOutcome {
    /// Did the connection end without error?
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !matches!(self, ChannelOutcome::Failed(_))
    }
}

/// Receives each inbound packet, in arrival order.
///
/// The read loop does not fetch the next packet until `dispatch` returns, so a
/// dispatcher that needs to do slow work should hand it off to a task of its own.
#[async_trait]
pub trait Dispatcher: Send {
    /// Handles one packet. Returning an error closes the connection.
    async fn dispatch(&mut self, packet: Packet, outbox: &Outbox) -> Result<()>;

    /// Called once when the peer has closed its sending side cleanly,
    /// before our own queued output is drained and the stream shut down.
    async fn finish(&mut self, _outbox: &Outbox) {}
}

#[derive(Debug)]
enum Outbound {
    Packet(Packet),
    Shutdown,
}

/// Handle for sending packets on a connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

impl Outbox {
    /// Appends a packet to the outbound queue, waiting for space if the queue is full.
    pub async fn enqueue(&self, packet: Packet) -> Result<(), ChannelClosed> {
        self.push(Outbound::Packet(packet)).await
    }

    /// Requests an orderly half-close: everything already queued is written,
    /// then our sending side of the stream is shut down.
    /// Anything enqueued afterwards is discarded.
    pub async fn shutdown(&self) -> Result<(), ChannelClosed> {
        self.push(Outbound::Shutdown).await
    }

    /// Closes the connection abruptly. Queued packets are abandoned.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Has the connection been closed?
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    async fn push(&self, item: Outbound) -> Result<(), ChannelClosed> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ChannelClosed),
            r = self.tx.send(item) => r.map_err(|_| ChannelClosed),
        }
    }
}

/// Drains the outbound queue onto the stream.
///
/// Stops when a shutdown is requested, when every [`Outbox`] has been dropped, or on cancellation.
/// A write error cancels the connection.
async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                trace!("write queue abandoned");
                return Ok(());
            }
            next = rx.recv() => next,
        };
        let Some(Outbound::Packet(packet)) = next else {
            rx.close();
            trace!("shutting down send side");
            return writer.shutdown().await;
        };
        trace!("send {packet}");
        let wire = packet.to_wire();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            r = async {
                writer.write_all(&wire).await?;
                writer.flush().await
            } => r,
        };
        if let Err(e) = result {
            warn!("write failed: {e}");
            cancel.cancel();
            return Err(e);
        }
    }
}

/// Reads exactly enough bytes to fill `buf`.
/// Returns false if the stream ended cleanly before the first byte.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
    }
    Ok(true)
}

/// Reads the next header. Returns None on a clean end of stream.
async fn read_header<R>(reader: &mut R) -> Result<Option<Header>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_SIZE];
    if !fill(reader, &mut buf).await? {
        return Ok(None);
    }
    Ok(Some(Header::decode(&buf)?))
}

async fn read_body<R>(reader: &mut R, header: Header) -> Result<Packet, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut body = BytesMut::zeroed(usize::from(header.body_length));
    if !body.is_empty() && !fill(reader, &mut body).await? {
        // the header promised a body
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(Packet::from_wire(header, body.freeze()))
}

/// Reads one whole packet. Returns None on a clean end of stream.
#[cfg(test)]
pub(crate) async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    match read_header(reader).await? {
        None => Ok(None),
        Some(header) => Ok(Some(read_body(reader, header).await?)),
    }
}

#[derive(Debug)]
enum ReadState {
    AwaitingHeader,
    AwaitingBody(Header),
    Dispatching(Packet),
    Closed(ChannelOutcome),
}

/// A framed connection, ready to run
#[derive(Debug)]
pub struct Channel<R> {
    reader: R,
    outbox: Outbox,
    writer: JoinHandle<std::io::Result<()>>,
}

impl<R> Channel<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Sets up a connection and starts its writer task.
    ///
    /// `queue_depth` bounds the number of outbound packets waiting to be written;
    /// senders wait when it is full.
    ///
    /// This must be called from within a tokio runtime.
    pub fn new<W>(reader: R, writer: W, queue_depth: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let cancel = CancellationToken::new();
        let writer =
            tokio::spawn(write_loop(writer, rx, cancel.clone()).instrument(Span::current()));
        Self {
            reader,
            outbox: Outbox { tx, cancel },
            writer,
        }
    }

    /// Returns a handle for sending on this connection
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Runs the read loop to completion, feeding packets to the dispatcher.
    ///
    /// On a clean end of stream the dispatcher is given the chance to finish,
    /// queued output is written and our send side is shut down.
    /// On any error the connection is closed and queued output abandoned.
    /// Either way the dispatcher is dropped before this returns.
    pub async fn run<D: Dispatcher>(self, mut dispatcher: D) -> ChannelOutcome {
        let Self {
            mut reader,
            outbox,
            writer,
        } = self;
        let cancel = outbox.cancel.clone();

        let mut state = ReadState::AwaitingHeader;
        let outcome = loop {
            state = match state {
                ReadState::AwaitingHeader => {
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        r = read_header(&mut reader) => Some(r),
                    };
                    match result {
                        None => ReadState::Closed(ChannelOutcome::Closed),
                        Some(Ok(None)) => ReadState::Closed(ChannelOutcome::PeerClosed),
                        Some(Ok(Some(header))) => ReadState::AwaitingBody(header),
                        Some(Err(e)) => ReadState::Closed(ChannelOutcome::Failed(e)),
                    }
                }
                ReadState::AwaitingBody(header) => {
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        r = read_body(&mut reader, header) => Some(r),
                    };
                    match result {
                        None => ReadState::Closed(ChannelOutcome::Closed),
                        Some(Ok(packet)) => ReadState::Dispatching(packet),
                        Some(Err(e)) => ReadState::Closed(ChannelOutcome::Failed(e)),
                    }
                }
                ReadState::Dispatching(packet) => {
                    trace!("received {packet}");
                    match dispatcher.dispatch(packet, &outbox).await {
                        Ok(()) if cancel.is_cancelled() => {
                            ReadState::Closed(ChannelOutcome::Closed)
                        }
                        Ok(()) => ReadState::AwaitingHeader,
                        Err(e) => {
                            ReadState::Closed(ChannelOutcome::Failed(ChannelError::Handler(e)))
                        }
                    }
                }
                ReadState::Closed(outcome) => break outcome,
            };
        };

        if let ChannelOutcome::PeerClosed = outcome {
            debug!("peer closed the connection");
            dispatcher.finish(&outbox).await;
            // fails harmlessly if we already half-closed
            let _ = outbox.shutdown().await;
        } else {
            outbox.close();
        }
        drop(dispatcher);
        drop(outbox);

        match writer.await {
            Ok(Err(e)) if !matches!(outcome, ChannelOutcome::Failed(_)) => {
                ChannelOutcome::Failed(ChannelError::Transport(e))
            }
            Err(e) => {
                warn!("writer task failed: {e}");
                outcome
            }
            Ok(_) => outcome,
        }
    }
}
