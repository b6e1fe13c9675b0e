// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Display};
use std::net::SocketAddr;

/// Identifies a connection for the lifetime of the writer that serves it.
///
/// Two live connections must never share an identifier. Identifiers may be reused once the
/// previous owner was closed via [`AsyncQueueWriter::close()`][crate::AsyncQueueWriter::close].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnectionId(pub u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The outcome of one attempt to hand bytes to a channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteReady {
    /// The channel accepted the given number of bytes, which may be fewer than offered.
    Written(usize),

    /// The channel cannot accept any bytes right now. The writer waits for the event loop to
    /// report writability via [`AsyncQueueWriter::on_writable()`][crate::AsyncQueueWriter::on_writable].
    WouldBlock,
}

/// The channel side of a connection, as seen by the write queue.
///
/// The writer calls into the connection synchronously, both from [`write()`] and from the drain
/// that runs on writability events. Calls for one connection are never concurrent.
///
/// # Thread safety
///
/// Implementations must be thread-safe because writes may be submitted from any thread.
///
/// [`write()`]: crate::AsyncQueueWriter::write
pub trait Connection: Debug + Send + Sync + 'static {
    /// The identifier under which the writer keeps this connection's pending queue.
    fn id(&self) -> ConnectionId;

    /// Whether the channel can still be written to. Writes to a closed connection fail.
    fn is_open(&self) -> bool;

    /// Whether the channel currently reports that it can accept more bytes.
    fn is_writable(&self) -> bool;

    /// Attempts to write up to `chunk.len()` bytes now, without blocking.
    ///
    /// `destination` is the address the bytes are for, if the transport needs one per write.
    ///
    /// # Errors
    ///
    /// Any error fails the write the bytes belong to, and only that write.
    fn try_write(&self, destination: Option<SocketAddr>, chunk: &[u8]) -> std::io::Result<WriteReady>;

    /// The size of the underlying send buffer, used to derive the default pending byte ceiling.
    fn send_buffer_size(&self) -> usize;

    /// Asks the event loop to call [`AsyncQueueWriter::on_writable()`][crate::AsyncQueueWriter::on_writable]
    /// once the channel can accept more bytes.
    fn request_write_notification(&self);
}
