// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::{Connection, ConnectionId, WriteReady};

const DEFAULT_SEND_BUFFER_SIZE: usize = 64 * 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A [`Connection`] that collects everything written to it and lets the test steer how much the
/// channel accepts.
///
/// By default the fake is open, writable and accepts every byte it is offered. Tests can make it
/// unwritable, cap how many bytes it accepts per call or in total, inject errors and inspect every
/// accepted write afterwards, including the thread that performed it.
///
/// The fake does not call back into the writer. Tests play the event loop by calling
/// [`AsyncQueueWriter::on_writable()`][crate::AsyncQueueWriter::on_writable] themselves.
///
/// This is for test and example purposes only and is not optimized for performance.
#[derive(Debug)]
pub struct FakeConnection {
    id: ConnectionId,
    send_buffer_size: usize,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    open: bool,
    writable: bool,
    budget: Option<usize>,
    max_chunk: Option<usize>,
    fail_next: Option<io::ErrorKind>,
    overreport: bool,
    contents: Vec<u8>,
    writes: Vec<RecordedWrite>,
    notification_requests: usize,
}

/// One call to [`FakeConnection::try_write()`][Connection::try_write] that accepted bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedWrite {
    len: usize,
    destination: Option<SocketAddr>,
    thread: ThreadId,
}

impl RecordedWrite {
    /// Number of bytes the fake accepted.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the call accepted no bytes. Never true for a recorded write.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The destination the writer passed along.
    #[must_use]
    pub const fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    /// The thread that made the call.
    #[must_use]
    pub const fn thread(&self) -> ThreadId {
        self.thread
    }
}

impl FakeConnection {
    /// Starts building a new `FakeConnection`.
    #[must_use]
    pub fn builder() -> FakeConnectionBuilder {
        FakeConnectionBuilder {
            id: None,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
        }
    }

    /// Creates a new `FakeConnection` with a unique identifier and a 64 KiB send buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Makes the channel report itself as writable or not. An unwritable channel accepts nothing.
    pub fn set_writable(&self, writable: bool) {
        self.state.lock().writable = writable;
    }

    /// Limits the total number of bytes accepted from now on; once used up, the channel reports
    /// `WouldBlock`. `None` removes the limit.
    pub fn set_budget(&self, budget: Option<usize>) {
        self.state.lock().budget = budget;
    }

    /// Limits the number of bytes accepted per call. `None` removes the limit.
    pub fn set_max_chunk(&self, max_chunk: Option<usize>) {
        self.state.lock().max_chunk = max_chunk;
    }

    /// Makes the next call that would accept bytes fail with the given error kind instead.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state.lock().fail_next = Some(kind);
    }

    /// Makes the channel claim to have accepted one byte more than it was offered.
    pub fn set_overreport(&self, overreport: bool) {
        self.state.lock().overreport = overreport;
    }

    /// Closes the channel. Every later write attempt fails.
    pub fn close(&self) {
        self.state.lock().open = false;
    }

    /// Every byte accepted so far, in the order accepted.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().contents.clone()
    }

    /// Every call that accepted bytes, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().writes.clone()
    }

    /// How many times the writer asked to be told about writability.
    #[must_use]
    pub fn notification_requests(&self) -> usize {
        self.state.lock().notification_requests
    }
}

impl Default for FakeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn is_writable(&self) -> bool {
        let state = self.state.lock();
        state.open && state.writable
    }

    fn try_write(&self, destination: Option<SocketAddr>, chunk: &[u8]) -> io::Result<WriteReady> {
        let mut state = self.state.lock();

        if !state.open {
            return Err(io::ErrorKind::NotConnected.into());
        }

        if !state.writable || state.budget == Some(0) {
            return Ok(WriteReady::WouldBlock);
        }

        if let Some(kind) = state.fail_next.take() {
            return Err(kind.into());
        }

        let accepted = [state.budget, state.max_chunk]
            .into_iter()
            .flatten()
            .fold(chunk.len(), usize::min);

        if let Some(budget) = state.budget.as_mut() {
            *budget -= accepted;
        }

        state.contents.extend_from_slice(&chunk[..accepted]);
        state.writes.push(RecordedWrite {
            len: accepted,
            destination,
            thread: thread::current().id(),
        });

        if state.overreport {
            return Ok(WriteReady::Written(accepted + 1));
        }

        Ok(WriteReady::Written(accepted))
    }

    fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    fn request_write_notification(&self) {
        self.state.lock().notification_requests += 1;
    }
}

/// Creates an instance of [`FakeConnection`].
///
/// Access through [`FakeConnection::builder()`].
#[derive(Debug)]
pub struct FakeConnectionBuilder {
    id: Option<ConnectionId>,
    send_buffer_size: usize,
}

impl FakeConnectionBuilder {
    /// Uses the given identifier instead of a freshly allocated one.
    #[must_use]
    pub const fn id(mut self, id: ConnectionId) -> Self {
        self.id = Some(id);
        self
    }

    /// The send buffer size the fake reports.
    #[must_use]
    pub const fn send_buffer_size(mut self, send_buffer_size: usize) -> Self {
        self.send_buffer_size = send_buffer_size;
        self
    }

    /// Builds the `FakeConnection` with the provided configuration.
    #[must_use]
    pub fn build(self) -> FakeConnection {
        FakeConnection {
            id: self
                .id
                .unwrap_or_else(|| ConnectionId(NEXT_ID.fetch_add(1, Ordering::Relaxed))),
            send_buffer_size: self.send_buffer_size,
            state: Mutex::new(State {
                open: true,
                writable: true,
                budget: None,
                max_chunk: None,
                fail_next: None,
                overreport: false,
                contents: Vec::new(),
                writes: Vec::new(),
                notification_requests: 0,
            }),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_everything_by_default() {
        let connection = FakeConnection::new();

        assert!(connection.is_open());
        assert!(connection.is_writable());
        assert_eq!(connection.try_write(None, b"hello").unwrap(), WriteReady::Written(5));
        assert_eq!(connection.written(), b"hello");
        assert_eq!(connection.writes().len(), 1);
        assert_eq!(connection.writes()[0].thread(), thread::current().id());
    }

    #[test]
    fn identifiers_are_unique() {
        assert_ne!(FakeConnection::new().id(), FakeConnection::new().id());
        assert_eq!(FakeConnection::builder().id(ConnectionId(7)).build().id(), ConnectionId(7));
    }

    #[test]
    fn budget_and_chunk_limits() {
        let connection = FakeConnection::new();
        connection.set_budget(Some(5));
        connection.set_max_chunk(Some(3));

        assert_eq!(connection.try_write(None, b"abcdefgh").unwrap(), WriteReady::Written(3));
        assert_eq!(connection.try_write(None, b"defgh").unwrap(), WriteReady::Written(2));
        assert_eq!(connection.try_write(None, b"fgh").unwrap(), WriteReady::WouldBlock);
        assert_eq!(connection.written(), b"abcde");
    }

    #[test]
    fn unwritable_blocks() {
        let connection = FakeConnection::new();
        connection.set_writable(false);

        assert!(!connection.is_writable());
        assert_eq!(connection.try_write(None, b"x").unwrap(), WriteReady::WouldBlock);
        assert!(connection.writes().is_empty());
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let connection = FakeConnection::new();
        connection.fail_next_write(io::ErrorKind::ConnectionReset);

        assert_eq!(connection.try_write(None, b"x").unwrap_err().kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(connection.try_write(None, b"x").unwrap(), WriteReady::Written(1));
    }

    #[test]
    fn closed_fails() {
        let connection = FakeConnection::new();
        connection.close();

        assert!(!connection.is_open());
        assert!(!connection.is_writable());
        assert_eq!(connection.try_write(None, b"x").unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn counts_notification_requests() {
        let connection = FakeConnection::builder().send_buffer_size(10).build();
        connection.request_write_notification();
        connection.request_write_notification();

        assert_eq!(connection.notification_requests(), 2);
        assert_eq!(connection.send_buffer_size(), 10);
    }
}
