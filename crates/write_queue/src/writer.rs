// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use bytes::Buf;
use dashmap::DashMap;
use nm::{Event, Magnitude};
use parking_lot::Mutex;
use tracing::{Level, event};

use crate::completion::{CompletionFuture, CompletionHandler, Notifier, completion};
use crate::options::LiveOptions;
use crate::queue::{ConnectionQueue, QueuedWrite, Turn, WritePossibleHandler, admits};
use crate::strategy::decide;
use crate::{
    Connection, ConnectionId, Error, HandOff, InterceptDecision, Interceptor, MessageCloner, PendingBytesLimit, RecordPool,
    Reentrant, Result, ThreadHandOff, WriteReady, WriteResult, WriterOptions,
};

const BOUND: &str = "records owned by the writer stay bound until they are released to the pool";

type SharedQueue<C, M> = Arc<Mutex<ConnectionQueue<C, M>>>;

/// One write submitted to an [`AsyncQueueWriter`]: the message plus everything that shapes how it
/// is written and who hears about the outcome.
///
/// ```
/// # use write_queue::{InterceptDecision, WriteRequest, WriteResult};
/// let request = WriteRequest::new(&b"hello"[..])
///     .on_complete(|outcome| println!("{outcome:?}"))
///     .interceptor(|result: &WriteResult| {
///         if result.written() >= 3 {
///             InterceptDecision::Complete
///         } else {
///             InterceptDecision::Continue
///         }
///     });
/// # drop(request);
/// ```
pub struct WriteRequest<M> {
    message: M,
    destination: Option<SocketAddr>,
    handler: Option<CompletionHandler<WriteResult>>,
    interceptor: Option<Arc<dyn Interceptor>>,
    cloner: Option<Box<dyn MessageCloner<M>>>,
}

impl<M> WriteRequest<M> {
    /// A request to write `message` with no handler, interceptor or cloner.
    #[must_use]
    pub const fn new(message: M) -> Self {
        Self {
            message,
            destination: None,
            handler: None,
            interceptor: None,
            cloner: None,
        }
    }

    /// The peer address to pass to the channel, for connections that need one per write.
    #[must_use]
    pub fn destination(mut self, destination: SocketAddr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Called exactly once with the outcome of the write, after the completion future resolves.
    ///
    /// The handler runs on the thread that finished the write. If it panics, the panic propagates
    /// to that thread's caller (such as [`AsyncQueueWriter::write()`] or
    /// [`AsyncQueueWriter::on_writable()`]); the connection's remaining writes stay queued and
    /// are written by the next `write()` or `on_writable()` for the connection.
    #[must_use]
    pub fn on_complete(mut self, handler: impl FnOnce(&Result<WriteResult>) + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Consulted after every chunk the channel accepts. See [`Interceptor`].
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Produces the copy of the message that waits in the queue if the write is deferred.
    /// See [`MessageCloner`].
    #[must_use]
    pub fn cloner(mut self, cloner: impl MessageCloner<M> + 'static) -> Self {
        self.cloner = Some(Box::new(cloner));
        self
    }
}

impl<M> Debug for WriteRequest<M> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteRequest")
            .field("destination", &self.destination)
            .field("has_handler", &self.handler.is_some())
            .field("has_interceptor", &self.interceptor.is_some())
            .field("has_cloner", &self.cloner.is_some())
            .finish_non_exhaustive()
    }
}

/// How far one attempt at writing a message got.
enum Attempt {
    /// The write is done, successfully or because the interceptor said so.
    Finished,

    /// The channel took all it could for now; the rest waits for the next writability event.
    Blocked,
}

/// Writes messages to connections in submission order, queueing whatever the channel cannot take
/// right away.
///
/// For each connection, at most one thread writes to the channel at a time and every write is
/// applied to the channel, and reported to its submitter, in the order it was submitted. A write
/// to a connection with nothing queued goes straight to the channel from the submitting thread;
/// everything else waits in the connection's pending queue until the event loop reports the
/// channel as writable through [`on_writable()`][Self::on_writable].
///
/// # Backpressure
///
/// The writer never refuses or blocks a write because too many bytes are pending. Producers are
/// expected to ask [`can_write()`][Self::can_write] before submitting, or to register interest via
/// [`notify_write_possible()`][Self::notify_write_possible].
///
/// # Reentrancy
///
/// Completion handlers run synchronously on the thread that finished the write and may submit
/// more writes. Each such nested write makes the stack deeper, so once a chain is
/// [`max_write_reentrants()`][Self::max_write_reentrants] deep the next write is queued and the
/// queue is drained by the configured [`HandOff`] on another thread.
///
/// # Thread safety
///
/// The writer is cheap to clone; all clones share the same queues and configuration.
pub struct AsyncQueueWriter<C, M> {
    inner: Arc<WriterInner<C, M>>,
}

struct WriterInner<C, M> {
    queues: DashMap<ConnectionId, SharedQueue<C, M>>,
    options: LiveOptions,
    records: RecordPool<Arc<C>, M, WriteResult>,
    hand_off: Box<dyn HandOff>,
}

impl<C, M> AsyncQueueWriter<C, M>
where
    C: Connection,
    M: Buf + Send + 'static,
{
    /// A writer with default options that hands off capped write chains to fresh OS threads.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a writer.
    #[must_use]
    pub fn builder() -> AsyncQueueWriterBuilder<C, M> {
        AsyncQueueWriterBuilder {
            options: WriterOptions::new(),
            hand_off: None,
            _types: PhantomData,
        }
    }

    /// Submits a write.
    ///
    /// If nothing is queued for the connection and its channel is writable, the write starts
    /// immediately on the calling thread and, if the channel takes the whole message, also
    /// completes before this returns. Otherwise the message (as produced by the request's cloner,
    /// if any) is queued behind the connection's earlier writes.
    ///
    /// The outcome is reported to the request's completion handler and through the returned
    /// future, in that order of resolution: the future is resolved first.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ConnectionClosed`] if the connection is already closed. The completion
    /// handler is not invoked in that case. Any failure after the write was accepted is reported
    /// only through the handler and the future.
    pub fn write(&self, connection: &Arc<C>, request: WriteRequest<M>) -> Result<CompletionFuture<WriteResult>> {
        let id = connection.id();

        if !connection.is_open() {
            event!(Level::DEBUG, message = "write refused", connection = %id, reason = "connection closed");
            return Err(Error::ConnectionClosed);
        }

        let WriteRequest {
            message,
            destination,
            handler,
            interceptor,
            cloner,
        } = request;

        let (sender, future) = completion();
        let result = WriteResult::new(destination, message.remaining());
        let record = self
            .inner
            .records
            .acquire(Arc::clone(connection), message, result, Notifier::new(handler, Some(sender)));

        let write = QueuedWrite { record, interceptor };

        let depth = Self::write_reentrant();
        let _depth = Reentrant::enter();

        let queue = self.inner.queue(id);

        if self.is_max_reentrants_reached(&depth) {
            event!(Level::TRACE, message = "write chain reached maximum depth", connection = %id, depth = depth.get());
            self.enqueue(connection, &queue, write, cloner.as_deref(), true);
            return Ok(future);
        }

        let turn = {
            let mut queue = queue.lock();
            if queue.is_empty() { queue.try_take_turn() } else { Turn::Busy }
        };

        match turn {
            Turn::Busy => self.enqueue(connection, &queue, write, cloner.as_deref(), false),
            turn => self.write_directly(connection, &queue, write, cloner.as_deref(), turn),
        }

        Ok(future)
    }

    /// Whether `size` more pending bytes for `connection` would stay within the configured ceiling.
    ///
    /// Returns `false` if and only if the connection's pending bytes plus `size` exceed the ceiling.
    #[must_use]
    pub fn can_write(&self, connection: &C, size: usize) -> bool {
        admits(self.pending_bytes(connection), size, self.ceiling(connection))
    }

    /// Unwritten bytes of the connection's writes that went through its pending queue and have
    /// not finished yet.
    #[must_use]
    pub fn pending_bytes(&self, connection: &C) -> usize {
        self.inner
            .existing_queue(connection.id())
            .map_or(0, |queue| queue.lock().pending_bytes())
    }

    /// Whether the connection has nothing queued and no write in progress.
    #[must_use]
    pub fn is_ready(&self, connection: &C) -> bool {
        self.inner
            .existing_queue(connection.id())
            .is_none_or(|queue| queue.lock().is_idle())
    }

    /// The ceiling on pending bytes applied to every connection.
    #[must_use]
    pub fn max_pending_bytes_per_connection(&self) -> PendingBytesLimit {
        self.inner.options.max_pending_bytes()
    }

    /// Changes the ceiling on pending bytes for every connection. Takes effect for the next
    /// admission check.
    pub fn set_max_pending_bytes_per_connection(&self, limit: impl Into<PendingBytesLimit>) {
        let limit = limit.into();
        event!(Level::DEBUG, message = "max pending bytes per connection changed", limit = ?limit);
        self.inner.options.set_max_pending_bytes(limit);
    }

    /// The maximum depth of same-thread `write -> completion handler -> write` chains.
    #[must_use]
    pub fn max_write_reentrants(&self) -> usize {
        self.inner.options.max_write_reentrants()
    }

    /// Changes the maximum depth of same-thread write chains.
    pub fn set_max_write_reentrants(&self, max: usize) {
        event!(Level::DEBUG, message = "max write reentrants changed", max);
        self.inner.options.set_max_write_reentrants(max);
    }

    /// The calling thread's current write chain depth.
    #[must_use]
    pub fn write_reentrant() -> Reentrant {
        Reentrant::current()
    }

    /// Whether a chain at the depth of `reentrant` may not grow any further on the same thread.
    #[must_use]
    pub fn is_max_reentrants_reached(&self, reentrant: &Reentrant) -> bool {
        reentrant.get() >= self.max_write_reentrants()
    }

    /// Calls `handler` once `can_write(connection, size)` holds: immediately if it already does,
    /// otherwise as soon as a drain has written enough of the connection's pending bytes.
    ///
    /// The handler receives [`Error::ConnectionClosed`] if the connection is closed, or gets
    /// closed before enough space frees up.
    pub fn notify_write_possible(&self, connection: &Arc<C>, size: usize, handler: impl FnOnce(Result<()>) + Send + 'static) {
        if !connection.is_open() {
            handler(Err(Error::ConnectionClosed));
            return;
        }

        let ceiling = self.ceiling(connection);
        let queue = self.inner.queue(connection.id());
        let mut queue = queue.lock();

        // Checked again under the lock so that a concurrent close() cannot miss the handler.
        if !connection.is_open() {
            drop(queue);
            handler(Err(Error::ConnectionClosed));
            return;
        }

        if admits(queue.pending_bytes(), size, ceiling) {
            drop(queue);
            handler(Ok(()));
            return;
        }

        event!(Level::TRACE, message = "waiting for write to become possible", connection = %connection.id(), size);
        queue.add_write_possible(size, Box::new(handler));
    }

    /// Drains the connection's pending queue. The event loop calls this whenever the connection's
    /// channel becomes writable after the writer asked via
    /// [`Connection::request_write_notification()`].
    ///
    /// Queued writes are written strictly in order until the queue is empty or the channel stops
    /// accepting bytes. The failure of one write is reported to that write alone; the drain goes
    /// on with the next one. Does nothing if another thread is already writing to the channel.
    pub fn on_writable(&self, connection: &Arc<C>) {
        if let Some(queue) = self.inner.existing_queue(connection.id()) {
            self.drain(connection, &queue);
        }
    }

    /// Forgets the connection's pending queue, failing every queued write and every registered
    /// write-possible handler with [`Error::ConnectionClosed`].
    ///
    /// Call this once the connection has been closed. A write that another thread is in the
    /// middle of writing fails on its own when the channel reports the closure.
    pub fn close(&self, connection: &C) {
        let id = connection.id();

        let Some((_, queue)) = self.inner.queues.remove(&id) else {
            return;
        };

        let (writes, handlers) = queue.lock().drain_all();

        event!(
            Level::DEBUG,
            message = "connection queue closed",
            connection = %id,
            writes = writes.len(),
            write_possible_handlers = handlers.len()
        );

        for write in writes {
            self.complete(id, write, Err(Error::ConnectionClosed));
        }

        for handler in handlers {
            handler(Err(Error::ConnectionClosed));
        }
    }

    fn ceiling(&self, connection: &C) -> Option<usize> {
        self.max_pending_bytes_per_connection()
            .resolve(connection.send_buffer_size())
    }

    /// Writes on the submitting thread, which holds (or further up its stack already held) the
    /// connection's turn and found the queue empty.
    fn write_directly(
        &self,
        connection: &Arc<C>,
        queue: &SharedQueue<C, M>,
        mut write: QueuedWrite<C, M>,
        cloner: Option<&dyn MessageCloner<M>>,
        turn: Turn,
    ) {
        let id = connection.id();
        let _turn = (turn == Turn::Acquired).then(|| TurnGuard(queue));
        let mut written = 0;
        let outcome = Self::attempt(connection, &mut write, &mut written);

        let Some(outcome) = finished(outcome) else {
            let unwritten = Self::defer(&mut write, cloner);

            event!(Level::TRACE, message = "direct write deferred", connection = %id, written, unwritten);
            WRITES_DEFERRED.with(|e| e.observe(unwritten));

            let mut queue = queue.lock();
            queue.push_front(write, unwritten);

            // A reentered write leaves the retry to the turn holder further up the stack.
            if turn == Turn::Acquired {
                queue.release_turn();
                drop(queue);
                connection.request_write_notification();
            }

            return;
        };

        WRITES_DIRECT.with(|e| e.observe(written));
        self.complete(id, write, outcome);

        if turn == Turn::Acquired {
            self.run_turn(connection, queue);
        }
    }

    /// Queues a write behind the connection's earlier writes and makes sure somebody drains it.
    fn enqueue(
        &self,
        connection: &Arc<C>,
        queue: &SharedQueue<C, M>,
        mut write: QueuedWrite<C, M>,
        cloner: Option<&dyn MessageCloner<M>>,
        capped: bool,
    ) {
        let id = connection.id();
        let unwritten = Self::defer(&mut write, cloner);

        event!(Level::TRACE, message = "write queued", connection = %id, unwritten, capped);
        WRITES_DEFERRED.with(|e| e.observe(unwritten));

        let mut guard = queue.lock();
        guard.push_back(write, unwritten);

        if capped {
            if guard.holds_turn() {
                // The turn holder further up this thread's stack hands off once the chain unwinds.
                guard.request_handoff();
            } else if guard.turn_is_free() {
                drop(guard);
                self.hand_off_drain(connection, queue);
            }

            // Otherwise the thread holding the turn drains the queue before giving the turn up.
            return;
        }

        if guard.try_take_turn() == Turn::Acquired {
            drop(guard);
            self.run_turn(connection, queue);
        }
    }

    fn drain(&self, connection: &Arc<C>, queue: &SharedQueue<C, M>) {
        let turn = queue.lock().try_take_turn();

        match turn {
            Turn::Acquired => self.run_turn(connection, queue),
            // Whoever holds the turn keeps writing until the queue is empty or the channel blocks.
            Turn::Reentered | Turn::Busy => {}
        }
    }

    /// Writes queued writes in order until the queue is empty, the channel blocks or a hand-off
    /// is requested. The calling thread must have acquired the turn; it no longer holds it when
    /// this returns.
    fn run_turn(&self, connection: &Arc<C>, queue: &SharedQueue<C, M>) {
        let id = connection.id();
        let ceiling = self.ceiling(connection);

        event!(Level::TRACE, message = "drain started", connection = %id);
        let _turn = TurnGuard(queue);

        loop {
            let mut write = {
                let mut guard = queue.lock();

                if guard.take_handoff_request() {
                    guard.release_turn();
                    drop(guard);

                    event!(Level::TRACE, message = "drain handed off", connection = %id);
                    self.hand_off_drain(connection, queue);
                    return;
                }

                let Some(write) = guard.pop_front() else {
                    guard.release_turn();
                    let ready = guard.take_write_possible(ceiling);
                    drop(guard);

                    event!(Level::TRACE, message = "drain finished", connection = %id, reason = "queue empty");
                    fire(ready);
                    return;
                };

                write
            };

            let mut written = 0;
            let outcome = Self::attempt(connection, &mut write, &mut written);

            let mut guard = queue.lock();
            guard.discount(written);

            let Some(outcome) = finished(outcome) else {
                guard.push_front(write, 0);
                guard.release_turn();
                let ready = guard.take_write_possible(ceiling);
                drop(guard);

                event!(Level::TRACE, message = "drain finished", connection = %id, reason = "channel blocked", written);
                connection.request_write_notification();
                fire(ready);
                return;
            };

            // Whatever the write leaves unwritten is never going to be written.
            guard.discount(write.record.message().map_or(0, Buf::remaining));
            let ready = guard.take_write_possible(ceiling);
            drop(guard);

            WRITES_DRAINED.with(|e| e.observe(written));

            // The turn stays with this thread while the outcome is delivered, so nested writes
            // from the completion handler keep their place in the order. Write-possible handlers
            // come after it, as the writes they submit are later than this one.
            self.complete(id, write, outcome);
            fire(ready);
        }
    }

    fn hand_off_drain(&self, connection: &Arc<C>, queue: &SharedQueue<C, M>) {
        let depth = Self::write_reentrant().get();
        event!(Level::DEBUG, message = "handing off drain", connection = %connection.id(), depth);
        HANDOFFS.with(|e| e.observe(depth));

        let writer = self.clone();
        let connection = Arc::clone(connection);
        let queue = Arc::clone(queue);

        self.inner
            .hand_off
            .hand_off(Box::new(move || writer.drain(&connection, &queue)));
    }

    /// Makes the message safe to wait in the queue and returns how many of its bytes are unwritten.
    fn defer(write: &mut QueuedWrite<C, M>, cloner: Option<&dyn MessageCloner<M>>) -> usize {
        if let Some(cloner) = cloner {
            let written = write.record.current_result().expect(BOUND).written();
            write
                .record
                .map_message(|message| cloner.clone_message(message, written))
                .expect(BOUND);
        }

        write.record.message().expect(BOUND).remaining()
    }

    /// Hands the message to the channel chunk by chunk, consulting the interceptor after each
    /// accepted chunk. `written` accumulates the bytes accepted during this attempt.
    fn attempt(connection: &C, write: &mut QueuedWrite<C, M>, written: &mut usize) -> Result<Attempt> {
        let destination = write.record.current_result()?.destination();

        loop {
            if !connection.is_open() {
                return Err(Error::ConnectionClosed);
            }

            let message = write.record.message_mut()?;

            if !message.has_remaining() {
                return Ok(Attempt::Finished);
            }

            if !connection.is_writable() {
                return Ok(Attempt::Blocked);
            }

            let chunk = message.chunk();
            let offered = chunk.len();

            let accepted = match connection.try_write(destination, chunk)? {
                WriteReady::WouldBlock | WriteReady::Written(0) => return Ok(Attempt::Blocked),
                WriteReady::Written(accepted) if accepted > offered => {
                    return Err(Error::ContractViolation(format!(
                        "channel reported writing {accepted} bytes of a {offered} byte chunk"
                    )));
                }
                WriteReady::Written(accepted) => accepted,
            };

            message.advance(accepted);
            *written = written.saturating_add(accepted);

            let result = write.record.current_result_mut()?;
            result.record_chunk(accepted);

            match decide(write.interceptor.as_deref(), result) {
                InterceptDecision::Complete => return Ok(Attempt::Finished),
                InterceptDecision::Abort => return Err(Error::Aborted),
                InterceptDecision::Continue => {}
            }
        }
    }

    /// Delivers the outcome of a finished write and returns its record to the pool.
    fn complete(&self, id: ConnectionId, write: QueuedWrite<C, M>, outcome: Result<()>) {
        let QueuedWrite { mut record, .. } = write;

        match outcome {
            Ok(()) => {
                let result = record.current_result().expect(BOUND);
                event!(
                    Level::TRACE,
                    message = "write completed",
                    connection = %id,
                    written = result.written(),
                    chunks = result.chunks()
                );
                record.notify_success().expect(BOUND);
            }
            Err(error) => {
                event!(Level::DEBUG, message = "write failed", connection = %id, error = %error);
                record.notify_failure(error).expect(BOUND);
            }
        }

        self.inner.records.release(record);
    }
}

impl<C, M> WriterInner<C, M> {
    fn existing_queue(&self, id: ConnectionId) -> Option<SharedQueue<C, M>> {
        self.queues.get(&id).map(|queue| Arc::clone(queue.value()))
    }

    /// The connection's queue, created on first use. No map guard is held once this returns.
    fn queue(&self, id: ConnectionId) -> SharedQueue<C, M> {
        if let Some(queue) = self.existing_queue(id) {
            return queue;
        }

        Arc::clone(
            self.queues
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(ConnectionQueue::new())))
                .value(),
        )
    }
}

/// Gives the turn back if the thread holding it unwinds, typically out of a panicking completion
/// handler, so that later writes to the connection are not stuck behind a turn nobody holds.
/// Regular returns release the turn explicitly.
struct TurnGuard<'a, C, M>(&'a SharedQueue<C, M>);

impl<C, M> Drop for TurnGuard<'_, C, M> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut queue = self.0.lock();
            if queue.holds_turn() {
                queue.release_turn();
            }
        }
    }
}

/// `None` if the attempt was blocked, otherwise the final outcome of the write.
fn finished(outcome: Result<Attempt>) -> Option<Result<()>> {
    match outcome {
        Ok(Attempt::Blocked) => None,
        Ok(Attempt::Finished) => Some(Ok(())),
        Err(error) => Some(Err(error)),
    }
}

fn fire(handlers: Vec<WritePossibleHandler>) {
    for handler in handlers {
        handler(Ok(()));
    }
}

impl<C, M> Clone for AsyncQueueWriter<C, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, M> Default for AsyncQueueWriter<C, M>
where
    C: Connection,
    M: Buf + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, M> Debug for AsyncQueueWriter<C, M> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueueWriter")
            .field("connections", &self.inner.queues.len())
            .field("options", &self.inner.options)
            .field("records", &self.inner.records)
            .field("hand_off", &self.inner.hand_off)
            .finish()
    }
}

/// Configures and creates an [`AsyncQueueWriter`].
pub struct AsyncQueueWriterBuilder<C, M> {
    options: WriterOptions,
    hand_off: Option<Box<dyn HandOff>>,
    _types: PhantomData<fn() -> (C, M)>,
}

impl<C, M> AsyncQueueWriterBuilder<C, M>
where
    C: Connection,
    M: Buf + Send + 'static,
{
    /// Replaces the options. Defaults to [`WriterOptions::default()`].
    #[must_use]
    pub const fn options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }

    /// Where to continue write chains that reached the maximum depth. Defaults to
    /// [`ThreadHandOff`].
    #[must_use]
    pub fn hand_off(mut self, hand_off: impl HandOff) -> Self {
        self.hand_off = Some(Box::new(hand_off));
        self
    }

    /// Creates the writer.
    #[must_use]
    pub fn build(self) -> AsyncQueueWriter<C, M> {
        event!(Level::DEBUG, message = "writer created", options = ?self.options);

        AsyncQueueWriter {
            inner: Arc::new(WriterInner {
                queues: DashMap::new(),
                options: LiveOptions::new(&self.options),
                records: RecordPool::new(self.options.pool_capacity()),
                hand_off: self.hand_off.unwrap_or_else(|| Box::new(ThreadHandOff)),
            }),
        }
    }
}

impl<C, M> Debug for AsyncQueueWriterBuilder<C, M> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueueWriterBuilder")
            .field("options", &self.options)
            .field("hand_off", &self.hand_off)
            .finish()
    }
}

const WRITTEN_BYTES_BUCKETS: &[Magnitude] = &[0, 64, 512, 4096, 16384, 65536];

thread_local! {
    static WRITES_DIRECT: Event = Event::builder()
        .name("write_queue_writes_direct")
        .histogram(WRITTEN_BYTES_BUCKETS)
        .build();

    static WRITES_DEFERRED: Event = Event::builder()
        .name("write_queue_writes_deferred")
        .histogram(WRITTEN_BYTES_BUCKETS)
        .build();

    static WRITES_DRAINED: Event = Event::builder()
        .name("write_queue_writes_drained")
        .histogram(WRITTEN_BYTES_BUCKETS)
        .build();

    static HANDOFFS: Event = Event::builder()
        .name("write_queue_handoffs")
        .build();
}
