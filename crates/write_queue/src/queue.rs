// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::{Interceptor, OperationRecord, Result, WriteResult};

pub(crate) type WriteRecord<C, M> = OperationRecord<Arc<C>, M, WriteResult>;

/// Called once enough pending bytes have drained for a connection to admit a write of the
/// registered size, or with an error if the connection closes first.
pub type WritePossibleHandler = Box<dyn FnOnce(Result<()>) + Send>;

/// One write waiting for (or currently taking) its turn on the channel.
pub(crate) struct QueuedWrite<C, M> {
    pub(crate) record: Box<WriteRecord<C, M>>,
    pub(crate) interceptor: Option<Arc<dyn Interceptor>>,
}

impl<C, M> Debug for QueuedWrite<C, M> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedWrite")
            .field("result", &self.record.current_result().ok())
            .field("has_interceptor", &self.interceptor.is_some())
            .finish()
    }
}

/// How a thread relates to the right to write to a connection's channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Turn {
    /// The thread just took the right to write and must give it back via `release()`.
    Acquired,

    /// The thread already holds the right further up its stack (it is running a completion
    /// handler) and may write, but must not release.
    Reentered,

    /// Another thread is writing to the channel.
    Busy,
}

/// The pending writes of one connection, in submission order, and the running total of their
/// unwritten bytes.
///
/// Only one thread at a time may write to the channel: the one holding the turn. The turn stays
/// held while completion handlers run, so the outcomes of consecutive writes are reported in
/// submission order.
pub(crate) struct ConnectionQueue<C, M> {
    writes: VecDeque<QueuedWrite<C, M>>,

    // Unwritten bytes of every write that went through the queue and has not finished yet,
    // including a write that the turn holder popped and is working on.
    pending_bytes: usize,

    turn: Option<ThreadId>,

    // Set when a capped write chain asked for the queue to be drained on a different thread.
    handoff_requested: bool,

    write_possible: Vec<(usize, WritePossibleHandler)>,
}

impl<C, M> ConnectionQueue<C, M> {
    pub(crate) const fn new() -> Self {
        Self {
            writes: VecDeque::new(),
            pending_bytes: 0,
            turn: None,
            handoff_requested: false,
            write_possible: Vec::new(),
        }
    }

    pub(crate) const fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Nothing queued and nobody writing.
    pub(crate) fn is_idle(&self) -> bool {
        self.writes.is_empty() && self.turn.is_none()
    }

    pub(crate) fn try_take_turn(&mut self) -> Turn {
        let current = thread::current().id();

        match self.turn {
            None => {
                self.turn = Some(current);
                Turn::Acquired
            }
            Some(owner) if owner == current => Turn::Reentered,
            Some(_) => Turn::Busy,
        }
    }

    pub(crate) fn release_turn(&mut self) {
        debug_assert_eq!(self.turn, Some(thread::current().id()), "turn released by a thread that does not hold it");
        self.turn = None;
    }

    pub(crate) fn holds_turn(&self) -> bool {
        self.turn == Some(thread::current().id())
    }

    pub(crate) const fn turn_is_free(&self) -> bool {
        self.turn.is_none()
    }

    /// Queues a write behind all others, counting its unwritten bytes.
    pub(crate) fn push_back(&mut self, write: QueuedWrite<C, M>, unwritten: usize) {
        self.pending_bytes = self
            .pending_bytes
            .checked_add(unwritten)
            .expect("pending bytes cannot exceed usize::MAX");
        self.writes.push_back(write);
    }

    /// Puts a write the turn holder could not finish at the head of the queue. A write that came
    /// from the queue is already counted and passes zero for `uncounted`.
    pub(crate) fn push_front(&mut self, write: QueuedWrite<C, M>, uncounted: usize) {
        self.pending_bytes = self
            .pending_bytes
            .checked_add(uncounted)
            .expect("pending bytes cannot exceed usize::MAX");
        self.writes.push_front(write);
    }

    pub(crate) fn pop_front(&mut self) -> Option<QueuedWrite<C, M>> {
        self.writes.pop_front()
    }

    /// Stops counting bytes that were written or will never be written.
    pub(crate) const fn discount(&mut self, bytes: usize) {
        // Saturating: `drain_all()` zeroes the total while a turn holder may still be working on
        // a popped write.
        self.pending_bytes = self.pending_bytes.saturating_sub(bytes);
    }

    pub(crate) fn request_handoff(&mut self) {
        self.handoff_requested = true;
    }

    pub(crate) fn take_handoff_request(&mut self) -> bool {
        std::mem::take(&mut self.handoff_requested)
    }

    pub(crate) fn add_write_possible(&mut self, size: usize, handler: WritePossibleHandler) {
        self.write_possible.push((size, handler));
    }

    /// Removes the write-possible handlers whose size now fits under `ceiling`.
    pub(crate) fn take_write_possible(&mut self, ceiling: Option<usize>) -> Vec<WritePossibleHandler> {
        if self.write_possible.is_empty() {
            return Vec::new();
        }

        let pending = self.pending_bytes;
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .write_possible
            .drain(..)
            .partition(|(size, _)| admits(pending, *size, ceiling));

        self.write_possible = waiting;
        ready.into_iter().map(|(_, handler)| handler).collect()
    }

    /// Empties the queue, returning everything that still has to be told about the closure.
    pub(crate) fn drain_all(&mut self) -> (Vec<QueuedWrite<C, M>>, Vec<WritePossibleHandler>) {
        self.pending_bytes = 0;
        self.handoff_requested = false;

        (
            self.writes.drain(..).collect(),
            self.write_possible.drain(..).map(|(_, handler)| handler).collect(),
        )
    }
}

impl<C, M> Debug for ConnectionQueue<C, M> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionQueue")
            .field("writes", &self.writes.len())
            .field("pending_bytes", &self.pending_bytes)
            .field("turn", &self.turn)
            .field("handoff_requested", &self.handoff_requested)
            .field("write_possible", &self.write_possible.len())
            .finish()
    }
}

/// Whether `size` more bytes fit on top of `pending` under `ceiling`.
pub(crate) const fn admits(pending: usize, size: usize, ceiling: Option<usize>) -> bool {
    match ceiling {
        None => true,
        Some(ceiling) => match pending.checked_add(size) {
            Some(total) => total <= ceiling,
            None => false,
        },
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Notifier;

    #[derive(Debug)]
    struct NoConnection;

    fn queued(bytes: usize) -> QueuedWrite<NoConnection, Vec<u8>> {
        QueuedWrite {
            record: Box::new(OperationRecord::new(
                Arc::new(NoConnection),
                vec![0; bytes],
                WriteResult::new(None, bytes),
                Notifier::none(),
            )),
            interceptor: None,
        }
    }

    #[test]
    fn admission_arithmetic() {
        assert!(admits(600, 424, Some(1024)));
        assert!(!admits(600, 500, Some(1024)));
        assert!(admits(usize::MAX, usize::MAX, None));
        assert!(!admits(usize::MAX, 1, Some(usize::MAX)));
    }

    #[test]
    fn fifo_with_byte_accounting() {
        let mut queue = ConnectionQueue::new();

        queue.push_back(queued(10), 10);
        queue.push_back(queued(20), 20);
        assert_eq!(queue.pending_bytes(), 30);

        let first = queue.pop_front().unwrap();
        assert_eq!(first.record.message().unwrap().len(), 10);

        // Popped but unfinished writes keep their bytes counted.
        assert_eq!(queue.pending_bytes(), 30);
        queue.discount(4);
        queue.push_front(first, 0);
        assert_eq!(queue.pending_bytes(), 26);

        // A write that never went through the queue is counted when it is put at the head.
        queue.push_front(queued(3), 3);
        assert_eq!(queue.pending_bytes(), 29);
        assert_eq!(queue.pop_front().unwrap().record.message().unwrap().len(), 3);

        assert_eq!(queue.pop_front().unwrap().record.message().unwrap().len(), 10);
        assert_eq!(queue.pop_front().unwrap().record.message().unwrap().len(), 20);
        assert!(queue.is_empty());
    }

    #[test]
    fn turn_is_exclusive_and_reentrant() {
        let mut queue = ConnectionQueue::<NoConnection, Vec<u8>>::new();

        assert!(queue.is_idle());
        assert!(queue.turn_is_free());
        assert_eq!(queue.try_take_turn(), Turn::Acquired);
        assert!(!queue.turn_is_free());
        assert!(queue.holds_turn());
        assert_eq!(queue.try_take_turn(), Turn::Reentered);
        assert!(!queue.is_idle());

        let queue = std::sync::Mutex::new(queue);
        thread::scope(|s| {
            s.spawn(|| {
                let mut queue = queue.lock().unwrap();
                assert_eq!(queue.try_take_turn(), Turn::Busy);
                assert!(!queue.holds_turn());
            });
        });

        let mut queue = queue.into_inner().unwrap();
        queue.release_turn();
        assert!(queue.is_idle());
    }

    #[test]
    fn handoff_request_is_taken_once() {
        let mut queue = ConnectionQueue::<NoConnection, Vec<u8>>::new();

        assert!(!queue.take_handoff_request());
        queue.request_handoff();
        assert!(queue.take_handoff_request());
        assert!(!queue.take_handoff_request());
    }

    #[test]
    fn write_possible_fires_when_space_frees_up() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut queue = ConnectionQueue::new();
        queue.push_back(queued(600), 600);

        for size in [300, 500] {
            let fired = Arc::clone(&fired);
            queue.add_write_possible(
                size,
                Box::new(move |result| {
                    assert!(result.is_ok());
                    fired.fetch_add(size, Ordering::SeqCst);
                }),
            );
        }

        // 600 + 300 fits under 1000, 600 + 500 does not.
        for handler in queue.take_write_possible(Some(1000)) {
            handler(Ok(()));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 300);

        queue.discount(600);
        for handler in queue.take_write_possible(Some(1000)) {
            handler(Ok(()));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn drain_all_resets() {
        let mut queue = ConnectionQueue::new();
        queue.push_back(queued(5), 5);
        queue.add_write_possible(1, Box::new(|_| {}));
        queue.request_handoff();

        let (writes, handlers) = queue.drain_all();

        assert_eq!(writes.len(), 1);
        assert_eq!(handlers.len(), 1);
        assert_eq!(queue.pending_bytes(), 0);
        assert!(!queue.take_handoff_request());
        assert!(queue.is_empty());
    }
}
