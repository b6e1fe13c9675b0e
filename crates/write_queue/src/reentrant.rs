// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tracking of `write -> completion handler -> write -> ...` chains on one thread.
//!
//! A completion handler that issues another write from within itself grows the call stack of the
//! current thread with every link of the chain. The writer keeps a per-thread depth counter to cap
//! such chains and moves the next link to another thread once the cap is reached.
//!
//! The counter itself is a plain value ([`Reentrant`]) so that callers and tests can reason about
//! arbitrary depths without touching thread-local state. Only [`Reentrant::current()`] and
//! [`Reentrant::enter()`] interact with the calling thread's depth.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    /// Writes may be issued from any thread, including threads the writer knows nothing about,
    /// so the depth lives in a regular thread-local variable.
    static WRITE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// A write reentrancy counter: the number of nested write calls active on one thread.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Reentrant {
    counter: usize,
}

impl Reentrant {
    /// A counter at the given depth.
    #[must_use]
    pub const fn with_depth(counter: usize) -> Self {
        Self { counter }
    }

    /// Snapshot of the calling thread's write depth.
    #[must_use]
    pub fn current() -> Self {
        Self::with_depth(WRITE_DEPTH.with(Cell::get))
    }

    /// The depth held by this counter.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.counter
    }

    /// Increments the counter and returns the new depth.
    pub const fn inc_and_get(&mut self) -> usize {
        self.counter = self.counter.saturating_add(1);
        self.counter
    }

    /// Decrements the counter and returns the new depth. The depth never drops below zero.
    pub const fn dec_and_get(&mut self) -> usize {
        self.counter = self.counter.saturating_sub(1);
        self.counter
    }

    /// Marks the calling thread as being one level deeper in a write chain until the returned
    /// guard is dropped.
    #[must_use = "the depth is restored as soon as the guard is dropped"]
    pub fn enter() -> ReentrancyGuard {
        WRITE_DEPTH.with(|depth| {
            let mut counter = Self::with_depth(depth.get());
            depth.set(counter.inc_and_get());
        });

        ReentrancyGuard {
            _not_send: PhantomData,
        }
    }
}

/// Keeps the calling thread's write depth raised by one while alive.
///
/// The guard must be dropped on the thread that created it, which is why it is neither `Send`
/// nor `Sync`.
#[derive(Debug)]
pub struct ReentrancyGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        WRITE_DEPTH.with(|depth| {
            let mut counter = Reentrant::with_depth(depth.get());
            debug_assert_ne!(counter.get(), 0, "write depth underflow");
            depth.set(counter.dec_and_get());
        });
    }
}
