// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{self, Waker};

use parking_lot::Mutex;

use crate::{Error, Result};

/// A callback invoked once when an operation finishes, successfully or not.
pub type CompletionHandler<R> = Box<dyn FnOnce(&Result<R>) + Send>;

/// Creates a one-shot result channel that can be resolved at most once to deliver the outcome of
/// an operation to at most one listener awaiting that outcome.
///
/// Usage:
///
/// 1. Obtain a sender and future pair via this function.
/// 2. Resolve the sender via `succeed()` or `fail()`. Only the first resolution is kept, later
///    ones are ignored and reported as such via the return value.
/// 3. Await the future (or poll `is_done()`) to observe the outcome.
///
/// # Disconnected senders
///
/// If the sender is dropped without being resolved, the future resolves to [`Error::Abandoned`].
///
/// # Thread safety
///
/// The sender and future may be on any thread - this is a thread-safe channel.
#[must_use]
pub fn completion<T>() -> (CompletionSender<T>, CompletionFuture<T>) {
    let shared = Arc::new(CompletionShared {
        state: Mutex::new(CompletionState::NotSet),
    });

    (
        CompletionSender {
            shared: Arc::clone(&shared),
        },
        CompletionFuture { shared },
    )
}

struct CompletionShared<T> {
    state: Mutex<CompletionState<T>>,
}

enum CompletionState<T> {
    /// The outcome has not been set and nobody is listening for it.
    NotSet,

    /// The outcome has not been set and someone is listening for it.
    Awaiting(Waker),

    /// The outcome has been set but nobody has yet consumed it.
    Set(Result<T>),

    /// The outcome has been set and consumed by the listener.
    Consumed,
}

impl<T> CompletionShared<T> {
    fn is_done(&self) -> bool {
        matches!(
            *self.state.lock(),
            CompletionState::Set(_) | CompletionState::Consumed
        )
    }

    #[cfg_attr(test, mutants::skip)] // Critical primitive - causes test timeouts if tampered.
    fn set(&self, outcome: Result<T>) -> bool {
        let waker = {
            let mut state = self.state.lock();

            match &*state {
                CompletionState::NotSet => {
                    *state = CompletionState::Set(outcome);
                    None
                }
                CompletionState::Awaiting(_) => {
                    match mem::replace(&mut *state, CompletionState::Set(outcome)) {
                        CompletionState::Awaiting(waker) => Some(waker),
                        _ => unreachable!("we are re-matching an already matched pattern"),
                    }
                }
                // A resolved outcome is never overwritten.
                CompletionState::Set(_) | CompletionState::Consumed => return false,
            }
        };

        // Wake outside the lock so a listener that wakes up instantly does not contend with us.
        if let Some(waker) = waker {
            waker.wake();
        }

        true
    }

    // We are intended to be polled via Future::poll, so we have an equivalent signature here.
    #[cfg_attr(test, mutants::skip)] // Critical for code execution to occur in async contexts.
    fn poll(&self, waker: &Waker) -> Option<Result<T>> {
        let mut state = self.state.lock();

        match &*state {
            CompletionState::NotSet | CompletionState::Awaiting(_) => {
                // Only the waker from the most recent poll is woken up, per the Future contract.
                *state = CompletionState::Awaiting(waker.clone());
                None
            }
            CompletionState::Set(_) => match mem::replace(&mut *state, CompletionState::Consumed) {
                CompletionState::Set(outcome) => Some(outcome),
                _ => unreachable!("we are re-matching an already matched pattern"),
            },
            CompletionState::Consumed => {
                panic!("completion future polled after its outcome was already consumed")
            }
        }
    }
}

/// The resolving side of a [`completion()`] channel.
///
/// Resolution is at-most-once: the first call to [`succeed()`][Self::succeed] or
/// [`fail()`][Self::fail] wins and every later call is a no-op that returns `false`.
pub struct CompletionSender<T> {
    shared: Arc<CompletionShared<T>>,
}

impl<T> CompletionSender<T> {
    /// Whether the channel has already been resolved.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Resolves the channel with a successful outcome.
    ///
    /// Returns `false` without touching the stored outcome if the channel was already resolved.
    pub fn succeed(&self, value: T) -> bool {
        self.shared.set(Ok(value))
    }

    /// Resolves the channel with a failure.
    ///
    /// Returns `false` without touching the stored outcome if the channel was already resolved.
    pub fn fail(&self, error: Error) -> bool {
        self.shared.set(Err(error))
    }

    /// Resolves the channel with the provided outcome.
    pub fn resolve(&self, outcome: Result<T>) -> bool {
        self.shared.set(outcome)
    }
}

impl<T> Drop for CompletionSender<T> {
    fn drop(&mut self) {
        // Only the writer holds a sender, so a drop means nobody can resolve it anymore.
        if Arc::strong_count(&self.shared) > 1 {
            _ = self.shared.set(Err(Error::Abandoned));
        }
    }
}

impl<T> Debug for CompletionSender<T> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSender")
            .field("is_done", &self.is_done())
            .finish()
    }
}

/// The listening side of a [`completion()`] channel.
///
/// Resolves to the outcome delivered through the matching [`CompletionSender`]. The outcome can
/// be consumed only once; polling again after it returned `Ready` panics.
#[must_use = "the outcome of the operation is only observable through this future"]
pub struct CompletionFuture<T> {
    shared: Arc<CompletionShared<T>>,
}

impl<T> CompletionFuture<T> {
    /// Whether the outcome of the operation is already known.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }
}

impl<T> Future for CompletionFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        self.shared
            .poll(cx.waker())
            .map_or(task::Poll::Pending, task::Poll::Ready)
    }
}

impl<T> Debug for CompletionFuture<T> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("is_done", &self.is_done())
            .finish()
    }
}

/// Everything that wants to hear about the outcome of one operation: an optional completion
/// handler and an optional completion sender.
///
/// The sender is resolved before the handler runs, so futures of consecutive operations become
/// ready in the order the operations completed.
pub struct Notifier<R> {
    handler: Option<CompletionHandler<R>>,
    sender: Option<CompletionSender<R>>,
}

impl<R> Notifier<R> {
    /// A notifier that tells nobody.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            handler: None,
            sender: None,
        }
    }

    /// Creates a notifier from its parts.
    #[must_use]
    pub const fn new(handler: Option<CompletionHandler<R>>, sender: Option<CompletionSender<R>>) -> Self {
        Self { handler, sender }
    }

    /// Whether a completion handler is still attached, i.e. has not yet been invoked.
    #[must_use]
    pub const fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Whether the completion sender exists and has already been resolved.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.sender.as_ref().is_some_and(CompletionSender::is_done)
    }

    /// Delivers a failure. An already resolved sender keeps its outcome; a still attached handler
    /// is invoked regardless.
    pub fn notify_failure(&mut self, error: Error) {
        if let Some(sender) = self.sender.as_ref() {
            _ = sender.fail(error.clone());
        }

        if let Some(handler) = self.handler.take() {
            handler(&Err(error));
        }
    }

    /// Delivers a successful outcome.
    pub fn notify_success(&mut self, result: R)
    where
        R: Clone,
    {
        self.deliver(Ok(result));
    }

    fn deliver(&mut self, outcome: Result<R>)
    where
        R: Clone,
    {
        match (self.sender.as_ref(), self.handler.take()) {
            (Some(sender), Some(handler)) => {
                _ = sender.resolve(outcome.clone());
                handler(&outcome);
            }
            (Some(sender), None) => {
                _ = sender.resolve(outcome);
            }
            (None, Some(handler)) => handler(&outcome),
            (None, None) => {}
        }
    }
}

impl<R> Default for Notifier<R> {
    fn default() -> Self {
        Self::none()
    }
}

impl<R> Debug for Notifier<R> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("has_handler", &self.has_handler())
            .field("sender", &self.sender)
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use futures::FutureExt;
    use futures::task::noop_waker_ref;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(CompletionSender<u32>: Send, Sync);
    assert_impl_all!(CompletionFuture<u32>: Send, Sync);
    assert_impl_all!(Notifier<u32>: Send);

    #[test]
    fn get_after_set() {
        let (sender, mut future) = completion();

        assert!(sender.succeed(42));
        assert!(future.is_done());

        let cx = &mut task::Context::from_waker(noop_waker_ref());
        assert!(matches!(future.poll_unpin(cx), task::Poll::Ready(Ok(42))));
    }

    #[test]
    fn get_before_set() {
        let (sender, mut future) = completion();

        let cx = &mut task::Context::from_waker(noop_waker_ref());
        assert!(future.poll_unpin(cx).is_pending());
        assert!(!sender.is_done());

        assert!(sender.succeed(42));

        assert!(matches!(future.poll_unpin(cx), task::Poll::Ready(Ok(42))));
    }

    #[test]
    fn get_after_set_multithreaded() {
        let (sender, future) = completion();

        thread::spawn(move || {
            sender.succeed(42);
        })
        .join()
        .unwrap();

        let outcome = thread::spawn(move || futures::executor::block_on(future))
            .join()
            .unwrap();

        assert!(matches!(outcome, Ok(42)));
    }

    #[test]
    fn second_resolution_is_ignored() {
        let (sender, future) = completion();

        assert!(sender.succeed(1));
        assert!(!sender.succeed(2));
        assert!(!sender.fail(Error::Aborted));

        assert!(matches!(futures::executor::block_on(future), Ok(1)));
    }

    #[test]
    fn dropped_sender_abandons() {
        let (sender, future) = completion::<u32>();

        drop(sender);

        assert!(matches!(futures::executor::block_on(future), Err(Error::Abandoned)));
    }

    #[test]
    fn dropped_future_does_not_disturb_sender() {
        let (sender, future) = completion();

        drop(future);

        assert!(sender.succeed(42));
        assert!(sender.is_done());
    }

    #[test]
    fn notifier_resolves_sender_and_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (sender, future) = completion();

        let mut notifier = Notifier::new(
            Some(Box::new({
                let calls = Arc::clone(&calls);
                move |outcome: &Result<u32>| {
                    assert!(matches!(outcome, Ok(7)));
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            })),
            Some(sender),
        );

        assert!(notifier.has_handler());
        notifier.notify_success(7);
        assert!(!notifier.has_handler());

        // The handler is gone and the sender already resolved, so this changes nothing.
        notifier.notify_failure(Error::Aborted);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(futures::executor::block_on(future), Ok(7)));
    }

    #[test]
    fn failure_on_resolved_sender_still_reaches_handler() {
        let failures = Arc::new(AtomicUsize::new(0));
        let (sender, future) = completion::<u32>();

        assert!(sender.succeed(5));

        let mut notifier = Notifier::new(
            Some(Box::new({
                let failures = Arc::clone(&failures);
                move |outcome: &Result<u32>| {
                    assert!(matches!(outcome, Err(Error::ConnectionClosed)));
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            })),
            Some(sender),
        );

        assert!(notifier.is_done());
        notifier.notify_failure(Error::ConnectionClosed);

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(matches!(futures::executor::block_on(future), Ok(5)));
    }
}
