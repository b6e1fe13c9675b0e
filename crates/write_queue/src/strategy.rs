// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::WriteResult;

/// What the writer should do with a write after the channel accepted a chunk of it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterceptDecision {
    /// The write is complete. Any message bytes that were not yet written are discarded.
    Complete,

    /// Keep writing. A write whose message is exhausted completes regardless.
    Continue,

    /// Stop writing and fail the write with [`Error::Aborted`][crate::Error::Aborted].
    Abort,
}

/// A per-write decision hook consulted after every chunk the channel accepts, including the first.
///
/// This lets callers define when a write is done (e.g. "after N bytes" or "once a delimiter went
/// out") without the writer knowing anything about the structure of the message.
///
/// Any `Fn(&WriteResult) -> InterceptDecision` closure is an interceptor.
pub trait Interceptor: Send + Sync {
    /// Decides how to proceed given the progress made so far.
    fn intercept(&self, result: &WriteResult) -> InterceptDecision;
}

impl<F> Interceptor for F
where
    F: Fn(&WriteResult) -> InterceptDecision + Send + Sync,
{
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn intercept(&self, result: &WriteResult) -> InterceptDecision {
        self(result)
    }
}

/// Produces a queue-safe copy of a message that is about to be deferred.
///
/// Invoked only when the write cannot complete directly and its message has to wait on the
/// connection's pending queue, never for writes that finish directly. `written` is the number of
/// bytes of the message that were already handed to the channel; the message itself has already
/// been advanced past them.
///
/// Any `Fn(M, usize) -> M` closure is a cloner.
pub trait MessageCloner<M>: Send + Sync {
    /// Returns a copy of `message` that stays valid while it sits in the queue.
    fn clone_message(&self, message: M, written: usize) -> M;
}

impl<M, F> MessageCloner<M> for F
where
    F: Fn(M, usize) -> M + Send + Sync,
{
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn clone_message(&self, message: M, written: usize) -> M {
        self(message, written)
    }
}

/// The decision made when no interceptor is registered: keep going until the message is out.
pub(crate) const fn default_decision(_result: &WriteResult) -> InterceptDecision {
    InterceptDecision::Continue
}

pub(crate) fn decide(interceptor: Option<&dyn Interceptor>, result: &WriteResult) -> InterceptDecision {
    interceptor.map_or_else(|| default_decision(result), |i| i.intercept(result))
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_interceptors() {
        let done_after_four = |result: &WriteResult| {
            if result.written() >= 4 {
                InterceptDecision::Complete
            } else {
                InterceptDecision::Continue
            }
        };

        let mut result = WriteResult::new(None, 10);
        assert_eq!(decide(Some(&done_after_four), &result), InterceptDecision::Continue);

        result.record_chunk(4);
        assert_eq!(decide(Some(&done_after_four), &result), InterceptDecision::Complete);
    }

    #[test]
    fn default_keeps_writing() {
        let result = WriteResult::new(None, 10);
        assert_eq!(decide(None, &result), InterceptDecision::Continue);
    }

    #[test]
    fn closures_are_cloners() {
        let cloner = |message: Vec<u8>, written: usize| {
            let mut copy = message;
            copy.push(u8::try_from(written).unwrap());
            copy
        };

        assert_eq!(cloner.clone_message(vec![1, 2, 3], 2), vec![1, 2, 3, 2]);
    }
}
