// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::thread;

use tracing::{Level, event};

use crate::constants::HANDOFF_THREAD_NAME;

/// A unit of work moved off the current thread.
pub type HandOffWork = Box<dyn FnOnce() + Send>;

/// Runs work on a thread other than the calling one.
///
/// The writer uses this to continue a `write -> completion handler -> write` chain once it has
/// grown to the configured maximum depth, so that the chain starts over at depth zero on a fresh
/// stack. Typical implementations post the work to an event loop or a worker pool.
///
/// With the `anyspawn` feature enabled, `anyspawn::Spawner` implements this trait.
pub trait HandOff: Debug + Send + Sync + 'static {
    /// Arranges for `work` to run on a different thread. Must not run `work` inline.
    fn hand_off(&self, work: HandOffWork);
}

/// Runs every piece of handed-off work on a newly spawned OS thread.
///
/// This is the default used by [`AsyncQueueWriter`][crate::AsyncQueueWriter]. Hand-offs are rare
/// (they only happen when a write chain reaches its maximum depth), so the cost of a thread per
/// hand-off is acceptable for most uses. Services with an event loop should plug in their own.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadHandOff;

impl HandOff for ThreadHandOff {
    fn hand_off(&self, work: HandOffWork) {
        let spawned = thread::Builder::new()
            .name(HANDOFF_THREAD_NAME.to_string())
            .spawn(work);

        if let Err(error) = spawned {
            // The work was consumed by the failed spawn, so the queued writes stay queued until
            // the next writability event drains them.
            event!(Level::ERROR, message = "failed to spawn hand-off thread", error = %error);
        }
    }
}

#[cfg(feature = "anyspawn")]
impl HandOff for anyspawn::Spawner {
    fn hand_off(&self, work: HandOffWork) {
        // Fire and forget; completion is reported through the writes' own notifiers.
        drop(self.spawn(async move { work() }));
    }
}
