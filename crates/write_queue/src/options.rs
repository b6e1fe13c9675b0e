// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::constants::{AUTO_PENDING_BYTES_SEND_BUFFER_MULTIPLIER, DEFAULT_MAX_WRITE_REENTRANTS, DEFAULT_RECORD_POOL_CAPACITY};

/// The ceiling on bytes that may be pending (queued but not yet written) per connection.
///
/// The ceiling is advisory: [`AsyncQueueWriter::can_write()`][crate::AsyncQueueWriter::can_write]
/// compares against it, but writes submitted regardless are still queued.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PendingBytesLimit {
    /// Four times the connection's send buffer size.
    #[default]
    Auto,

    /// No ceiling; `can_write()` always admits.
    Unlimited,

    /// A fixed number of bytes, the same for every connection.
    Bytes(usize),
}

impl PendingBytesLimit {
    /// The ceiling in bytes for a connection with the given send buffer size, or `None` when there
    /// is no ceiling.
    #[must_use]
    pub const fn resolve(self, send_buffer_size: usize) -> Option<usize> {
        match self {
            Self::Auto => Some(send_buffer_size.saturating_mul(AUTO_PENDING_BYTES_SEND_BUFFER_MULTIPLIER)),
            Self::Unlimited => None,
            Self::Bytes(bytes) => Some(bytes),
        }
    }
}

impl From<usize> for PendingBytesLimit {
    fn from(value: usize) -> Self {
        Self::Bytes(value)
    }
}

/// Configuration of an [`AsyncQueueWriter`][crate::AsyncQueueWriter].
///
/// Every field has a default; see the individual setters for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriterOptions {
    max_pending_bytes_per_connection: PendingBytesLimit,
    max_write_reentrants: usize,
    record_pool_capacity: usize,
}

impl WriterOptions {
    /// Options with every value at its default.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_pending_bytes_per_connection: PendingBytesLimit::Auto,
            max_write_reentrants: DEFAULT_MAX_WRITE_REENTRANTS,
            record_pool_capacity: DEFAULT_RECORD_POOL_CAPACITY,
        }
    }

    /// The ceiling on pending bytes per connection. Defaults to [`PendingBytesLimit::Auto`].
    #[must_use]
    pub const fn max_pending_bytes_per_connection(mut self, limit: PendingBytesLimit) -> Self {
        self.max_pending_bytes_per_connection = limit;
        self
    }

    /// The maximum depth of `write -> completion handler -> write` chains on one thread before
    /// the next write is moved to another thread. Defaults to 10.
    #[must_use]
    pub const fn max_write_reentrants(mut self, max: usize) -> Self {
        self.max_write_reentrants = max;
        self
    }

    /// How many free operation records the writer keeps for reuse. Defaults to 256.
    #[must_use]
    pub const fn record_pool_capacity(mut self, capacity: usize) -> Self {
        self.record_pool_capacity = capacity;
        self
    }

    pub(crate) const fn pending_bytes_limit(&self) -> PendingBytesLimit {
        self.max_pending_bytes_per_connection
    }

    pub(crate) const fn write_reentrants(&self) -> usize {
        self.max_write_reentrants
    }

    pub(crate) const fn pool_capacity(&self) -> usize {
        self.record_pool_capacity
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// The part of the configuration that may change while the writer is in use.
#[derive(Debug)]
pub(crate) struct LiveOptions {
    max_pending_bytes: Mutex<PendingBytesLimit>,
    max_write_reentrants: AtomicUsize,
}

impl LiveOptions {
    pub(crate) fn new(options: &WriterOptions) -> Self {
        Self {
            max_pending_bytes: Mutex::new(options.pending_bytes_limit()),
            max_write_reentrants: AtomicUsize::new(options.write_reentrants()),
        }
    }

    pub(crate) fn max_pending_bytes(&self) -> PendingBytesLimit {
        *self.max_pending_bytes.lock()
    }

    pub(crate) fn set_max_pending_bytes(&self, limit: PendingBytesLimit) {
        *self.max_pending_bytes.lock() = limit;
    }

    pub(crate) fn max_write_reentrants(&self) -> usize {
        self.max_write_reentrants.load(Ordering::Relaxed)
    }

    pub(crate) fn set_max_write_reentrants(&self, max: usize) {
        self.max_write_reentrants.store(max, Ordering::Relaxed);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_is_four_send_buffers() {
        assert_eq!(PendingBytesLimit::Auto.resolve(64 * 1024), Some(256 * 1024));
        assert_eq!(PendingBytesLimit::Unlimited.resolve(64 * 1024), None);
        assert_eq!(PendingBytesLimit::Bytes(1024).resolve(64 * 1024), Some(1024));
        assert_eq!(PendingBytesLimit::from(10), PendingBytesLimit::Bytes(10));
    }

    #[test]
    fn live_ceiling_keeps_extreme_values() {
        let live = LiveOptions::new(&WriterOptions::new());

        for limit in [
            PendingBytesLimit::Bytes(usize::MAX),
            PendingBytesLimit::Bytes(usize::MAX - 1),
            PendingBytesLimit::Bytes(0),
            PendingBytesLimit::Unlimited,
            PendingBytesLimit::Auto,
        ] {
            live.set_max_pending_bytes(limit);
            assert_eq!(live.max_pending_bytes(), limit);
        }
    }

    #[test]
    fn defaults() {
        let options = WriterOptions::default();

        assert_eq!(options.pending_bytes_limit(), PendingBytesLimit::Auto);
        assert_eq!(options.write_reentrants(), DEFAULT_MAX_WRITE_REENTRANTS);
        assert_eq!(options.pool_capacity(), DEFAULT_RECORD_POOL_CAPACITY);
    }

    #[test]
    fn live_options_update() {
        let live = LiveOptions::new(&WriterOptions::new().max_write_reentrants(3));
        assert_eq!(live.max_write_reentrants(), 3);
        assert_eq!(live.max_pending_bytes(), PendingBytesLimit::Auto);

        live.set_max_write_reentrants(5);
        live.set_max_pending_bytes(PendingBytesLimit::Bytes(1024));

        assert_eq!(live.max_write_reentrants(), 5);
        assert_eq!(live.max_pending_bytes(), PendingBytesLimit::Bytes(1024));
    }
}
