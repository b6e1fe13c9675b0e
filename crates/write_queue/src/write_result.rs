// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::net::SocketAddr;

/// Progress and outcome of one queued write.
///
/// The writer updates the result after every chunk the channel accepts, hands it to the
/// interceptor (if any) and finally delivers it to the completion handler and future.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteResult {
    written: usize,
    chunks: usize,
    remaining: usize,
    destination: Option<SocketAddr>,
}

impl WriteResult {
    pub(crate) const fn new(destination: Option<SocketAddr>, remaining: usize) -> Self {
        Self {
            written: 0,
            chunks: 0,
            remaining,
            destination,
        }
    }

    /// Total number of bytes the channel accepted for this write so far.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Number of channel writes that accepted at least one byte.
    #[must_use]
    pub const fn chunks(&self) -> usize {
        self.chunks
    }

    /// Number of message bytes not yet handed to the channel.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// The destination address the write was submitted with.
    #[must_use]
    pub const fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    pub(crate) fn record_chunk(&mut self, bytes: usize) {
        self.written = self
            .written
            .checked_add(bytes)
            .expect("a single write cannot exceed usize::MAX bytes");
        self.remaining = self
            .remaining
            .checked_sub(bytes)
            .expect("the channel cannot accept more bytes than were offered");
        self.chunks = self.chunks.saturating_add(1);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_progress() {
        let destination: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut result = WriteResult::new(Some(destination), 10);

        result.record_chunk(4);
        result.record_chunk(6);

        assert_eq!(result.written(), 10);
        assert_eq!(result.remaining(), 0);
        assert_eq!(result.chunks(), 2);
        assert_eq!(result.destination(), Some(destination));
    }

    #[test]
    #[should_panic]
    fn rejects_overlong_chunk() {
        let mut result = WriteResult::new(None, 3);
        result.record_chunk(4);
    }
}
