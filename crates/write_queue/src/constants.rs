// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Default cap on the depth of `write -> completion handler -> write` chains on one thread.
///
/// Ten nested writes keep the common "write the next message from the completion handler" pattern
/// on the fast synchronous path while leaving plenty of stack for the handlers themselves.
pub(crate) const DEFAULT_MAX_WRITE_REENTRANTS: usize = 10;

/// Multiplier applied to a connection's send buffer size to derive its default pending byte
/// ceiling.
///
/// Four send buffers worth of queued data keep the channel busy across several writability
/// events without letting a slow peer pin an unbounded amount of memory.
pub(crate) const AUTO_PENDING_BYTES_SEND_BUFFER_MULTIPLIER: usize = 4;

/// Default number of free operation records each writer keeps for reuse.
pub(crate) const DEFAULT_RECORD_POOL_CAPACITY: usize = 256;

/// Name given to threads spawned to continue capped write chains.
pub(crate) const HANDOFF_THREAD_NAME: &str = "write_queue-handoff";
