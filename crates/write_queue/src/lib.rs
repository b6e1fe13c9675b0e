// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Ordered, back-pressured asynchronous writes for connection-oriented transports.
//!
//! This crate is the write path that sits between an application protocol and a non-blocking
//! channel. An [`AsyncQueueWriter`] accepts write requests for any number of connections and
//! guarantees, per connection, that:
//!
//! * bytes reach the channel in the order the writes were submitted,
//! * outcomes are reported in that same order,
//! * only one thread writes to the channel at a time,
//! * a completion handler that keeps submitting writes cannot overflow the stack.
//!
//! Writes that the channel cannot take right away wait in a per-connection pending queue that is
//! drained whenever the event loop reports the channel as writable. The number of bytes waiting is
//! tracked per connection and exposed as an advisory admission check, [`AsyncQueueWriter::can_write()`].
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "test-util")]
//! # {
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use write_queue::testing::FakeConnection;
//! use write_queue::{AsyncQueueWriter, WriteRequest};
//!
//! let writer = AsyncQueueWriter::<FakeConnection, Bytes>::new();
//! let connection = Arc::new(FakeConnection::new());
//!
//! if writer.can_write(&connection, 5) {
//!     let request = WriteRequest::new(Bytes::from_static(b"hello"))
//!         .on_complete(|outcome| println!("write finished: {outcome:?}"));
//!
//!     let future = writer.write(&connection, request).expect("connection is open");
//!     assert!(future.is_done());
//! }
//! # }
//! ```
//!
//! # Collaborators
//!
//! The writer talks to the outside world through a small number of seams:
//!
//! * [`Connection`] is the channel: it attempts non-blocking writes and asks the event loop to
//!   call [`AsyncQueueWriter::on_writable()`] once it can take more bytes.
//! * [`HandOff`] moves the drain of a connection to another thread when a chain of writes issued
//!   from completion handlers has grown too deep.
//! * [`Interceptor`] decides, per write, when the write counts as complete.
//! * [`MessageCloner`] makes a message safe to keep in the queue when a write is deferred.
//!
//! # Operation records
//!
//! Each in-flight write is tracked by an [`OperationRecord`] drawn from a [`RecordPool`]. Records
//! are recycled after their outcome has been delivered and refuse every access until they are
//! rebound to a new operation.

mod completion;
mod connection;
mod constants;
mod error;
mod handoff;
mod options;
mod queue;
mod record;
mod reentrant;
mod strategy;
mod write_result;
mod writer;

pub use completion::{CompletionFuture, CompletionHandler, CompletionSender, Notifier, completion};
pub use connection::{Connection, ConnectionId, WriteReady};
pub use error::{Error, Result};
pub use handoff::{HandOff, HandOffWork, ThreadHandOff};
pub use options::{PendingBytesLimit, WriterOptions};
pub use queue::WritePossibleHandler;
pub use record::{OperationRecord, RecordPool};
pub use reentrant::{ReentrancyGuard, Reentrant};
pub use strategy::{InterceptDecision, Interceptor, MessageCloner};
pub use write_result::WriteResult;
pub use writer::{AsyncQueueWriter, AsyncQueueWriterBuilder, WriteRequest};

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
