// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

/// Any error that may arise from queued write operations or from misuse of pooled operation
/// records.
///
/// Errors that concern a single write are never returned from the drain loop. They are delivered
/// through the completion handler and the completion future registered for that write.
///
/// The type is cheap to clone because one failure is delivered to more than one listener.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An operation record was accessed after it was returned to its pool.
    ///
    /// This is always a programming error. When recycle tracking is active, the error carries the
    /// source location that recycled the record.
    #[error("{}", recycled_message(.recycled_at))]
    Recycled {
        /// Where the record was recycled, if recycle tracking was active at the time.
        recycled_at: Option<&'static Location<'static>>,
    },

    /// An API contract was violated, e.g. a record that is still in use was rebound to a
    /// different operation.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// The connection was closed before the write could be completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The interceptor registered for the write decided to abort it.
    #[error("write aborted by interceptor")]
    Aborted,

    /// The party responsible for completing the operation went away without reporting a result.
    #[error("operation abandoned without a result")]
    Abandoned,

    /// We are forwarding an error received from the channel.
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

fn recycled_message(recycled_at: &Option<&'static Location<'static>>) -> String {
    recycled_at.map_or_else(
        || "operation record has been recycled".to_string(),
        |location| format!("operation record has been recycled at: {location}"),
    )
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// Represents the write queue error as a standard I/O error.
/// This is often used when interoperating with other libraries that expect standard I/O errors.
impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(error) => Self::new(error.kind(), Error::Io(error)),
            Error::ConnectionClosed => Self::new(std::io::ErrorKind::NotConnected, value),
            _ => Self::other(value),
        }
    }
}

/// A specialized `Result` for use with queued write operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync, Clone);
    }

    #[test]
    fn recycled_without_location() {
        let e = Error::Recycled { recycled_at: None };
        assert_eq!(e.to_string(), "operation record has been recycled");
    }

    #[test]
    fn recycled_with_location() {
        let e = Error::Recycled {
            recycled_at: Some(Location::caller()),
        };

        let message = e.to_string();
        assert!(message.starts_with("operation record has been recycled at: "));
        assert!(message.contains("error.rs"));
    }

    #[test]
    fn io_error_keeps_kind() {
        let e: Error = std::io::Error::new(ErrorKind::BrokenPipe, "peer went away").into();
        assert_eq!(e.to_string(), "peer went away");

        let io_error: std::io::Error = e.into();
        assert_eq!(io_error.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn into_stdio_error() {
        let io_error: std::io::Error = Error::ConnectionClosed.into();
        assert_eq!(io_error.kind(), ErrorKind::NotConnected);

        let io_error: std::io::Error = Error::Aborted.into();
        assert_eq!(io_error.kind(), ErrorKind::Other);
    }

    #[test]
    fn clone_shares_io_error() {
        let e: Error = std::io::Error::new(ErrorKind::TimedOut, "slow").into();
        let clone = e.clone();

        match (e, clone) {
            (Error::Io(a), Error::Io(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("unexpected error variant"),
        }
    }
}
