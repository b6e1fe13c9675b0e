// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::panic::Location;

use parking_lot::Mutex;

use crate::{Error, Notifier, Result};

/// Bookkeeping for one in-flight operation on a connection: the connection, the message being
/// transferred, the result accumulated so far and whoever wants to hear about the outcome.
///
/// Records are pooled to avoid allocating on every write (see [`RecordPool`]). A record that was
/// returned to its pool is *recycled*. Every accessor and mutator of a recycled record fails with
/// [`Error::Recycled`] instead of handing out state that may already belong to an unrelated
/// operation. A recycled record becomes usable again only via [`rebind()`][Self::rebind].
///
/// The same type serves reads and writes; the writer in this crate uses
/// `OperationRecord<Arc<C>, M, WriteResult>`.
///
/// # Recycle tracking
///
/// With `debug_assertions` or the `track-recycle` feature enabled, the record remembers the
/// source location that recycled it and reports it in [`Error::Recycled`].
pub struct OperationRecord<C, M, R> {
    // None while recycled.
    binding: Option<Binding<C, M, R>>,
    recycled_at: Option<&'static Location<'static>>,
}

struct Binding<C, M, R> {
    connection: C,
    message: M,
    result: R,
    notifier: Notifier<R>,
}

impl<C, M, R> OperationRecord<C, M, R> {
    /// Creates a record bound to one operation.
    #[must_use]
    pub const fn new(connection: C, message: M, result: R, notifier: Notifier<R>) -> Self {
        Self {
            binding: Some(Binding {
                connection,
                message,
                result,
                notifier,
            }),
            recycled_at: None,
        }
    }

    /// Replaces the connection, message, result and notifier of a record that is in use.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled. Use [`rebind()`][Self::rebind]
    /// to reuse a recycled record.
    pub fn initialize(&mut self, connection: C, message: M, result: R, notifier: Notifier<R>) -> Result<()> {
        self.check_recycled()?;

        self.binding = Some(Binding {
            connection,
            message,
            result,
            notifier,
        });

        Ok(())
    }

    /// Binds a recycled record to a new operation. This is the only way back from the recycled
    /// state.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ContractViolation`] if the record is still in use, as rebinding it would
    /// silently take it away from the operation that owns it.
    pub fn rebind(&mut self, connection: C, message: M, result: R, notifier: Notifier<R>) -> Result<()> {
        if self.binding.is_some() {
            return Err(Error::ContractViolation(
                "operation record rebound while still in use".to_string(),
            ));
        }

        self.binding = Some(Binding {
            connection,
            message,
            result,
            notifier,
        });
        self.recycled_at = None;

        Ok(())
    }

    /// Whether the record has been returned to its pool.
    #[must_use]
    pub const fn is_recycled(&self) -> bool {
        self.binding.is_none()
    }

    /// Where the record was last recycled, if recycle tracking was active.
    #[must_use]
    pub const fn recycled_at(&self) -> Option<&'static Location<'static>> {
        self.recycled_at
    }

    /// The connection the operation targets.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn connection(&self) -> Result<&C> {
        self.binding().map(|b| &b.connection)
    }

    /// The message being transferred.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn message(&self) -> Result<&M> {
        self.binding().map(|b| &b.message)
    }

    /// The message being transferred, for in-place updates such as advancing past written bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn message_mut(&mut self) -> Result<&mut M> {
        self.binding_mut().map(|b| &mut b.message)
    }

    /// Replaces the message being transferred.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn set_message(&mut self, message: M) -> Result<()> {
        self.binding_mut()?.message = message;
        Ok(())
    }

    /// Replaces the message with whatever `f` makes of it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn map_message(&mut self, f: impl FnOnce(M) -> M) -> Result<()> {
        self.check_recycled()?;

        // If `f` panics, the record is left unbound and reports itself as recycled.
        let Binding {
            connection,
            message,
            result,
            notifier,
        } = self.binding.take().expect("checked above");

        self.binding = Some(Binding {
            connection,
            message: f(message),
            result,
            notifier,
        });

        Ok(())
    }

    /// The result accumulated by the operation so far.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn current_result(&self) -> Result<&R> {
        self.binding().map(|b| &b.result)
    }

    /// The result accumulated by the operation so far, for updates.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn current_result_mut(&mut self) -> Result<&mut R> {
        self.binding_mut().map(|b| &mut b.result)
    }

    /// Replaces whoever is to be notified about the outcome of the operation.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn set_notifier(&mut self, notifier: Notifier<R>) -> Result<()> {
        self.binding_mut()?.notifier = notifier;
        Ok(())
    }

    /// Delivers `error` to the completion handler and the completion future of the operation.
    ///
    /// A completion future that already holds an outcome keeps it. A completion handler that has
    /// not yet been invoked is invoked regardless.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn notify_failure(&mut self, error: Error) -> Result<()> {
        self.binding_mut()?.notifier.notify_failure(error);
        Ok(())
    }

    /// Delivers the current result as the successful outcome of the operation.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Recycled`] if the record is recycled.
    pub fn notify_success(&mut self) -> Result<()>
    where
        R: Clone,
    {
        let binding = self.binding_mut()?;
        binding.notifier.notify_success(binding.result.clone());
        Ok(())
    }

    /// Returns the record to the recycled state, dropping everything bound to it.
    ///
    /// Called by the owner of the pool once the operation's outcome has been delivered. Anyone
    /// still waiting on an outcome that was never delivered observes [`Error::Abandoned`].
    #[track_caller]
    pub fn recycle(&mut self) {
        if self.binding.take().is_none() {
            return;
        }

        self.recycled_at = if cfg!(any(debug_assertions, feature = "track-recycle")) {
            Some(Location::caller())
        } else {
            None
        };
    }

    fn check_recycled(&self) -> Result<()> {
        if self.binding.is_none() {
            return Err(Error::Recycled {
                recycled_at: self.recycled_at,
            });
        }

        Ok(())
    }

    fn binding(&self) -> Result<&Binding<C, M, R>> {
        self.binding.as_ref().ok_or(Error::Recycled {
            recycled_at: self.recycled_at,
        })
    }

    fn binding_mut(&mut self) -> Result<&mut Binding<C, M, R>> {
        self.binding.as_mut().ok_or(Error::Recycled {
            recycled_at: self.recycled_at,
        })
    }
}

impl<C: Debug, M, R: Debug> Debug for OperationRecord<C, M, R> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(binding) => f
                .debug_struct("OperationRecord")
                .field("connection", &binding.connection)
                .field("result", &binding.result)
                .field("notifier", &binding.notifier)
                .finish_non_exhaustive(),
            None => f
                .debug_struct("OperationRecord")
                .field("recycled_at", &self.recycled_at)
                .finish(),
        }
    }
}

/// A pool of boxed [`OperationRecord`]s.
///
/// Records leave the pool bound to an operation via [`acquire()`][Self::acquire] and come back
/// via [`release()`][Self::release], which takes them by value. Safe code therefore cannot keep
/// using a record after handing it back; the recycle flag catches what remains (a record that was
/// recycled in place and then used again).
///
/// The pool keeps at most `capacity` free records. Releasing into a full pool drops the record.
///
/// # Thread safety
///
/// This type is thread-safe.
pub struct RecordPool<C, M, R> {
    free: Mutex<Vec<Box<OperationRecord<C, M, R>>>>,
    capacity: usize,
}

impl<C, M, R> RecordPool<C, M, R> {
    /// Creates an empty pool that retains up to `capacity` free records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Takes a free record from the pool (or allocates one if the pool is empty) and binds it to
    /// a new operation.
    pub fn acquire(&self, connection: C, message: M, result: R, notifier: Notifier<R>) -> Box<OperationRecord<C, M, R>> {
        let recycled = self.free.lock().pop();

        match recycled {
            Some(mut record) => {
                record
                    .rebind(connection, message, result, notifier)
                    .expect("records in the free list are always recycled");
                record
            }
            None => Box::new(OperationRecord::new(connection, message, result, notifier)),
        }
    }

    /// Recycles the record and keeps it for reuse if there is room in the pool.
    #[track_caller]
    pub fn release(&self, mut record: Box<OperationRecord<C, M, R>>) {
        record.recycle();

        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(record);
        }
    }

    /// The number of free records currently held for reuse.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// The maximum number of free records the pool retains.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<C, M, R> Debug for RecordPool<C, M, R> {
    #[cfg_attr(test, mutants::skip)] // There is no API contract this needs to satisfy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordPool")
            .field("free", &self.free_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
