// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pending byte accounting, admission checks and connection closure.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::executor::block_on;
use write_queue::testing::FakeConnection;
use write_queue::{AsyncQueueWriter, Error, PendingBytesLimit, WriteRequest, WriterOptions};

type Writer = AsyncQueueWriter<FakeConnection, Bytes>;

fn writer_with_ceiling(ceiling: usize) -> Writer {
    Writer::builder()
        .options(WriterOptions::new().max_pending_bytes_per_connection(PendingBytesLimit::Bytes(ceiling)))
        .build()
}

fn message(len: usize) -> WriteRequest<Bytes> {
    WriteRequest::new(Bytes::from(vec![0_u8; len]))
}

#[test]
fn admission_around_a_single_queued_write() {
    let writer = writer_with_ceiling(1024);
    let connection = Arc::new(FakeConnection::new());
    connection.set_writable(false);

    assert!(writer.can_write(&connection, 600));
    let future = writer.write(&connection, message(600)).unwrap();

    assert!(!writer.can_write(&connection, 500));
    assert!(writer.can_write(&connection, 424));

    connection.set_writable(true);
    writer.on_writable(&connection);

    assert_eq!(block_on(future).unwrap().written(), 600);
    assert!(writer.can_write(&connection, 500));
}

#[test]
fn pending_bytes_track_unwritten_bytes_of_queued_writes() {
    let writer = Writer::new();
    let connection = Arc::new(FakeConnection::new());
    connection.set_writable(false);

    for len in [100, 200, 300] {
        drop(writer.write(&connection, message(len)).unwrap());
    }
    assert_eq!(writer.pending_bytes(&connection), 600);

    // The first write and a quarter of the second fit.
    connection.set_writable(true);
    connection.set_budget(Some(150));
    writer.on_writable(&connection);
    assert_eq!(writer.pending_bytes(&connection), 450);

    connection.set_budget(None);
    writer.on_writable(&connection);
    assert_eq!(writer.pending_bytes(&connection), 0);
    assert!(writer.is_ready(&connection));
}

#[test]
fn direct_writes_are_never_counted() {
    let writer = writer_with_ceiling(10);
    let connection = Arc::new(FakeConnection::new());

    let result = block_on(writer.write(&connection, message(1000)).unwrap()).unwrap();

    assert_eq!(result.written(), 1000);
    assert_eq!(writer.pending_bytes(&connection), 0);
    assert!(writer.can_write(&connection, 10));
}

#[test]
fn ceiling_is_advisory() {
    let writer = writer_with_ceiling(10);
    let connection = Arc::new(FakeConnection::new());
    connection.set_writable(false);

    let future = writer.write(&connection, message(50)).unwrap();

    assert_eq!(writer.pending_bytes(&connection), 50);
    assert!(!writer.can_write(&connection, 0));

    connection.set_writable(true);
    writer.on_writable(&connection);
    assert!(block_on(future).is_ok());
}

#[test]
fn ceilings_are_per_connection() {
    let writer = writer_with_ceiling(100);
    let busy = Arc::new(FakeConnection::new());
    let idle = Arc::new(FakeConnection::new());
    busy.set_writable(false);

    drop(writer.write(&busy, message(100)).unwrap());

    assert!(!writer.can_write(&busy, 1));
    assert!(writer.can_write(&idle, 100));
}

#[test]
fn producer_resumes_when_space_frees_up() {
    let writer = writer_with_ceiling(64);
    let connection = Arc::new(FakeConnection::new());
    connection.set_writable(false);

    drop(writer.write(&connection, message(60)).unwrap());
    assert!(!writer.can_write(&connection, 16));

    let resumed = Arc::new(AtomicUsize::new(0));
    {
        let resumed = Arc::clone(&resumed);
        writer.notify_write_possible(&connection, 16, move |outcome| {
            assert!(outcome.is_ok());
            resumed.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Not enough has drained yet.
    connection.set_writable(true);
    connection.set_budget(Some(8));
    writer.on_writable(&connection);
    assert_eq!(resumed.load(Ordering::SeqCst), 0);

    connection.set_budget(Some(8));
    writer.on_writable(&connection);
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
    assert!(writer.can_write(&connection, 16));

    // Handlers fire once.
    connection.set_budget(None);
    writer.on_writable(&connection);
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
}

#[test]
fn closing_fails_queued_writes_and_forgets_the_queue() {
    let writer = writer_with_ceiling(10);
    let connection = Arc::new(FakeConnection::new());
    connection.set_writable(false);

    let failures = Arc::new(AtomicUsize::new(0));
    let futures: Vec<_> = (0..3)
        .map(|_| {
            let failures = Arc::clone(&failures);
            let request = message(5).on_complete(move |outcome| {
                assert!(matches!(outcome, Err(Error::ConnectionClosed)));
                failures.fetch_add(1, Ordering::SeqCst);
            });
            writer.write(&connection, request).unwrap()
        })
        .collect();

    connection.close();
    writer.close(&connection);

    assert_eq!(failures.load(Ordering::SeqCst), 3);
    for future in futures {
        assert!(matches!(block_on(future), Err(Error::ConnectionClosed)));
    }

    assert_eq!(writer.pending_bytes(&connection), 0);
    assert!(writer.is_ready(&connection));
    assert!(matches!(writer.write(&connection, message(1)), Err(Error::ConnectionClosed)));
}
