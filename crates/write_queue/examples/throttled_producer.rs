// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Demonstrates a producer that honors the writer's backpressure.
//!
//! The producer wants to send more data than the channel can take. Before each write it asks
//! `can_write()`; when the answer is no, it registers with `notify_write_possible()` and lets the
//! (simulated) event loop drain the queue until the writer says there is room again.

use std::sync::Arc;
use std::sync::mpsc;

use bytes::Bytes;
use tracing::Level;
use write_queue::testing::FakeConnection;
use write_queue::{AsyncQueueWriter, PendingBytesLimit, WriteRequest, WriterOptions};

const MESSAGES: usize = 32;
const MESSAGE_SIZE: usize = 1000;
const CEILING: usize = 4096;
const BYTES_PER_TICK: usize = 1500;

type Writer = AsyncQueueWriter<FakeConnection, Bytes>;

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let writer = Writer::builder()
        .options(WriterOptions::new().max_pending_bytes_per_connection(PendingBytesLimit::Bytes(CEILING)))
        .build();

    // The channel only takes so many bytes per event loop tick.
    let connection = Arc::new(FakeConnection::new());
    connection.set_budget(Some(BYTES_PER_TICK));

    let (resume_tx, resume_rx) = mpsc::channel();
    let mut ticks = 0;
    let mut waits = 0;

    for index in 0..MESSAGES {
        if !writer.can_write(&connection, MESSAGE_SIZE) {
            waits += 1;

            let resume_tx = resume_tx.clone();
            writer.notify_write_possible(&connection, MESSAGE_SIZE, move |outcome| {
                resume_tx.send(outcome.is_ok()).expect("producer is waiting");
            });

            while resume_rx.try_recv().is_err() {
                tick(&writer, &connection);
                ticks += 1;
            }
        }

        let request = WriteRequest::new(Bytes::from(vec![0_u8; MESSAGE_SIZE])).on_complete(move |outcome| {
            if let Err(error) = outcome {
                eprintln!("message {index} failed: {error}");
            }
        });

        drop(writer.write(&connection, request).expect("connection is open"));
    }

    while !writer.is_ready(&connection) {
        tick(&writer, &connection);
        ticks += 1;
    }

    println!(
        "sent {} bytes in {MESSAGES} messages over {ticks} ticks; the producer waited {waits} times and never had more than {CEILING} bytes pending",
        connection.written().len()
    );
}

/// One event loop iteration: the channel frees up some room and reports itself writable.
fn tick(writer: &Writer, connection: &Arc<FakeConnection>) {
    connection.set_budget(Some(BYTES_PER_TICK));
    writer.on_writable(connection);
}
