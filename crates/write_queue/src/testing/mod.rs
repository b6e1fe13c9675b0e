// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Utilities for testing code that writes through an [`AsyncQueueWriter`][crate::AsyncQueueWriter].

mod fake_connection;

pub use fake_connection::*;
