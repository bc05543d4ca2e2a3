// Path: crates/test_utils/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Telewatch Test Utilities
//!
//! Scriptable in-memory stand-ins for the activity service, secret storage,
//! notification delivery, the session catalog and the telemetry socket, plus
//! fixture builders shared by unit and integration tests.

pub mod assertions;
pub mod feed;
pub mod fixtures;
pub mod notifier;
pub mod services;
