// Path: crates/api/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
#![deny(missing_docs)]
//! # Telewatch API
//!
//! The stable contract between the watcher core and everything it does not own:
//! the session catalog, secret storage, the activity REST service, notification
//! delivery, and the telemetry socket. Concrete adapters live in
//! `telewatch-watcher::services` and in-memory fakes in `telewatch-test-utils`.

/// Telemetry feed transport traits.
pub mod feed;
/// External service traits.
pub mod services;

pub use feed::{FeedConnection, FeedConnector};
pub use services::{ActivityService, Notifier, SecretProvider, SessionStore};
