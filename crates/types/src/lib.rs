// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Telewatch Types
//!
//! The shared vocabulary of the telewatch workspace: the session catalog and its
//! pre-signed transaction bundles, the ephemeral activity records returned by the
//! activity service, operator alert messages, configuration, and error types.
//!
//! ## Architectural Role
//!
//! As the base crate, `telewatch-types` carries no async runtime and no I/O beyond
//! reading the configuration file. Every other crate depends on it, which keeps the
//! boundary contracts between the watcher core and its collaborators in one place.

/// Operator alert messages.
pub mod alert;
/// Configuration structures loaded once at startup (`telewatch.toml`).
pub mod config;
/// Error types with stable machine-readable codes.
pub mod error;
/// Sessions, pre-signed transaction bundles and activity records.
pub mod session;

pub use alert::AlertMessage;
pub use config::WatchConfig;
pub use session::{ActiveSessionRecord, ActiveSessions, Session, TransactionBundle};
