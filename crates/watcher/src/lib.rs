// Path: crates/watcher/src/lib.rs
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

//! # Telewatch Watcher
//!
//! Node-health tracking and failover decisions for a fleet of validator nodes.
//!
//! Data flows one way through a set of independent tasks:
//!
//! ```text
//! FeedSupervisor --frames--> TelemetryDecoder --writes--> ChainStateStore
//!                                                            |  (read by)
//!                                               GroupMonitor (one per group)
//!                                                  |               |
//!                                        FailoverExecutor   AlertSender --> AlertDispatcher
//! ```
//!
//! Every long-lived task takes a `watch::Receiver<bool>` shutdown signal.

/// Alert queue, delivery task and per-group notification cadence.
pub mod alerts;
/// Latest imported/finalized heights per node.
pub mod chain_state;
/// Decoding of the compact telemetry event stream.
pub mod decoder;
/// Reassociation of a lagging active session to a healthy backup.
pub mod failover;
/// Telemetry socket supervision and reconnects.
pub mod feed;
/// Per-group lag detection loop.
pub mod monitor;
/// Concrete adapters for the collaborators defined in `telewatch-api`.
pub mod services;
/// Periodic node-count status line.
pub mod status;

pub use alerts::{alert_channel, AlertDispatcher, AlertSender, NotificationLedger};
pub use chain_state::{ChainSnapshot, ChainStateStore, NodeHeights};
pub use decoder::TelemetryDecoder;
pub use failover::{Activation, FailoverExecutor};
pub use feed::{FeedSupervisor, ReconnectPolicy, WsConnector};
pub use monitor::{partition_groups, GroupMonitor};
