// Path: crates/api/src/feed.rs
//! The telemetry socket, abstracted so the connection supervisor can be driven
//! by a real websocket or by a scripted fake.

use async_trait::async_trait;
use std::fmt::Debug;
use telewatch_types::error::FeedError;

/// Opens connections to the telemetry feed.
#[async_trait]
pub trait FeedConnector: Send + Sync + Debug {
    /// Opens a fresh connection to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, FeedError>;
}

/// One live connection to the telemetry feed.
#[async_trait]
pub trait FeedConnection: Send {
    /// Sends a text frame (used for the `subscribe:<id>` handshake).
    async fn send_text(&mut self, text: &str) -> Result<(), FeedError>;

    /// Waits for the next data frame. Control frames are handled internally.
    async fn next_frame(&mut self) -> Result<Vec<u8>, FeedError>;

    /// Closes the connection, ignoring errors.
    async fn close(&mut self);
}
