//! A scripted telemetry socket.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use telewatch_api::{FeedConnection, FeedConnector};
use telewatch_types::error::FeedError;

/// What the next `open` call does.
#[derive(Debug)]
enum Script {
    Refuse,
    Accept(VecDeque<Result<Vec<u8>, FeedError>>),
}

#[derive(Debug, Default)]
struct Log {
    scripts: VecDeque<Script>,
    opened: usize,
    sent: Vec<String>,
    closed: usize,
}

/// Hands out connections from a queue of scripts.
///
/// An accepted connection replays its frames and errors in order, then stays
/// silent forever. When the queue is empty, `open` is refused.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    log: Arc<Mutex<Log>>,
}

impl ScriptedConnector {
    /// Creates a connector with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a refused connection attempt.
    pub fn refuse(&self) {
        self.log.lock().scripts.push_back(Script::Refuse);
    }

    /// Queues an accepted connection replaying `frames`.
    pub fn accept(&self, frames: Vec<Result<Vec<u8>, FeedError>>) {
        self.log
            .lock()
            .scripts
            .push_back(Script::Accept(frames.into()));
    }

    /// Number of `open` calls.
    pub fn opened(&self) -> usize {
        self.log.lock().opened
    }

    /// Text frames sent on any connection, in order.
    pub fn sent(&self) -> Vec<String> {
        self.log.lock().sent.clone()
    }

    /// Number of `close` calls.
    pub fn closed(&self) -> usize {
        self.log.lock().closed
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
        let mut log = self.log.lock();
        log.opened += 1;
        match log.scripts.pop_front() {
            Some(Script::Accept(frames)) => Ok(Box::new(ScriptedConnection {
                frames,
                log: self.log.clone(),
            })),
            Some(Script::Refuse) | None => Err(FeedError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<Result<Vec<u8>, FeedError>>,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn send_text(&mut self, text: &str) -> Result<(), FeedError> {
        self.log.lock().sent.push(text.to_string());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, FeedError> {
        match self.frames.pop_front() {
            Some(frame) => frame,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.log.lock().closed += 1;
    }
}
