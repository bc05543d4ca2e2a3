//! A notifier that records what it was asked to deliver.

use async_trait::async_trait;
use parking_lot::Mutex;
use telewatch_api::Notifier;
use telewatch_types::error::ServiceError;
use telewatch_types::AlertMessage;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inbox {
    delivered: Vec<AlertMessage>,
    attempts: Vec<Instant>,
    fail_remaining: usize,
}

/// Records deliveries and their timing. Can be told to fail the first N sends.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    inbox: Mutex<Inbox>,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` sends fail.
    pub fn fail_first(&self, n: usize) {
        self.inbox.lock().fail_remaining = n;
    }

    /// Successfully delivered messages, in order.
    pub fn delivered(&self) -> Vec<AlertMessage> {
        self.inbox.lock().delivered.clone()
    }

    /// SMS bodies of delivered messages, in order.
    pub fn sms_texts(&self) -> Vec<String> {
        self.inbox
            .lock()
            .delivered
            .iter()
            .filter_map(|m| m.sms.as_ref().map(|s| s.text.clone()))
            .collect()
    }

    /// Number of send calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.inbox.lock().attempts.len()
    }

    /// Clock readings of every send call.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.inbox.lock().attempts.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), ServiceError> {
        let mut inbox = self.inbox.lock();
        inbox.attempts.push(Instant::now());
        if inbox.fail_remaining > 0 {
            inbox.fail_remaining -= 1;
            return Err(ServiceError::Transport {
                endpoint: "recording".into(),
                reason: "scripted failure".into(),
            });
        }
        inbox.delivered.push(message.clone());
        Ok(())
    }
}
