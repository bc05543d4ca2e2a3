// Path: crates/watcher/src/feed.rs
//! Supervision of the telemetry socket.
//!
//! The supervisor owns the socket. It connects, sends the `subscribe:<id>`
//! handshake, forwards every data frame into the decoder queue, and on any read
//! error resets the node gauge and reconnects with a fixed delay.

use crate::chain_state::ChainStateStore;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use telewatch_api::{FeedConnection, FeedConnector};
use telewatch_telemetry::{error_metrics, http::set_ready, metrics};
use telewatch_types::config::TelemetryFeedConfig;
use telewatch_types::error::{ErrorCode, FeedError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Fixed-delay reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay between two attempts.
    pub delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl From<&TelemetryFeedConfig> for ReconnectPolicy {
    fn from(config: &TelemetryFeedConfig) -> Self {
        Self {
            delay: config.reconnect_delay(),
            max_attempts: config.max_reconnect_attempts.max(1),
        }
    }
}

/// Keeps one subscription to the telemetry feed alive.
#[derive(Debug)]
pub struct FeedSupervisor {
    connector: Arc<dyn FeedConnector>,
    endpoint: String,
    subscribe: String,
    policy: ReconnectPolicy,
    store: Arc<ChainStateStore>,
    frames: mpsc::Sender<Vec<u8>>,
}

impl FeedSupervisor {
    /// Creates a supervisor forwarding frames into `frames`.
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        config: &TelemetryFeedConfig,
        store: Arc<ChainStateStore>,
        frames: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            connector,
            endpoint: config.endpoint(),
            subscribe: config.subscribe_command(),
            policy: ReconnectPolicy::from(config),
            store,
            frames,
        }
    }

    /// Overrides the reconnect schedule.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn open_subscribed(&self) -> Result<Box<dyn FeedConnection>, FeedError> {
        let mut conn = self.connector.open(&self.endpoint).await?;
        if let Err(e) = conn.send_text(&self.subscribe).await {
            conn.close().await;
            return Err(FeedError::Subscribe(e.to_string()));
        }
        Ok(conn)
    }

    /// Connects and subscribes, retrying on the configured schedule.
    ///
    /// Returns `Ok(None)` if shutdown was signalled while waiting between attempts.
    pub async fn connect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Box<dyn FeedConnection>>, FeedError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            metrics().inc_reconnect_attempts();
            match self.open_subscribed().await {
                Ok(conn) => {
                    tracing::info!(target: "feed", endpoint = %self.endpoint, attempt, "Subscribed to telemetry feed");
                    set_ready(true);
                    return Ok(Some(conn));
                }
                Err(e) => {
                    error_metrics().inc_error("feed", e.code());
                    tracing::warn!(target: "feed", endpoint = %self.endpoint, attempt, error = %e, "Telemetry connection attempt failed");
                    if attempt >= self.policy.max_attempts {
                        return Err(FeedError::RetriesExhausted { attempts: attempt });
                    }
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.policy.delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { return Ok(None); }
                }
            }
        }
    }

    /// Runs the subscription until shutdown. Returns an error only when
    /// reconnection gave up, which the caller treats as fatal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), FeedError> {
        let Some(mut conn) = self.connect(&mut shutdown).await? else {
            return Ok(());
        };
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { break; }
                }
                frame = conn.next_frame() => match frame {
                    Ok(bytes) => {
                        metrics().inc_frames_received();
                        if self.frames.send(bytes).await.is_err() {
                            tracing::warn!(target: "feed", "Frame queue closed, stopping feed");
                            break;
                        }
                    }
                    Err(e) => {
                        error_metrics().inc_error("feed", e.code());
                        tracing::warn!(target: "feed", error = %e, "Telemetry read failed, reconnecting");
                        set_ready(false);
                        self.store.reset_node_count();
                        conn.close().await;
                        match self.connect(&mut shutdown).await? {
                            Some(fresh) => conn = fresh,
                            None => return Ok(()),
                        }
                    }
                },
            }
        }
        conn.close().await;
        set_ready(false);
        Ok(())
    }
}

/// Opens real websocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl FeedConnector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
        let (stream, _) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| FeedError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send_text(&mut self, text: &str) -> Result<(), FeedError> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, FeedError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(FeedError::Read(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telewatch_test_utils::feed::ScriptedConnector;

    fn config() -> TelemetryFeedConfig {
        TelemetryFeedConfig {
            host: "telemetry.test:8000".into(),
            telemetry_id: "0xchain".into(),
            scheme: "ws".into(),
            reconnect_delay_secs: 3,
            max_reconnect_attempts: 5,
            frame_queue_capacity: 16,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_read_error_and_resets_node_count() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.refuse();
        connector.accept(vec![Ok(b"[1]".to_vec()), Err(FeedError::Read("reset".into()))]);
        connector.accept(vec![Ok(b"[2]".to_vec())]);

        let store = Arc::new(ChainStateStore::new());
        store.node_added();
        store.node_added();
        let (frames_tx, mut frames_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = FeedSupervisor::new(connector.clone(), &config(), store.clone(), frames_tx);
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        assert_eq!(frames_rx.recv().await.unwrap(), b"[1]".to_vec());
        assert_eq!(frames_rx.recv().await.unwrap(), b"[2]".to_vec());
        assert_eq!(store.node_count(), 0);
        assert_eq!(connector.opened(), 3);
        assert_eq!(connector.sent(), vec!["subscribe:0xchain", "subscribe:0xchain"]);
        assert!(connector.closed() >= 1);

        shutdown_tx.send(true).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let connector = Arc::new(ScriptedConnector::new());
        for _ in 0..3 {
            connector.refuse();
        }
        let store = Arc::new(ChainStateStore::new());
        let (frames_tx, _frames_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = FeedSupervisor::new(connector.clone(), &config(), store, frames_tx)
            .with_policy(ReconnectPolicy {
                delay: Duration::from_secs(3),
                max_attempts: 3,
            });

        let started = tokio::time::Instant::now();
        let result = supervisor.run(shutdown_rx).await;
        assert!(matches!(result, Err(FeedError::RetriesExhausted { attempts: 3 })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
        assert_eq!(connector.opened(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_retry_delay() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.refuse();
        let store = Arc::new(ChainStateStore::new());
        let (frames_tx, _frames_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = FeedSupervisor::new(connector, &config(), store, frames_tx);
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
