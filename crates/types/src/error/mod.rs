// Path: crates/types/src/error/mod.rs
//! Core error types for telewatch.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while loading or validating `telewatch.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {reason}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
    /// The configuration file is not valid TOML for [`crate::WatchConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// A field holds a value the watcher cannot run with.
    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIG_IO",
            Self::Parse(_) => "CONFIG_PARSE",
            Self::Invalid { .. } => "CONFIG_INVALID",
        }
    }
}

/// Errors from external collaborators: session store, secrets, activity service, notifier.
///
/// Every call is single-attempt from the watcher's point of view. Callers decide
/// whether to retry.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never produced a response (DNS, TLS, timeout, refused connection).
    #[error("Transport error calling {endpoint}: {reason}")]
    Transport {
        /// Endpoint that was called.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },
    /// The service answered with a non-success status.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body snippet.
        body: String,
    },
    /// The response or stored record could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// A required secret could not be retrieved.
    #[error("Secret unavailable: {0}")]
    SecretUnavailable(String),
    /// The session catalog could not be read.
    #[error("Session store error: {0}")]
    Store(String),
    /// The notifier refused the message before attempting delivery.
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

impl ErrorCode for ServiceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "SERVICE_TRANSPORT",
            Self::Status { .. } => "SERVICE_STATUS",
            Self::Decode(_) => "SERVICE_DECODE",
            Self::SecretUnavailable(_) => "SERVICE_SECRET_UNAVAILABLE",
            Self::Store(_) => "SERVICE_STORE",
            Self::Rejected(_) => "SERVICE_REJECTED",
        }
    }
}

/// Errors on the telemetry feed transport.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Opening the socket failed.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect {
        /// Feed endpoint.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },
    /// The subscribe handshake could not be sent.
    #[error("Failed to subscribe: {0}")]
    Subscribe(String),
    /// Reading a frame failed.
    #[error("Read error: {0}")]
    Read(String),
    /// The remote closed the stream.
    #[error("Feed closed by remote")]
    Closed,
    /// Reconnection gave up.
    #[error("Gave up connecting after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl ErrorCode for FeedError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "FEED_CONNECT",
            Self::Subscribe(_) => "FEED_SUBSCRIBE",
            Self::Read(_) => "FEED_READ",
            Self::Closed => "FEED_CLOSED",
            Self::RetriesExhausted { .. } => "FEED_RETRIES_EXHAUSTED",
        }
    }
}

/// Outcomes of a failover attempt that did not activate a replacement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FailoverError {
    /// No eligible candidate existed, or every eligible candidate failed.
    #[error("Did not find reassociation candidate for {node} ({attempted} attempted)")]
    NoCandidate {
        /// Node name of the lagging session.
        node: String,
        /// Number of eligible candidates that were tried.
        attempted: usize,
    },
}

impl ErrorCode for FailoverError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoCandidate { .. } => "FAILOVER_NO_CANDIDATE",
        }
    }
}
