// Path: crates/watcher/src/services/sessions.rs
use async_trait::async_trait;
use std::path::PathBuf;
use telewatch_api::SessionStore;
use telewatch_types::error::ServiceError;
use telewatch_types::Session;

/// Session catalog kept as a JSON array of [`Session`] records on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    path: PathBuf,
}

impl JsonFileSessionStore {
    /// Creates a store reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn load_all_sessions(&self) -> Result<Vec<Session>, ServiceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ServiceError::Store(format!("{}: {e}", self.path.display())))?;
        let sessions: Vec<Session> = serde_json::from_str(&raw)
            .map_err(|e| ServiceError::Decode(format!("{}: {e}", self.path.display())))?;
        tracing::info!(target: "node", path = %self.path.display(), count = sessions.len(), "Loaded session catalog");
        Ok(sessions)
    }
}
